//! Delimiter-scanning frame reader.
//!
//! Messages on the wire carry no length prefix: a frame is one complete JSON object or array,
//! and it ends at the byte that closes the outermost `{` or `[`. The reader pulls bytes from the
//! stream in fixed-size chunks, so a frame may span many reads and a single read may hold the
//! tail of one frame and the head of the next. Bytes past the end of a frame stay buffered for
//! the following call.
//!
//! A frame that is well-formed JSON ends exactly where the parser says its outermost value
//! ends, so a `}` inside a string field never terminates it. A frame that is not (garbage such
//! as `abc}`, an unclosed quote, a doubled `{`) is cut at the first `}` or `]`. Decoding it then
//! fails, the caller answers with an error, and the request after it is framed cleanly.
//! Whitespace between frames is discarded.
use std::io::{self, Read};

use log::trace;
use serde::de::IgnoredAny;
use thiserror::Error;

/// Bytes requested from the underlying stream per read.
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// Upper bound for a single buffered frame.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("connection closed mid-frame with {0} bytes buffered")]
    Incomplete(usize),
    #[error("frame exceeds {} bytes", MAX_FRAME_SIZE)]
    TooLarge,
    #[error("frame read error: {0}")]
    Io(#[from] io::Error),
}

fn is_closer(byte: &u8) -> bool {
    matches!(*byte, b'}' | b']')
}

/// Where the pending frame ends, judged by the JSON parser.
enum Boundary {
    End(usize),
    NeedMore,
    Malformed,
}

fn json_boundary(buf: &[u8]) -> Boundary {
    let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<IgnoredAny>();
    match values.next() {
        Some(Ok(_)) => Boundary::End(values.byte_offset()),
        Some(Err(e)) if e.is_eof() => Boundary::NeedMore,
        Some(Err(_)) => Boundary::Malformed,
        None => Boundary::NeedMore,
    }
}

/// Reassembles complete frames from a byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a closer.
    searched: usize,
    /// The pending frame is known not to be valid JSON.
    malformed: bool,
    chunk_size: usize,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_chunk_size(inner, DEFAULT_CHUNK_SIZE)
    }

    /// A `chunk_size` of zero is treated as one.
    pub fn with_chunk_size(inner: R, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);

        Self {
            inner,
            buffer: Vec::with_capacity(chunk_size),
            searched: 0,
            malformed: false,
            chunk_size,
        }
    }

    /// Reads exactly one frame.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames and
    /// [`FrameError::Incomplete`] when it ends part way through one.
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut chunk = vec![0u8; self.chunk_size];

        loop {
            if let Some(frame) = self.parse_frame() {
                trace!("read frame of {} bytes", frame.len());
                return Ok(Some(frame));
            }

            if self.buffer.len() > MAX_FRAME_SIZE {
                return Err(FrameError::TooLarge);
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // TLS peers that skip close_notify surface as UnexpectedEof.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && self.buffer.is_empty() => 0,
                Err(e) => return Err(e.into()),
            };

            if read == 0 {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(FrameError::Incomplete(self.buffer.len()))
                };
            }

            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    fn parse_frame(&mut self) -> Option<Vec<u8>> {
        if self.searched == 0 && !self.malformed {
            let start = self
                .buffer
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .unwrap_or(self.buffer.len());
            self.buffer.drain(..start);

            match self.buffer.first().copied() {
                None => return None,
                Some(b'{' | b'[') => {}
                Some(_) => self.malformed = true,
            }
        }

        // No frame can end before a closer arrives, so the parser only runs once one has.
        let closer = self.buffer[self.searched..]
            .iter()
            .position(is_closer)
            .map(|i| self.searched + i);

        let Some(closer) = closer else {
            self.searched = self.buffer.len();
            return None;
        };

        let end = if self.malformed {
            closer + 1
        } else {
            match json_boundary(&self.buffer) {
                Boundary::End(end) => end,
                Boundary::NeedMore => {
                    self.searched = self.buffer.len();
                    return None;
                }
                Boundary::Malformed => self.buffer.iter().position(is_closer).unwrap_or(closer) + 1,
            }
        };

        let frame = self.buffer.drain(..end).collect();
        self.searched = 0;
        self.malformed = false;
        Some(frame)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// Hands out scripted reads one at a time, regardless of the caller's buffer size
    /// (as long as it fits).
    pub(crate) struct ScriptedReader {
        reads: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        pub(crate) fn new(reads: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                reads: reads.into(),
            }
        }

        pub(crate) fn bytes(pieces: &[&[u8]]) -> Self {
            Self::new(pieces.iter().map(|p| Ok(p.to_vec())).collect())
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.reads.push_front(Ok(bytes.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    fn frames_of(input: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
        let mut reader = FrameReader::with_chunk_size(input, chunk_size);
        let mut frames = Vec::new();
        while let Some(frame) = reader.read_frame().unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn frame_larger_than_chunk() {
        let message = br#"{"Get":"a selector that is much longer than four bytes"}"#;
        let frames = frames_of(message, 4);
        assert_eq!(frames, vec![message.to_vec()]);
    }

    #[test]
    fn frame_split_across_arbitrary_reads() {
        let message = br#"[{"code":"USD","name":"US Dollar"},{"code":"EUR","name":"Euro"}]"#;
        let pieces: Vec<&[u8]> = message.chunks(3).collect();
        let mut reader = FrameReader::with_chunk_size(ScriptedReader::bytes(&pieces), 8);

        assert_eq!(reader.read_frame().unwrap(), Some(message.to_vec()));
        assert_eq!(reader.read_frame().unwrap(), None);
    }

    #[test]
    fn back_to_back_frames_stay_separate() {
        let frames = frames_of(br#"{"Get":"USD"}{"Get":"EUR"}"#, 64);
        assert_eq!(
            frames,
            vec![br#"{"Get":"USD"}"#.to_vec(), br#"{"Get":"EUR"}"#.to_vec()]
        );
    }

    #[test]
    fn trailing_bytes_survive_into_next_frame() {
        let mut reader = FrameReader::with_chunk_size(
            ScriptedReader::bytes(&[br#"{"Get":"USD"}{"Ge"#, br#"t":"EUR"}"#]),
            64,
        );

        assert_eq!(
            reader.read_frame().unwrap(),
            Some(br#"{"Get":"USD"}"#.to_vec())
        );
        assert_eq!(
            reader.read_frame().unwrap(),
            Some(br#"{"Get":"EUR"}"#.to_vec())
        );
    }

    #[test]
    fn whitespace_between_frames_is_dropped() {
        let frames = frames_of(b"  {\"Get\":\"USD\"}\n\r\n\t{\"Get\":\"*\"}\n", 5);
        assert_eq!(
            frames,
            vec![br#"{"Get":"USD"}"#.to_vec(), br#"{"Get":"*"}"#.to_vec()]
        );
    }

    #[test]
    fn closer_inside_string_is_not_a_delimiter() {
        let message = br#"{"Get":"odd } selector ]"}"#;
        assert_eq!(frames_of(message, 4), vec![message.to_vec()]);
    }

    #[test]
    fn escaped_quote_keeps_string_open() {
        let message = br#"{"Get":"say \"}\" twice\\"}"#;
        assert_eq!(frames_of(message, 2), vec![message.to_vec()]);
    }

    #[test]
    fn nested_values_end_at_outermost_closer() {
        let message = br#"{"message":{"inner":[1,2,{"x":"}"}]}}"#;
        let frames = frames_of(&[&message[..], &b"[]"[..]].concat(), 3);
        assert_eq!(frames, vec![message.to_vec(), b"[]".to_vec()]);
    }

    #[test]
    fn stray_closer_terminates_garbage() {
        let frames = frames_of(b"not json}{\"Get\":\"USD\"}", 4);
        assert_eq!(
            frames,
            vec![b"not json}".to_vec(), br#"{"Get":"USD"}"#.to_vec()]
        );
    }

    #[test]
    fn unclosed_quote_is_cut_at_first_closer() {
        let frames = frames_of(br#"{"Get":"USD}{"Get":"EUR"}"#, 4);
        assert_eq!(
            frames,
            vec![br#"{"Get":"USD}"#.to_vec(), br#"{"Get":"EUR"}"#.to_vec()]
        );
    }

    #[test]
    fn extra_opener_is_cut_at_first_closer() {
        let frames = frames_of(br#"{{"Get":"x"}  {"Get":"EUR"}"#, 3);
        assert_eq!(
            frames,
            vec![br#"{{"Get":"x"}"#.to_vec(), br#"{"Get":"EUR"}"#.to_vec()]
        );
    }

    #[test]
    fn closer_in_string_waits_for_the_rest() {
        let mut reader = FrameReader::with_chunk_size(
            ScriptedReader::bytes(&[br#"{"Get":"a}"#, br#"b"}"#]),
            64,
        );
        assert_eq!(
            reader.read_frame().unwrap(),
            Some(br#"{"Get":"a}b"}"#.to_vec())
        );
        assert_eq!(reader.read_frame().unwrap(), None);
    }

    #[test]
    fn zero_chunk_size_still_reads() {
        let message = br#"{"Get":"USD"}"#;
        assert_eq!(frames_of(message, 0), vec![message.to_vec()]);
    }

    #[test]
    fn clean_end_of_stream() {
        let mut reader = FrameReader::new(&b""[..]);
        assert!(reader.read_frame().unwrap().is_none());

        let mut reader = FrameReader::new(&b" \n "[..]);
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn end_of_stream_mid_frame() {
        let mut reader = FrameReader::new(&br#"{"Get":"US"#[..]);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::Incomplete(10))
        ));
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let reader = ScriptedReader::new(vec![
            Ok(br#"{"Get""#.to_vec()),
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Ok(br#":"USD"}"#.to_vec()),
        ]);
        let mut reader = FrameReader::new(reader);
        assert_eq!(
            reader.read_frame().unwrap(),
            Some(br#"{"Get":"USD"}"#.to_vec())
        );
    }

    #[test]
    fn unexpected_eof_between_frames_is_clean() {
        let reader = ScriptedReader::new(vec![
            Ok(br#"{"Get":"USD"}"#.to_vec()),
            Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
        ]);
        let mut reader = FrameReader::new(reader);
        assert!(reader.read_frame().unwrap().is_some());
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn io_errors_are_fatal() {
        let reader = ScriptedReader::new(vec![
            Ok(b"{".to_vec()),
            Err(io::Error::from(io::ErrorKind::ConnectionReset)),
        ]);
        let mut reader = FrameReader::new(reader);
        match reader.read_frame() {
            Err(FrameError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut input = vec![b'['; MAX_FRAME_SIZE + DEFAULT_CHUNK_SIZE * 2];
        input.push(b']');
        let mut reader = FrameReader::new(&input[..]);
        assert!(matches!(reader.read_frame(), Err(FrameError::TooLarge)));
    }
}
