use std::io::{self, Read, Write};

use thiserror::Error;

use super::{
    Request, Response, codec,
    frame::{FrameError, FrameReader},
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to decode message: {0}")]
    Deserialize(#[source] serde_json::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed by peer")]
    Closed,
}

/// Frames, encodes, and decodes protocol messages over a bidirectional stream.
pub struct ProtocolTransport<T: Read + Write> {
    frames: FrameReader<T>,
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self {
            frames: FrameReader::new(stream),
        }
    }

    pub fn with_chunk_size(stream: T, chunk_size: usize) -> Self {
        Self {
            frames: FrameReader::with_chunk_size(stream, chunk_size),
        }
    }

    /// Next raw frame, or `None` once the peer has closed the stream.
    pub fn read_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.frames.read_frame()?)
    }

    pub fn write_request(&mut self, req: &Request) -> Result<(), TransportError> {
        let bytes = codec::encode_request(req).map_err(TransportError::Serialize)?;
        self.write_frame(&bytes)
    }

    pub fn write_response(&mut self, resp: &Response) -> Result<(), TransportError> {
        self.write_frame(&codec::encode_response(resp))
    }

    pub fn read_response(&mut self) -> Result<Response, TransportError> {
        let frame = self.read_frame()?.ok_or(TransportError::Closed)?;
        codec::decode_response(&frame).map_err(TransportError::Deserialize)
    }

    /// `write_all` keeps going across partial writes until every byte is accepted.
    pub fn write_frame(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.frames.get_mut();
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &T {
        self.frames.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.frames.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.frames.into_inner()
    }
}
