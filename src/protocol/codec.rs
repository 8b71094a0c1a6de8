//! Wire encoding for requests and responses.
//!
//! Both message shapes are compact JSON. Every encoded message ends with the `}` or `]` that
//! closes its outermost value, which is exactly where [`FrameReader`](super::FrameReader)
//! splits the stream.
use log::error;
use serde::de::Error as _;
use serde_json::Value;

use super::{Request, Response};

/// Sent when a response cannot be serialized, so the peer always gets something parseable.
pub const FALLBACK_RESPONSE: &[u8] = br#"{"message":"internal error"}"#;

pub fn encode_request(req: &Request) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(req)
}

/// Requests are objects only; serde would otherwise also take `["USD"]` as a struct.
pub fn decode_request(frame: &[u8]) -> Result<Request, serde_json::Error> {
    match serde_json::from_slice::<Value>(frame)? {
        value @ Value::Object(_) => serde_json::from_value(value),
        _ => Err(serde_json::Error::custom("request must be a JSON object")),
    }
}

pub fn encode_response(resp: &Response) -> Vec<u8> {
    serde_json::to_vec(resp).unwrap_or_else(|e| {
        error!("failed to encode response: {e}");
        FALLBACK_RESPONSE.to_vec()
    })
}

pub fn decode_response(frame: &[u8]) -> Result<Response, serde_json::Error> {
    serde_json::from_slice(frame)
}

#[cfg(test)]
mod tests {
    use crate::Record;

    use super::*;

    #[test]
    fn encoded_messages_end_with_a_closer() {
        let req = encode_request(&Request::new("USD")).unwrap();
        assert_eq!(req.last(), Some(&b'}'));

        let records = encode_response(&Response::from(vec![Record::new(
            "USD",
            "US Dollar",
            "United States",
            "$",
        )]));
        assert_eq!(records.last(), Some(&b']'));

        let err = encode_response(&Response::error("nope"));
        assert_eq!(err.last(), Some(&b'}'));
    }

    #[test]
    fn decode_request_reports_type_errors() {
        let err = decode_request(br#"{"Get":123}"#).unwrap_err();
        assert!(err.to_string().contains("invalid type: integer `123`"));
    }

    #[test]
    fn decode_request_rejects_non_objects() {
        for frame in [&br#"["USD"]"#[..], b"[]", br#""USD""#] {
            let err = decode_request(frame).unwrap_err();
            assert_eq!(err.to_string(), "request must be a JSON object");
        }
        assert_eq!(
            decode_request(br#"{"get":"USD"}"#).unwrap(),
            Request::new("USD")
        );
    }

    #[test]
    fn decode_request_rejects_garbage() {
        assert!(decode_request(b"not json}").is_err());
    }

    #[test]
    fn fallback_is_a_valid_error_response() {
        let resp = decode_response(FALLBACK_RESPONSE).unwrap();
        assert_eq!(resp, Response::error("internal error"));
    }
}
