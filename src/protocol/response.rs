use serde::{Deserialize, Serialize};

use crate::Record;

/// Reply to a single request: either the matching records or an error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Records(Vec<Record>),
    Error(ErrorObject),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub message: String,
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error(ErrorObject {
            message: message.into(),
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

impl From<Vec<Record>> for Response {
    fn from(records: Vec<Record>) -> Self {
        Response::Records(records)
    }
}
