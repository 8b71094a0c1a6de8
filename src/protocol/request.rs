use serde::{Deserialize, Serialize};

/// Lookup query sent by a client, `{"Get":"<selector>"}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "Get", alias = "get", alias = "GET")]
    pub get: String,
}

impl Request {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            get: selector.into(),
        }
    }

    pub fn selector(&self) -> &str {
        &self.get
    }
}
