use std::fmt;

use serde::{Deserialize, Serialize};

/// A single currency entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub code: String,
    pub name: String,
    pub country: String,
    pub symbol: String,
}

impl Record {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        country: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            country: country.into(),
            symbol: symbol.into(),
        }
    }

    /// `needle` must already be lowercased.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        self.code.to_lowercase() == needle
            || self.name.to_lowercase().contains(needle)
            || self.country.to_lowercase().contains(needle)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {}  {}  {}",
            self.code, self.name, self.country, self.symbol
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dollar() -> Record {
        Record::new("USD", "US Dollar", "United States", "$")
    }

    #[test]
    fn matches_code_exactly() {
        assert!(dollar().matches("usd"));
        assert!(!dollar().matches("sd"), "code is not a substring match");
    }

    #[test]
    fn matches_name_and_country_substrings() {
        assert!(dollar().matches("dollar"));
        assert!(dollar().matches("united"));
        assert!(!dollar().matches("euro"));
    }

    #[test]
    fn record_serializes_with_lowercase_fields() {
        let json = serde_json::to_string(&dollar()).unwrap();
        assert_eq!(
            json,
            r#"{"code":"USD","name":"US Dollar","country":"United States","symbol":"$"}"#
        );
    }

    #[test]
    fn record_display() {
        assert_eq!(dollar().to_string(), "USD  US Dollar  United States  $");
    }
}
