use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Supported logging output formats for the daemon.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    Json,
    /// Human-readable single line output.
    #[default]
    Compact,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(LogFormat::from_str("JSON").expect("parse"), LogFormat::Json);
        assert_eq!(
            LogFormat::from_str("compact").expect("parse"),
            LogFormat::Compact
        );
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(LogFormat::from_str("yaml").is_err());
    }
}
