//! Application identity using prefixed ULIDs

use miette::Diagnostic;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Prefix carried by every application id
pub const APPLICATION_PREFIX: &str = "APP";

/// A unique application identifier: `APP-<ULID>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApplicationId {
    ulid: Ulid,
}

impl ApplicationId {
    /// Create a fresh application id
    pub fn new() -> Self {
        Self { ulid: Ulid::new() }
    }

    /// Parse an id typed by a reviewer; the prefix is case-insensitive
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }
}

impl Default for ApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", APPLICATION_PREFIX, self.ulid)
    }
}

impl FromStr for ApplicationId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix_str, ulid_str) = s
            .split_once('-')
            .ok_or_else(|| IdParseError::MissingDelimiter(s.to_string()))?;

        if !prefix_str.eq_ignore_ascii_case(APPLICATION_PREFIX) {
            return Err(IdParseError::InvalidPrefix(prefix_str.to_string()));
        }

        let ulid = Ulid::from_string(ulid_str)
            .map_err(|e| IdParseError::InvalidUlid(ulid_str.to_string(), e.to_string()))?;

        Ok(Self { ulid })
    }
}

/// Errors that can occur when parsing application ids
#[derive(Debug, Error, Diagnostic)]
pub enum IdParseError {
    #[error("invalid application prefix: '{0}' (expected APP)")]
    #[diagnostic(code(intake::id::prefix), help("registration ids look like APP-01ARZ3NDEKTSV4RRFFQ69G5FAV"))]
    InvalidPrefix(String),

    #[error("missing '-' delimiter in application ID: '{0}'")]
    #[diagnostic(code(intake::id::delimiter), help("registration ids look like APP-01ARZ3NDEKTSV4RRFFQ69G5FAV"))]
    MissingDelimiter(String),

    #[error("invalid ULID '{0}': {1}")]
    #[diagnostic(code(intake::id::ulid))]
    InvalidUlid(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_id_generation() {
        let id = ApplicationId::new();
        assert!(id.to_string().starts_with("APP-"));
        assert_eq!(id.to_string().len(), 30); // APP- (4) + ULID (26)
    }

    #[test]
    fn test_application_id_roundtrip() {
        let original = ApplicationId::new();
        let parsed = ApplicationId::parse(&original.to_string()).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_lowercase_prefix_accepted() {
        let original = ApplicationId::new();
        let lowered = original.to_string().replacen("APP", "app", 1);
        assert_eq!(ApplicationId::parse(&lowered).unwrap(), original);
    }

    #[test]
    fn test_invalid_prefix() {
        let err = ApplicationId::parse("REQ-01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap_err();
        assert!(matches!(err, IdParseError::InvalidPrefix(_)));
    }

    #[test]
    fn test_missing_delimiter() {
        let err = ApplicationId::parse("APP01ARZ3NDEKTSV4RRFFQ69G5FAV").unwrap_err();
        assert!(matches!(err, IdParseError::MissingDelimiter(_)));
    }

    #[test]
    fn test_invalid_ulid() {
        let err = ApplicationId::parse("APP-notaulid").unwrap_err();
        assert!(matches!(err, IdParseError::InvalidUlid(_, _)));
    }
}
