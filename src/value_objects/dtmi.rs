use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Errors raised when a string is not a digital twin model identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DtmiError {
    #[error("DTMI '{0}' must start with 'dtmi:'")]
    MissingScheme(String),

    #[error("DTMI '{0}' must end with ';<version>'")]
    MissingVersion(String),

    #[error("DTMI '{0}' has an invalid path segment")]
    InvalidSegment(String),
}

/// Digital Twin Model Identifier, e.g. `dtmi:org:w3id:rec:Space;1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dtmi(String);

impl Dtmi {
    /// Parse and validate a DTMI
    pub fn parse(value: &str) -> Result<Self, DtmiError> {
        let path = value
            .strip_prefix("dtmi:")
            .ok_or_else(|| DtmiError::MissingScheme(value.to_string()))?;

        let (path, version) = path
            .rsplit_once(';')
            .ok_or_else(|| DtmiError::MissingVersion(value.to_string()))?;

        if version.is_empty() || !version.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(DtmiError::MissingVersion(value.to_string()));
        }

        let segments_valid = path.split(':').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_alphabetic())
                && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
        if !segments_valid {
            return Err(DtmiError::InvalidSegment(value.to_string()));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Dtmi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Dtmi {
    type Err = DtmiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Dtmi {
    type Error = DtmiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Dtmi> for String {
    fn from(value: Dtmi) -> Self {
        value.0
    }
}

impl AsRef<str> for Dtmi {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Dtmi {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Dtmi {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_dtmi() {
        let dtmi = Dtmi::parse("dtmi:org:w3id:rec:Space;1").unwrap();
        assert_eq!(dtmi.as_str(), "dtmi:org:w3id:rec:Space;1");
        assert_eq!(dtmi, "dtmi:org:w3id:rec:Space;1");
    }

    #[test]
    fn test_parse_rejects_missing_scheme() {
        assert!(matches!(
            Dtmi::parse("org:w3id:rec:Space;1"),
            Err(DtmiError::MissingScheme(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_version() {
        assert!(matches!(
            Dtmi::parse("dtmi:org:w3id:rec:Space"),
            Err(DtmiError::MissingVersion(_))
        ));
        assert!(matches!(
            Dtmi::parse("dtmi:org:w3id:rec:Space;"),
            Err(DtmiError::MissingVersion(_))
        ));
    }

    #[test]
    fn test_parse_rejects_bad_segment() {
        assert!(matches!(
            Dtmi::parse("dtmi:org::Space;1"),
            Err(DtmiError::InvalidSegment(_))
        ));
        assert!(matches!(
            Dtmi::parse("dtmi:org:9lives;1"),
            Err(DtmiError::InvalidSegment(_))
        ));
    }

    #[test]
    fn test_serde_roundtrip_validates() {
        let json = serde_json::json!("dtmi:com:willowinc:Capability;1");
        let dtmi: Dtmi = serde_json::from_value(json).unwrap();
        assert_eq!(dtmi.to_string(), "dtmi:com:willowinc:Capability;1");

        let bad: Result<Dtmi, _> = serde_json::from_value(serde_json::json!("nope"));
        assert!(bad.is_err());
    }
}
