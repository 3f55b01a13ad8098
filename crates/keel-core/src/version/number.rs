//! Totally ordered `major.minor.micro[.qualifier]` version.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseError;

/// Separator between version components.
pub const VERSION_SECTION_SEPARATOR: char = '.';

const MAX_COMPONENTS: usize = 4;

/// A resource version.
///
/// Ordering compares `major`, `minor`, `micro`, then the qualifier
/// lexicographically, with an absent qualifier sorting before any qualifier.
/// Field order matters: the derived `Ord` relies on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
    micro: u32,
    qualifier: Option<String>,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: None,
        }
    }

    /// Attach a qualifier.
    ///
    /// The qualifier is not validated here; use [`Version::parse`] for
    /// untrusted text.
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Parse a version string.
    ///
    /// Accepts `major`, `major.minor`, `major.minor.micro`, each optionally
    /// followed by a non-numeric qualifier component, or exactly four
    /// components where the fourth is the qualifier. Missing numeric
    /// components default to `0`.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(ParseError::version(input, "empty version"));
        }

        let parts: Vec<&str> = text.split(VERSION_SECTION_SEPARATOR).collect();
        if parts.len() > MAX_COMPONENTS {
            return Err(ParseError::version(
                input,
                format!("more than {} components", MAX_COMPONENTS),
            ));
        }

        let (numeric, qualifier) = match parts.split_last() {
            Some((last, rest))
                if !rest.is_empty() && (parts.len() == MAX_COMPONENTS || !is_numeric(last)) =>
            {
                (rest, Some(*last))
            }
            _ => (parts.as_slice(), None),
        };

        let mut components = [0u32; 3];
        for (slot, part) in components.iter_mut().zip(numeric) {
            *slot = parse_component(input, part)?;
        }

        if let Some(qualifier) = qualifier {
            validate_qualifier(input, qualifier)?;
        }

        Ok(Self {
            major: components[0],
            minor: components[1],
            micro: components[2],
            qualifier: qualifier.map(str::to_string),
        })
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn micro(&self) -> u32 {
        self.micro
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Next major version; minor and micro reset, qualifier dropped.
    pub fn increment_major(&self) -> Self {
        Self::new(self.major.saturating_add(1), 0, 0)
    }

    /// Next minor version; micro reset, qualifier dropped.
    pub fn increment_minor(&self) -> Self {
        Self::new(self.major, self.minor.saturating_add(1), 0)
    }

    /// Next micro version; qualifier dropped.
    pub fn increment_micro(&self) -> Self {
        Self::new(self.major, self.minor, self.micro.saturating_add(1))
    }

    pub(crate) fn checked_increment_micro(&self) -> Option<Self> {
        self.micro
            .checked_add(1)
            .map(|micro| Self::new(self.major, self.minor, micro))
    }
}

fn is_numeric(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())
}

fn parse_component(input: &str, part: &str) -> Result<u32, ParseError> {
    if !is_numeric(part) {
        return Err(ParseError::version(
            input,
            format!("component '{}' is not a non-negative integer", part),
        ));
    }
    part.parse::<u32>().map_err(|e| {
        ParseError::version(input, format!("component '{}' out of range: {}", part, e))
    })
}

fn validate_qualifier(input: &str, qualifier: &str) -> Result<(), ParseError> {
    let mut chars = qualifier.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphanumeric() && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ParseError::version(
            input,
            format!(
                "qualifier '{}' must start with a letter or digit followed by letters, digits or underscores",
                qualifier
            ),
        ))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if let Some(qualifier) = &self.qualifier {
            write!(f, "{}{}", VERSION_SECTION_SEPARATOR, qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn test_parse_full_version() {
        let version = v("1.2.3");
        assert_eq!(version.major(), 1);
        assert_eq!(version.minor(), 2);
        assert_eq!(version.micro(), 3);
        assert_eq!(version.qualifier(), None);
    }

    #[test]
    fn test_parse_short_forms_default_to_zero() {
        assert_eq!(v("4"), Version::new(4, 0, 0));
        assert_eq!(v("4.5"), Version::new(4, 5, 0));
        assert_eq!(v(" 4.5.6 "), Version::new(4, 5, 6));
    }

    #[test]
    fn test_parse_qualifier() {
        assert_eq!(v("1.2.3.beta_2"), Version::new(1, 2, 3).with_qualifier("beta_2"));
        assert_eq!(v("1.2.3.4"), Version::new(1, 2, 3).with_qualifier("4"));
        assert_eq!(v("1.2.SNAPSHOT"), Version::new(1, 2, 0).with_qualifier("SNAPSHOT"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "", "   ", "a", "1..2", "1.2.3.", ".1", "1.-2", "1.+2", "1.2.3.4.5", "1.2.3._x",
            "1.2.3.be-ta", "99999999999",
        ] {
            assert!(Version::parse(bad).is_err(), "'{}' should not parse", bad);
        }
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["0", "1.2", "1.2.3", "1.2.3.rc1", "10.0.SNAPSHOT"] {
            let parsed = v(text);
            assert_eq!(v(&parsed.to_string()), parsed, "round trip of '{}'", text);
        }
        assert_eq!(v("1.2").to_string(), "1.2.0");
        assert_eq!(v("1.2.3.rc1").to_string(), "1.2.3.rc1");
    }

    #[test]
    fn test_ordering_by_component() {
        assert!(v("1.0.0") < v("2.0.0"));
        assert!(v("1.9.9") < v("2.0.0"));
        assert!(v("1.2.0") < v("1.10.0"));
        assert!(v("1.2.3") < v("1.2.4"));
        assert_eq!(v("1.2.3").cmp(&v("1.2.3")), std::cmp::Ordering::Equal);
    }

    #[test]
    fn test_absent_qualifier_sorts_first() {
        assert!(v("1.2.3") < v("1.2.3.alpha"));
        assert!(v("1.2.3.alpha") < v("1.2.3.beta"));
        assert!(v("1.2.3.zzz") < v("1.2.4"));
        assert_ne!(v("1.2.3"), v("1.2.3.alpha"));
    }

    #[test]
    fn test_ordering_is_transitive() {
        let versions: Vec<Version> = ["0.1", "1.0.0", "1.0.0.a", "1.0.0.b", "1.0.1", "1.1", "2"]
            .iter()
            .map(|s| v(s))
            .collect();
        for a in &versions {
            for b in &versions {
                for c in &versions {
                    if a <= b && b <= c {
                        assert!(a <= c, "{} <= {} <= {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_increments_reset_lower_components() {
        let base = v("1.2.3.beta");
        assert_eq!(base.increment_major(), Version::new(2, 0, 0));
        assert_eq!(base.increment_minor(), Version::new(1, 3, 0));
        assert_eq!(base.increment_micro(), Version::new(1, 2, 4));
    }

    #[test]
    fn test_serde_uses_text_form() {
        let json = serde_json::to_string(&v("1.2.3.rc1")).unwrap();
        assert_eq!(json, "\"1.2.3.rc1\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("1.2.3.rc1"));
        assert!(serde_json::from_str::<Version>("\"1.x\"").is_err());
    }
}
