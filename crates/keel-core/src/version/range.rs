//! Version constraints.
//!
//! Text grammar:
//! - `X.Y.Z[.Q]`   minimum version, unbounded above
//! - `[min, max]`  bounded, maximum inclusive
//! - `[min, max)`  bounded, maximum exclusive
//! - `=X.Y[.Z]`    exactly that micro release: `[X.Y.Z, X.Y.(Z+1))`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Version;
use crate::error::ParseError;

pub const RANGE_LOWER_CLOSED: char = '[';
pub const RANGE_UPPER_CLOSED: char = ']';
pub const RANGE_UPPER_OPEN: char = ')';
pub const RANGE_SEPARATOR: char = ',';
pub const RANGE_EXACT: char = '=';

/// A constraint over versions, always closed at the minimum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    minimum: Version,
    maximum: Option<Version>,
    maximum_inclusive: bool,
}

impl VersionRange {
    /// Every version at or above `minimum`.
    pub fn at_least(minimum: Version) -> Self {
        Self {
            minimum,
            maximum: None,
            maximum_inclusive: false,
        }
    }

    /// `[minimum, maximum]` or `[minimum, maximum)`.
    ///
    /// An inverted pair is kept as given and contains nothing.
    pub fn bounded(minimum: Version, maximum: Version, maximum_inclusive: bool) -> Self {
        Self {
            minimum,
            maximum: Some(maximum),
            maximum_inclusive,
        }
    }

    /// The range written `=X.Y.Z`: the given release and anything qualified
    /// under it, up to the next micro release.
    pub fn exactly(version: Version) -> Self {
        let maximum = version.increment_micro();
        Self::bounded(version, maximum, false)
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(ParseError::range(input, "empty range"));
        }

        if let Some(exact) = text.strip_prefix(RANGE_EXACT) {
            return parse_exact(input, exact);
        }

        if let Some(body) = text.strip_prefix(RANGE_LOWER_CLOSED) {
            let (body, inclusive) = if let Some(body) = body.strip_suffix(RANGE_UPPER_CLOSED) {
                (body, true)
            } else if let Some(body) = body.strip_suffix(RANGE_UPPER_OPEN) {
                (body, false)
            } else {
                return Err(ParseError::range(input, "does not end with ] or )"));
            };

            let (minimum, maximum) = body
                .split_once(RANGE_SEPARATOR)
                .ok_or_else(|| ParseError::range(input, "missing comma"))?;
            if maximum.contains(RANGE_SEPARATOR) {
                return Err(ParseError::range(input, "more than one comma"));
            }

            let minimum = parse_bound(input, minimum)?;
            let maximum = parse_bound(input, maximum)?;
            return Ok(Self::bounded(minimum, maximum, inclusive));
        }

        Ok(Self::at_least(parse_bound(input, text)?))
    }

    pub fn minimum(&self) -> &Version {
        &self.minimum
    }

    /// `None` when unbounded above.
    pub fn maximum(&self) -> Option<&Version> {
        self.maximum.as_ref()
    }

    pub fn is_maximum_inclusive(&self) -> bool {
        self.maximum_inclusive
    }

    pub fn is_bounded(&self) -> bool {
        self.maximum.is_some()
    }

    pub fn contains(&self, version: &Version) -> bool {
        if version < &self.minimum {
            return false;
        }
        match &self.maximum {
            None => true,
            Some(maximum) => version < maximum || (self.maximum_inclusive && version == maximum),
        }
    }
}

fn parse_bound(input: &str, text: &str) -> Result<Version, ParseError> {
    Version::parse(text).map_err(|e| ParseError::range(input, e.to_string()))
}

fn parse_exact(input: &str, text: &str) -> Result<VersionRange, ParseError> {
    let components = text.trim().split(super::VERSION_SECTION_SEPARATOR).count();
    if !(2..=3).contains(&components) {
        return Err(ParseError::range(
            input,
            "exact match must be of the form =X.Y or =X.Y.Z",
        ));
    }

    let version = parse_bound(input, text)?;
    if version.qualifier().is_some() {
        return Err(ParseError::range(
            input,
            "exact match cannot carry a qualifier",
        ));
    }

    let maximum = version
        .checked_increment_micro()
        .ok_or_else(|| ParseError::range(input, "micro component cannot be incremented"))?;
    Ok(VersionRange::bounded(version, maximum, false))
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.maximum {
            None => write!(f, "{}", self.minimum),
            Some(maximum) => write!(
                f,
                "{}{}{} {}{}",
                RANGE_LOWER_CLOSED,
                self.minimum,
                RANGE_SEPARATOR,
                maximum,
                if self.maximum_inclusive {
                    RANGE_UPPER_CLOSED
                } else {
                    RANGE_UPPER_OPEN
                }
            ),
        }
    }
}

impl FromStr for VersionRange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
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

    fn r(text: &str) -> VersionRange {
        VersionRange::parse(text).unwrap()
    }

    #[test]
    fn test_bare_version_is_a_minimum() {
        let range = r("1.2.3");
        assert_eq!(range.minimum(), &v("1.2.3"));
        assert!(range.maximum().is_none());
        assert!(!range.contains(&v("1.2.2")));
        assert!(range.contains(&v("1.2.3")));
        assert!(range.contains(&v("1.2.3.rc1")));
        assert!(range.contains(&v("999.0.0")));
    }

    #[test]
    fn test_inclusive_range() {
        let range = r("[1.0, 2.0]");
        assert!(range.is_maximum_inclusive());
        assert!(!range.contains(&v("0.9.9")));
        assert!(range.contains(&v("1.0.0")));
        assert!(range.contains(&v("1.5.0")));
        assert!(range.contains(&v("2.0.0")));
        assert!(!range.contains(&v("2.0.0.final")));
        assert!(!range.contains(&v("2.0.1")));
    }

    #[test]
    fn test_exclusive_range() {
        let range = r("[1.0, 2.0)");
        assert!(!range.is_maximum_inclusive());
        assert!(range.contains(&v("1.0.0")));
        assert!(range.contains(&v("1.99.99")));
        assert!(!range.contains(&v("2.0.0")));
    }

    #[test]
    fn test_single_point_range_differs_from_bare_version() {
        let point = r("[1.2.3, 1.2.3]");
        assert!(point.contains(&v("1.2.3")));
        assert!(!point.contains(&v("1.2.4")));
        assert!(!point.contains(&v("1.2.3.beta")));
        assert_ne!(point, r("1.2.3"));

        let empty = r("[1.2.3, 1.2.3)");
        assert!(!empty.contains(&v("1.2.3")));
    }

    #[test]
    fn test_exact_shorthand() {
        let range = r("=1.2.3");
        assert_eq!(range, VersionRange::bounded(v("1.2.3"), v("1.2.4"), false));
        assert!(range.contains(&v("1.2.3")));
        assert!(!range.contains(&v("1.2.4")));
        assert!(!range.contains(&v("1.2.2")));

        assert_eq!(r("=1.2"), VersionRange::bounded(v("1.2.0"), v("1.2.1"), false));
        assert_eq!(r("=1.2.3"), VersionRange::exactly(v("1.2.3")));
    }

    #[test]
    fn test_inverted_range_contains_nothing() {
        let range = VersionRange::bounded(v("2.0.0"), v("1.0.0"), true);
        for candidate in ["0.5", "1.0", "1.5", "2.0", "2.5"] {
            assert!(!range.contains(&v(candidate)));
        }
    }

    #[test]
    fn test_render() {
        assert_eq!(r("1.2").to_string(), "1.2.0");
        assert_eq!(r("[1.0,2.0]").to_string(), "[1.0.0, 2.0.0]");
        assert_eq!(r("[1.0 , 2.0)").to_string(), "[1.0.0, 2.0.0)");
        assert_eq!(r("=1.2.3").to_string(), "[1.2.3, 1.2.4)");
    }

    #[test]
    fn test_round_trip() {
        for text in [
            "1",
            "1.2.3.rc1",
            "[1.0, 2.0]",
            "[1.0, 2.0)",
            "[1.2.3, 1.2.3]",
            "[1.0.0.a, 1.0.0.b)",
            "=4.5.6",
        ] {
            let parsed = r(text);
            assert_eq!(r(&parsed.to_string()), parsed, "round trip of '{}'", text);
        }
    }

    #[test]
    fn test_parse_failures() {
        for bad in [
            "",
            "[1.0, 2.0",
            "[1.0 2.0]",
            "[1.0, 2.0, 3.0]",
            "(1.0, 2.0)",
            "[, 2.0]",
            "[1.0, ]",
            "=1",
            "=1.2.3.beta",
            "=1.2.3.4",
            "=",
            "1.x",
            "[a, b]",
        ] {
            assert!(VersionRange::parse(bad).is_err(), "'{}' should not parse", bad);
        }
    }

    #[test]
    fn test_parse_error_names_input() {
        let err = VersionRange::parse("[1.0, 2.0").unwrap_err();
        assert!(err.to_string().contains("[1.0, 2.0"));
        assert!(matches!(err, ParseError::Range { .. }));
    }
}
