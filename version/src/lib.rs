//! Version and range parsing for gobin package expressions.
//!
//! Mirrors the `semver` package of the original `gobinaries` service: a
//! deliberately small three-field version scheme (no pre-release or build
//! metadata) plus a wildcard-only range matcher. Not to be confused with
//! Cargo's `semver` crate, whose range syntax this does not implement.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

/// Errors produced while parsing a [`Version`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VersionError {
    #[error("malformed version {0:?}, must be <major>.<minor>.<patch>")]
    Malformed(String),
}

/// A parsed `major.minor.patch` version.
///
/// `input` retains the original text (including a possible leading `v`) so
/// that [`Version::to_string`] round-trips the value the caller parsed.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    input: String,
}

impl Version {
    /// Parse a version string such as `"v1.8.0"` or `"1.8.0"`.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let stripped = s.strip_prefix('v').unwrap_or(s);
        let parts: Vec<&str> = stripped.split('.').collect();
        if parts.len() < 3 {
            return Err(VersionError::Malformed(s.to_string()));
        }

        let major = parts[0].parse().map_err(|_| VersionError::Malformed(s.to_string()))?;
        let minor = parts[1].parse().map_err(|_| VersionError::Malformed(s.to_string()))?;
        let patch = parts[2].parse().map_err(|_| VersionError::Malformed(s.to_string()))?;

        Ok(Version { major, minor, patch, input: s.to_string() })
    }

    /// The original text this version was parsed from.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.input)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        (self.major, self.minor, self.patch) == (other.major, other.minor, other.patch)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

/// A single field of a [`Range`]: either a decimal literal or the wildcard.
///
/// Non-numeric, non-wildcard text is preserved rather than rejected —
/// range parsing never fails, it simply produces a field that can never
/// match any version (checked lazily in [`Range::matches`]).
#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Wildcard,
    Text(String),
}

impl Field {
    fn from_token(token: &str) -> Self {
        if token.is_empty() || token.eq_ignore_ascii_case("x") {
            Field::Wildcard
        } else {
            Field::Text(token.to_string())
        }
    }

    fn matches(&self, actual: u64) -> bool {
        match self {
            Field::Wildcard => true,
            Field::Text(text) => text.parse::<u64>().map(|n| n == actual).unwrap_or(false),
        }
    }
}

/// A wildcard-only version range, e.g. `"1.x"`, `"1.2.x"`, `"1"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    major: Field,
    minor: Field,
    patch: Field,
}

impl Range {
    /// Parse a range expression. This never fails: malformed fields simply
    /// become fields that match nothing (see [`Field`]).
    pub fn parse(s: &str) -> Self {
        let stripped = s.strip_prefix('v').unwrap_or(s);
        let mut parts: Vec<&str> = stripped.split('.').collect();
        parts.resize(3, "");

        Range {
            major: Field::from_token(parts[0]),
            minor: Field::from_token(parts[1]),
            patch: Field::from_token(parts[2]),
        }
    }

    /// Returns true iff every non-wildcard field equals the corresponding
    /// field of `version`.
    pub fn matches(&self, version: &Version) -> bool {
        self.major.matches(version.major)
            && self.minor.matches(version.minor)
            && self.patch.matches(version.patch)
    }
}

/// A sortable collection of versions.
///
/// `sort()` produces ascending order by `(major, minor, patch)`; callers
/// wanting newest-first iterate `.rev()` afterwards, matching the original
/// `sort.Sort(sort.Reverse(semver.Versions(...)))` idiom.
#[derive(Debug, Clone, Default)]
pub struct Versions(pub Vec<Version>);

impl Versions {
    pub fn new(versions: Vec<Version>) -> Self {
        Versions(versions)
    }

    pub fn sort(&mut self) {
        self.0.sort();
    }

    /// Sort descending (newest first), the order resolvers iterate in.
    pub fn sort_descending(&mut self) {
        self.0.sort_by(|a, b| b.cmp(a));
    }

    pub fn into_inner(self) -> Vec<Version> {
        self.0
    }
}
