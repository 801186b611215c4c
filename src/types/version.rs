// ABOUTME: Semantic version triple rendered as vMAJOR.MINOR.PATCH.
// ABOUTME: Parsing accepts an optional leading 'v' and rejects anything else.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("version cannot be empty")]
    Empty,

    #[error("malformed version '{0}' (expected vMAJOR.MINOR.PATCH)")]
    Malformed(String),

    #[error("negative version component in '{0}'")]
    Negative(String),

    #[error("version component overflow incrementing {0}")]
    Overflow(String),
}

/// A `major.minor.patch` version. Ordering is lexicographic over the triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }

        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let parts: Vec<&str> = body.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionError::Malformed(input.to_string()));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.starts_with('-') {
                return Err(VersionError::Negative(input.to_string()));
            }
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(VersionError::Malformed(input.to_string()));
            }
            *slot = part
                .parse()
                .map_err(|_| VersionError::Malformed(input.to_string()))?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Which component to increment when computing the next version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncrementKind {
    Patch,
    Minor,
    Major,
    Auto,
}

impl FromStr for IncrementKind {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patch" => Ok(IncrementKind::Patch),
            "minor" => Ok(IncrementKind::Minor),
            "major" => Ok(IncrementKind::Major),
            "auto" => Ok(IncrementKind::Auto),
            other => Err(VersionError::Malformed(format!(
                "{other} (expected patch, minor, major or auto)"
            ))),
        }
    }
}

impl fmt::Display for IncrementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncrementKind::Patch => "patch",
            IncrementKind::Minor => "minor",
            IncrementKind::Major => "major",
            IncrementKind::Auto => "auto",
        };
        f.write_str(s)
    }
}
