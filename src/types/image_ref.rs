// ABOUTME: Container image repository reference (registry + name, no tag).
// ABOUTME: The deployed version supplies the tag at apply time.

use serde::{Deserialize, Deserializer};
use std::fmt;
use thiserror::Error;

use super::Version;

#[derive(Debug, Error)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("image reference must not carry a tag or digest: {0}")]
    Tagged(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        if let Some(c) = input
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '/' | ':' | '.' | '-' | '_' | '@')))
        {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        if input.contains('@') {
            return Err(ParseImageRefError::Tagged(input.to_string()));
        }

        // A colon after the last slash is a tag; one before it is a registry port.
        let last_segment = input.rsplit('/').next().unwrap_or(input);
        if last_segment.contains(':') {
            return Err(ParseImageRefError::Tagged(input.to_string()));
        }

        let (registry, name) = match input.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest.to_string())
            }
            _ => (None, input.to_string()),
        };

        Ok(Self { registry, name })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full reference for a given version, e.g. `registry/org/web:v1.2.7`.
    pub fn tagged(&self, version: &Version) -> String {
        format!("{}:{}", self, version)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref registry) = self.registry {
            write!(f, "{}/", registry)?;
        }
        f.write_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ImageRef::parse(&s).map_err(serde::de::Error::custom)
    }
}
