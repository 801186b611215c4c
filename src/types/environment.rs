// ABOUTME: Deployment environment identifiers (dev, stg, uat, prod).
// ABOUTME: Fixed set with a recommended promotion order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown environment '{0}' (expected one of: dev, stg, uat, prod)")]
pub struct UnknownEnvironment(pub String);

/// A deployment environment.
///
/// Environments are independent of each other. The declaration order is the
/// recommended promotion order and is what `Ord` compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Stg,
    Uat,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Dev,
        Environment::Stg,
        Environment::Uat,
        Environment::Prod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Stg => "stg",
            Environment::Uat => "uat",
            Environment::Prod => "prod",
        }
    }

    /// Name of the version record file for this environment.
    pub fn record_filename(&self) -> String {
        format!(".env.{}", self.as_str())
    }
}

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "stg" => Ok(Environment::Stg),
            "uat" => Ok(Environment::Uat),
            "prod" => Ok(Environment::Prod),
            _ => Err(UnknownEnvironment(s.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_names() {
        for env in Environment::ALL {
            assert_eq!(env.as_str().parse::<Environment>().unwrap(), env);
        }
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
    }

    #[test]
    fn rejects_unknown_name() {
        let err = "qa".parse::<Environment>().unwrap_err();
        assert!(err.to_string().contains("qa"));
    }

    #[test]
    fn promotion_order() {
        assert!(Environment::Dev < Environment::Stg);
        assert!(Environment::Uat < Environment::Prod);
    }

    #[test]
    fn record_filename_matches_env_file_layout() {
        assert_eq!(Environment::Stg.record_filename(), ".env.stg");
    }
}
