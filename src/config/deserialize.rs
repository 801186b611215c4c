// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles target shorthands, non-empty lists and scalar-as-string fields.

use std::collections::BTreeMap;

use nonempty::NonEmpty;
use serde::Deserialize;

use super::{EnvironmentConfig, ProbeConfig, TargetConfig};
use crate::types::Environment;

pub fn deserialize_target<'de, D>(deserializer: D) -> Result<TargetConfig, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match TargetEntry::deserialize(deserializer)? {
        TargetEntry::Simple(s) => TargetConfig::parse(&s).map_err(serde::de::Error::custom),
        TargetEntry::Detailed(c) => Ok(c),
    }
}

pub fn deserialize_probes<'de, D>(deserializer: D) -> Result<NonEmpty<ProbeConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let probes: Vec<ProbeConfig> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(probes)
        .ok_or_else(|| serde::de::Error::custom("at least one health probe is required"))
}

pub fn deserialize_environments<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<Environment, EnvironmentConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let environments = BTreeMap::<Environment, EnvironmentConfig>::deserialize(deserializer)?;
    if environments.is_empty() {
        return Err(serde::de::Error::custom(
            "at least one environment is required",
        ));
    }
    Ok(environments)
}

/// Accept any YAML scalar and keep its string form, so `expect: true` and
/// `expect: "true"` mean the same thing.
pub fn deserialize_scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Bool(b) => b.to_string(),
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Str(s) => s,
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetEntry {
    Simple(String),
    Detailed(TargetConfig),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}
