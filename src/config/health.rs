// ABOUTME: Health checklist configuration: probes plus the retry policy around them.
// ABOUTME: Probes are http status checks, readiness JSON checks, or smoke commands.

use std::time::Duration;

use nonempty::NonEmpty;
use serde::Deserialize;

use super::deserialize::{deserialize_probes, deserialize_scalar_string};

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Attempts for the reduced check run after a restore.
    #[serde(default = "default_rollback_attempts")]
    pub rollback_attempts: u32,

    #[serde(deserialize_with = "deserialize_probes")]
    pub probes: NonEmpty<ProbeConfig>,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_rollback_attempts() -> u32 {
    2
}

/// One named probe in the checklist.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProbeConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: ProbeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeKind {
    /// HTTP status probe.
    Http {
        url: String,
        #[serde(default = "default_expect_status")]
        expect_status: u16,
    },
    /// Readiness endpoint returning JSON; `field` is a dotted path.
    Readiness {
        url: String,
        field: String,
        #[serde(deserialize_with = "deserialize_scalar_string")]
        expect: String,
    },
    /// Arbitrary command that must exit 0.
    Smoke { command: String },
}

fn default_expect_status() -> u16 {
    200
}

impl HealthConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("health.max_attempts must be at least 1".to_string());
        }
        if self.rollback_attempts == 0 {
            return Err("health.rollback_attempts must be at least 1".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for probe in self.probes.iter() {
            if probe.name.trim().is_empty() {
                return Err("health probe names cannot be empty".to_string());
            }
            if !seen.insert(probe.name.as_str()) {
                return Err(format!("duplicate health probe name: {}", probe.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_probe_kinds_with_defaults() {
        let yaml = r#"
probes:
  - { name: liveness, kind: http, url: "http://localhost/" }
  - { name: ready, kind: readiness, url: "http://localhost/ready", field: status.db, expect: true }
  - { name: smoke, kind: smoke, command: "true" }
"#;
        let health: HealthConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(health.max_attempts, 5);
        assert_eq!(health.interval, Duration::from_secs(10));
        assert_eq!(health.rollback_attempts, 2);
        assert_eq!(health.probes.len(), 3);
        assert_eq!(
            health.probes.head.kind,
            ProbeKind::Http {
                url: "http://localhost/".into(),
                expect_status: 200
            }
        );
        assert!(matches!(
            &health.probes.get(1).unwrap().kind,
            ProbeKind::Readiness { expect, .. } if expect == "true"
        ));
    }

    #[test]
    fn humantime_durations() {
        let yaml = "interval: 250ms\nprobe_timeout: 3s\nprobes: [{ name: s, kind: smoke, command: 'true' }]";
        let health: HealthConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(health.interval, Duration::from_millis(250));
        assert_eq!(health.probe_timeout, Duration::from_secs(3));
    }

    #[test]
    fn empty_probe_list_rejected() {
        let err = serde_yaml::from_str::<HealthConfig>("probes: []").unwrap_err();
        assert!(err.to_string().contains("at least one health probe"));
    }

    #[test]
    fn unknown_probe_kind_rejected() {
        let yaml = "probes: [{ name: x, kind: tcp, url: 'h:1' }]";
        assert!(serde_yaml::from_str::<HealthConfig>(yaml).is_err());
    }

    #[test]
    fn validate_rejects_duplicates_and_zero_attempts() {
        let yaml = "probes: [{ name: a, kind: smoke, command: x }, { name: a, kind: smoke, command: y }]";
        let health: HealthConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(health.validate().unwrap_err().contains("duplicate"));

        let yaml = "max_attempts: 0\nprobes: [{ name: a, kind: smoke, command: x }]";
        let health: HealthConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(health.validate().is_err());
    }
}
