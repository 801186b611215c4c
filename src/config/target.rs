// ABOUTME: Deployment target configuration (host, credentials, working directory).
// ABOUTME: Accepts "host", "user@host", "host:port" and "user@host:port" shorthands.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::EnvValue;
use crate::error::Result;
use crate::executor::{Target, Transport};
use crate::types::Environment;

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub identity: Option<EnvValue>,
    #[serde(default)]
    pub working_dir: String,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default)]
    pub trust_first_connection: bool,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    22
}

impl TargetConfig {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("target address cannot be empty".to_string());
        }

        // [user@]host[:port]
        let (user_part, rest) = match s.split_once('@') {
            Some((user, rest)) if user.is_empty() => {
                return Err(format!("empty user in target address: {}", rest));
            }
            Some((user, rest)) => (Some(user), rest),
            None => (None, s),
        };

        let (host, port) = if let Some(colon_pos) = rest.rfind(':') {
            let port_str = &rest[colon_pos + 1..];
            let port = port_str
                .parse::<u16>()
                .map_err(|_| format!("invalid port: {}", port_str))?;
            (&rest[..colon_pos], port)
        } else {
            (rest, default_port())
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(TargetConfig {
            host: host.to_string(),
            port,
            user: user_part.map(str::to_string),
            identity: None,
            working_dir: String::new(),
            transport: Transport::Ssh,
            trust_first_connection: false,
            known_hosts: None,
        })
    }

    /// Resolve credential references and paths into an executor target.
    ///
    /// Relative local working directories are anchored at `root`.
    pub fn resolve(&self, environment: Environment, root: &Path) -> Result<Target> {
        let identity = self
            .identity
            .as_ref()
            .map(|value| value.resolve().map(PathBuf::from))
            .transpose()?;

        let working_dir = match self.transport {
            Transport::Local if !Path::new(&self.working_dir).is_absolute() => {
                root.join(&self.working_dir).to_string_lossy().into_owned()
            }
            _ => self.working_dir.clone(),
        };

        Ok(Target {
            environment,
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            identity,
            working_dir,
            transport: self.transport,
            trust_first_connection: self.trust_first_connection,
            known_hosts: self.known_hosts.clone(),
        })
    }
}
