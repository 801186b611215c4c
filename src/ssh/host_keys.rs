// ABOUTME: Server host key verification against known_hosts files.
// ABOUTME: Unknown hosts are rejected unless trust-on-first-use is enabled; changed keys always are.

use std::path::PathBuf;

use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key::PublicKey;

/// Which known_hosts file to consult and what to do with hosts missing from it.
#[derive(Debug, Clone, Default)]
pub struct KnownHosts {
    /// `None` means the user's `~/.ssh/known_hosts`.
    file: Option<PathBuf>,
    trust_unknown: bool,
}

impl KnownHosts {
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Accept and record keys of hosts not yet in the file.
    pub fn trust_unknown(mut self, trust: bool) -> Self {
        self.trust_unknown = trust;
        self
    }

    pub(crate) fn verify(&self, host: &str, port: u16, key: &PublicKey) -> bool {
        let checked = match &self.file {
            Some(path) => check_known_hosts_path(host, port, key, path),
            None => check_known_hosts(host, port, key),
        };

        match checked {
            Ok(true) => true,
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::error!(%host, port, "host key does not match known_hosts, refusing to connect");
                false
            }
            Ok(false) | Err(_) if self.trust_unknown => {
                tracing::warn!(%host, port, "trusting unknown host key on first connection");
                self.remember(host, port, key);
                true
            }
            Ok(false) => {
                tracing::warn!(%host, port, "host key not in known_hosts");
                false
            }
            Err(e) => {
                tracing::warn!(%host, port, "cannot read known_hosts: {}", e);
                false
            }
        }
    }

    fn remember(&self, host: &str, port: u16, key: &PublicKey) {
        let learned = match &self.file {
            Some(path) => learn_known_hosts_path(host, port, key, path),
            None => learn_known_hosts(host, port, key),
        };
        if let Err(e) = learned {
            tracing::warn!(%host, port, "failed to record host key: {}", e);
        }
    }
}
