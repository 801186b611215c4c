// ABOUTME: Client credential discovery and public key authentication.
// ABOUTME: An explicit identity wins, then the SSH agent, then the usual ~/.ssh keys.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::client::{Handle, Handler};
use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, load_secret_key};
use tokio::net::UnixStream;

use super::error::{Error, Result};

/// Key files tried, in order, when no identity or agent is available.
const DEFAULT_IDENTITIES: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

pub(crate) enum Credentials {
    Agent(AgentClient<UnixStream>),
    Key(Arc<PrivateKey>),
}

impl Credentials {
    pub(crate) async fn discover(identity: Option<&Path>) -> Result<Self> {
        if let Some(path) = identity {
            return load_key(path).map(Self::Key);
        }

        if let Ok(agent) = AgentClient::connect_env().await {
            return Ok(Self::Agent(agent));
        }

        let home = std::env::var_os("HOME").ok_or_else(|| {
            Error::NoCredentials("no SSH agent and HOME is not set".to_string())
        })?;
        let ssh_dir = PathBuf::from(home).join(".ssh");
        DEFAULT_IDENTITIES
            .iter()
            .find_map(|name| load_key(&ssh_dir.join(name)).ok())
            .map(Self::Key)
            .ok_or_else(|| {
                Error::NoCredentials(format!(
                    "no SSH agent and no usable key in {}",
                    ssh_dir.display()
                ))
            })
    }

    /// Try each available key for `user`. Errors only on protocol failures.
    pub(crate) async fn authenticate<H: Handler>(
        self,
        handle: &mut Handle<H>,
        user: &str,
    ) -> Result<()> {
        let accepted = match self {
            Self::Agent(mut agent) => {
                let identities = agent.request_identities().await.map_err(|e| {
                    Error::NoCredentials(format!("cannot list agent keys: {}", e))
                })?;
                let mut accepted = false;
                for public in identities {
                    let outcome = handle
                        .authenticate_publickey_with(user, public, None, &mut agent)
                        .await;
                    if matches!(outcome, Ok(ref result) if result.success()) {
                        accepted = true;
                        break;
                    }
                }
                accepted
            }
            Self::Key(key) => {
                let hash = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(Error::Protocol)?
                    .flatten();
                handle
                    .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash))
                    .await
                    .map_err(Error::Protocol)?
                    .success()
            }
        };

        if accepted {
            Ok(())
        } else {
            Err(Error::Rejected {
                user: user.to_string(),
            })
        }
    }
}

fn load_key(path: &Path) -> Result<Arc<PrivateKey>> {
    load_secret_key(path, None)
        .map(Arc::new)
        .map_err(|e| Error::Key {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
