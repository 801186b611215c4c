// ABOUTME: Configuration types and parsing for stagecoach.yml.
// ABOUTME: Handles YAML parsing, discovery, and per-environment override merging.

mod deserialize;
mod env_value;
mod health;
mod init;
mod target;
mod template;

pub use env_value::EnvValue;
pub use health::{HealthConfig, ProbeConfig, ProbeKind};
pub use init::init_config;
pub use target::TargetConfig;
pub use template::{CommandOverrides, CommandTemplates, TemplateVars};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::executor::Target;
use crate::types::{Environment, ImageRef, ServiceName, Version};
use deserialize::{deserialize_environments, deserialize_target};

pub const CONFIG_FILENAME: &str = "stagecoach.yml";
pub const CONFIG_FILENAME_ALT: &str = "stagecoach.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".stagecoach/config.yml";

/// Directory, relative to the project root, holding lifecycle hooks.
pub const HOOKS_DIR: &str = ".stagecoach/hooks";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceName,

    pub image: ImageRef,

    /// Directory holding the `.env.<environment>` version records.
    #[serde(default = "default_versions_dir")]
    pub versions_dir: PathBuf,

    /// Directory for snapshots, attempt logs and leases.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    #[serde(default)]
    pub commands: CommandTemplates,

    pub health: HealthConfig,

    #[serde(deserialize_with = "deserialize_environments")]
    pub environments: BTreeMap<Environment, EnvironmentConfig>,

    /// Directory relative paths resolve against; set when loading.
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(deserialize_with = "deserialize_target")]
    pub target: TargetConfig,

    /// Lower environment the deployed version must already have reached.
    #[serde(default)]
    pub requires: Option<Environment>,

    /// Deploys need explicit approval.
    #[serde(default)]
    pub approval: bool,

    /// Replaces the top-level checklist entirely.
    #[serde(default)]
    pub health: Option<HealthConfig>,

    #[serde(default)]
    pub commands: CommandOverrides,
}

fn default_versions_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".stagecoach")
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(300)
}

/// Everything needed to deploy to one environment, overrides applied.
#[derive(Debug, Clone)]
pub struct EnvironmentSettings {
    pub environment: Environment,
    pub service: ServiceName,
    pub image: ImageRef,
    pub target: Target,
    pub health: HealthConfig,
    pub commands: CommandTemplates,
    pub command_timeout: Duration,
    pub requires: Option<Environment>,
    pub approval: bool,
}

impl EnvironmentSettings {
    pub fn vars(&self, version: Version) -> TemplateVars {
        TemplateVars {
            service: self.service.clone(),
            image: self.image.clone(),
            version,
            environment: self.environment,
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.root = project_root(path);
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        self.health.validate().map_err(Error::InvalidConfig)?;
        for (environment, env_config) in &self.environments {
            if let Some(health) = &env_config.health {
                health
                    .validate()
                    .map_err(|e| Error::InvalidConfig(format!("{}: {}", environment, e)))?;
            }
            if env_config.requires == Some(*environment) {
                return Err(Error::InvalidConfig(format!(
                    "{} cannot require itself",
                    environment
                )));
            }
        }
        Ok(())
    }

    pub fn versions_path(&self) -> PathBuf {
        self.root.join(&self.versions_dir)
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(&self.state_dir)
    }

    pub fn hooks_path(&self) -> PathBuf {
        self.root.join(HOOKS_DIR)
    }

    /// Merge an environment's overrides onto the top-level settings.
    pub fn for_environment(&self, environment: Environment) -> Result<EnvironmentSettings> {
        let env_config = self
            .environments
            .get(&environment)
            .ok_or(Error::UnknownEnvironment(environment))?;

        Ok(EnvironmentSettings {
            environment,
            service: self.service.clone(),
            image: self.image.clone(),
            target: env_config.target.resolve(environment, &self.root)?,
            health: env_config
                .health
                .clone()
                .unwrap_or_else(|| self.health.clone()),
            commands: self.commands.merged(&env_config.commands),
            command_timeout: self.command_timeout,
            requires: env_config.requires,
            approval: env_config.approval,
        })
    }
}

/// Directory a config file's relative paths are anchored at. A config kept
/// under `.stagecoach/` belongs to the directory above it.
fn project_root(config_path: &Path) -> PathBuf {
    let parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    match parent.file_name() {
        Some(name) if name == ".stagecoach" => parent
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf(),
        _ => parent.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Transport;

    const YAML: &str = r#"
service: web-frontend
image: registry.example.com/org/web
command_timeout: 2m
health:
  max_attempts: 3
  interval: 1s
  probes:
    - { name: liveness, kind: http, url: "http://localhost/" }
environments:
  dev:
    target: { host: dev.example.com, user: deploy, working_dir: /opt/web }
  stg:
    target: "deploy@stg.example.com:2200"
    requires: dev
    commands:
      start: "systemctl start web"
  prod:
    target: { host: prod.example.com }
    requires: uat
    approval: true
    health:
      max_attempts: 10
      probes:
        - { name: smoke, kind: smoke, command: "true" }
"#;

    #[test]
    fn parses_full_config() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.service.as_str(), "web-frontend");
        assert_eq!(config.command_timeout, Duration::from_secs(120));
        assert_eq!(config.versions_dir, PathBuf::from("."));
        assert_eq!(config.environments.len(), 3);
    }

    #[test]
    fn environment_overrides_are_merged() {
        let config = Config::from_yaml(YAML).unwrap();

        let stg = config.for_environment(Environment::Stg).unwrap();
        assert_eq!(stg.target.host, "stg.example.com");
        assert_eq!(stg.target.port, 2200);
        assert_eq!(stg.target.transport, Transport::Ssh);
        assert_eq!(stg.commands.start, "systemctl start web");
        assert_eq!(stg.commands.stop, CommandTemplates::default().stop);
        assert_eq!(stg.health.max_attempts, 3);
        assert_eq!(stg.requires, Some(Environment::Dev));

        let prod = config.for_environment(Environment::Prod).unwrap();
        assert!(prod.approval);
        assert_eq!(prod.health.max_attempts, 10);
        assert_eq!(prod.health.probes.len(), 1);
    }

    #[test]
    fn unconfigured_environment_is_an_error() {
        let config = Config::from_yaml(YAML).unwrap();
        assert!(matches!(
            config.for_environment(Environment::Uat),
            Err(Error::UnknownEnvironment(Environment::Uat))
        ));
    }

    #[test]
    fn empty_environments_rejected() {
        let yaml = "service: web\nimage: web\nhealth: { probes: [{ name: s, kind: smoke, command: x }] }\nenvironments: {}";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn self_requirement_rejected() {
        let yaml = "service: web\nimage: web\nhealth: { probes: [{ name: s, kind: smoke, command: x }] }\nenvironments:\n  dev: { target: h, requires: dev }";
        assert!(matches!(Config::from_yaml(yaml), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn tagged_image_rejected() {
        let yaml = "service: web\nimage: web:latest\nhealth: { probes: [{ name: s, kind: smoke, command: x }] }\nenvironments:\n  dev: { target: h }";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn project_root_skips_dot_dir() {
        assert_eq!(
            project_root(Path::new("/srv/app/.stagecoach/config.yml")),
            PathBuf::from("/srv/app")
        );
        assert_eq!(
            project_root(Path::new("/srv/app/stagecoach.yml")),
            PathBuf::from("/srv/app")
        );
        assert_eq!(project_root(Path::new("stagecoach.yml")), PathBuf::from("."));
    }
}
