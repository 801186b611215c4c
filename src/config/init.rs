// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a commented stagecoach.yml template.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ImageRef, ServiceName};

use super::CONFIG_FILENAME;

pub fn init_config(
    dir: &Path,
    service: Option<&str>,
    image: Option<&str>,
    force: bool,
) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let service = ServiceName::new(service.unwrap_or("my-app"))
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;
    let image = ImageRef::parse(image.unwrap_or("registry.example.com/my-org/my-app"))
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;

    std::fs::write(&config_path, generate_template_yaml(&service, &image))?;
    Ok(())
}

fn generate_template_yaml(service: &ServiceName, image: &ImageRef) -> String {
    format!(
        r#"service: {service}
image: {image}
# versions_dir: .            # holds .env.<environment> version records
# state_dir: .stagecoach     # snapshots, attempt logs, leases
command_timeout: 5m

# Shell templates run on the target. Placeholders:
# {{service}} {{image}} {{version}} {{tag}} {{environment}} {{env_file}}
# commands:
#   stop: "docker stop {{service}} || true; docker rm {{service}} || true"
#   apply: "docker pull {{tag}}"
#   start: "docker run -d --name {{service}} --env-file {{env_file}} {{tag}}"

health:
  max_attempts: 5
  interval: 10s
  probe_timeout: 10s
  rollback_attempts: 2
  probes:
    - name: liveness
      kind: http
      url: http://localhost/
      expect_status: 200

environments:
  dev:
    target:
      host: dev.example.com
      user: deploy
      working_dir: /opt/{service}
      # SSH host key verification (default: false)
      # Set to true to enable Trust-On-First-Use, or pre-populate ~/.ssh/known_hosts
      # trust_first_connection: true
  prod:
    target: deploy@prod.example.com
    requires: dev
    approval: true
"#
    )
}
