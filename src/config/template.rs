// ABOUTME: Shell command templates run on targets, and placeholder rendering.
// ABOUTME: Placeholders: {service} {image} {version} {tag} {environment} {env_file}.

use serde::Deserialize;

use crate::types::{Environment, ImageRef, ServiceName, Version};

/// Commands making up the Applying step and state capture.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    pub stop: String,
    pub apply: String,
    pub start: String,
    /// Prints the live configuration payload. Must not mutate anything.
    pub capture: String,
    pub status: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            stop: "docker stop {service} || true; docker rm {service} || true".to_string(),
            apply: "docker pull {tag}".to_string(),
            start: "docker run -d --name {service} --env-file {env_file} {tag}".to_string(),
            // A target that was never deployed has no env file; that is an empty payload.
            capture: "test ! -e {env_file} || cat {env_file}".to_string(),
            status: "docker ps --filter name={service}".to_string(),
        }
    }
}

/// Per-environment replacements for individual templates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandOverrides {
    pub stop: Option<String>,
    pub apply: Option<String>,
    pub start: Option<String>,
    pub capture: Option<String>,
    pub status: Option<String>,
}

impl CommandTemplates {
    pub fn merged(&self, overrides: &CommandOverrides) -> Self {
        let pick = |o: &Option<String>, base: &String| o.clone().unwrap_or_else(|| base.clone());
        Self {
            stop: pick(&overrides.stop, &self.stop),
            apply: pick(&overrides.apply, &self.apply),
            start: pick(&overrides.start, &self.start),
            capture: pick(&overrides.capture, &self.capture),
            status: pick(&overrides.status, &self.status),
        }
    }
}

/// Values substituted into templates for one environment and version.
#[derive(Debug, Clone)]
pub struct TemplateVars {
    pub service: ServiceName,
    pub image: ImageRef,
    pub version: Version,
    pub environment: Environment,
}

impl TemplateVars {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "service" => Some(self.service.to_string()),
            "image" => Some(self.image.to_string()),
            "version" => Some(self.version.to_string()),
            "tag" => Some(self.image.tagged(&self.version)),
            "environment" => Some(self.environment.to_string()),
            "env_file" => Some(self.environment.record_filename()),
            _ => None,
        }
    }

    /// Substitute known placeholders. Unknown `{...}` sequences are kept
    /// verbatim, so things like curl's `%{http_code}` pass through.
    pub fn render(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}').and_then(|close| {
                self.lookup(&after[..close]).map(|value| (close, value))
            }) {
                Some((close, value)) => {
                    out.push_str(&value);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}
