//! keel.toml settings parser.
//!
//! Management-side settings the planner and daemon need: where the
//! management server lives, the CA bundle nodes should trust for it,
//! and how installer images are resolved.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Daemon-level settings loaded from `keel.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub images: ImageSettings,
}

/// Management server connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Base URL of the management server, e.g. `https://mgmt.keel.dev`.
    pub url: String,
    /// PEM CA bundle nodes use to trust the management server. Empty
    /// means the manifest fetch refuses to run (no system-trust fallback).
    #[serde(default)]
    pub ca_certs: String,
}

/// Installer image resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSettings {
    /// Installer image base; the runtime flavor name is appended.
    #[serde(default = "default_installer_image")]
    pub installer_image: String,
    /// Optional private registry prefixed onto resolved images.
    #[serde(default)]
    pub private_registry: String,
}

fn default_installer_image() -> String {
    "keel/keel-installer-".to_string()
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            installer_image: default_installer_image(),
            private_registry: String::new(),
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Installer image base with any private registry prefix applied.
    pub fn installer_image_base(&self) -> String {
        let registry = self.images.private_registry.trim_end_matches('/');
        if registry.is_empty() {
            self.images.installer_image.clone()
        } else {
            format!("{}/{}", registry, self.images.installer_image)
        }
    }
}
