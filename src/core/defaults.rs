use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::paths;

/// Pipeline tunables. Every field can be overridden in `.deploy/settings.json`;
/// missing fields keep their built-in value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaults {
    /// Directory archives are written to, relative to the workspace root.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Maximum simultaneous file transfers during a directory upload.
    #[serde(default = "default_transfer_concurrency")]
    pub transfer_concurrency: usize,

    /// Bytes of build stdout/stderr kept per stream.
    #[serde(default = "default_capture_limit")]
    pub capture_limit: usize,

    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Program used for remote privilege escalation. Must accept `-S`.
    #[serde(default = "default_escalation_program")]
    pub escalation_program: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            transfer_concurrency: default_transfer_concurrency(),
            capture_limit: default_capture_limit(),
            ssh_port: default_ssh_port(),
            escalation_program: default_escalation_program(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_output_dir() -> String {
    ".deploy/output".to_string()
}

fn default_transfer_concurrency() -> usize {
    5
}

fn default_capture_limit() -> usize {
    10 * 1024 * 1024
}

fn default_ssh_port() -> u16 {
    22
}

fn default_escalation_program() -> String {
    "sudo".to_string()
}

fn default_connect_timeout_secs() -> u32 {
    10
}

/// Load defaults for a workspace, falling back to built-ins when the settings
/// file is missing or unreadable.
pub fn load_defaults(root: &Path) -> Defaults {
    load_defaults_from_file(root).unwrap_or_default()
}

fn load_defaults_from_file(root: &Path) -> Result<Defaults> {
    let path = paths::settings_file(root);

    if !path.exists() {
        return Err(Error::config_missing_key(
            "settings",
            Some(path.display().to_string()),
        ));
    }

    let content = crate::io::read_file(&path, &format!("read {}", path.display()))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}
