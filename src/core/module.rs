use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::hooks::HookPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Npm,
    Maven,
    Python,
}

impl ModuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::Npm => "npm",
            ModuleType::Maven => "maven",
            ModuleType::Python => "python",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "npm" => Ok(ModuleType::Npm),
            "maven" => Ok(ModuleType::Maven),
            "python" => Ok(ModuleType::Python),
            other => Err(Error::validation_invalid_argument(
                "type",
                format!("Unknown module type '{}'", other),
                None,
                Some(vec![
                    "npm".to_string(),
                    "maven".to_string(),
                    "python".to_string(),
                ]),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Shell command line run in `working_directory`.
    #[serde(default)]
    pub command: String,
    /// Build output directory, relative to `working_directory`. Cleaned before
    /// each build when set.
    #[serde(default)]
    pub directory: String,
    /// Directory the command runs in, relative to the workspace root.
    #[serde(default)]
    pub working_directory: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// File or directory to archive, relative to the build working directory.
    #[serde(default)]
    pub target: String,
    /// Archive file name; `<module name>.zip` when blank.
    #[serde(default)]
    pub output_name: String,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target: String::new(),
            output_name: String::new(),
        }
    }
}

impl CompressConfig {
    /// Archive file name for a module called `module_name`.
    pub fn archive_name(&self, module_name: &str) -> String {
        let configured = self.output_name.trim();
        if configured.is_empty() {
            format!("{}.zip", module_name)
        } else {
            configured.to_string()
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub remote_path: String,
}

fn default_port() -> u16 {
    22
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            remote_path: String::new(),
        }
    }
}

impl UploadConfig {
    /// `user@host:port`, for log lines and error details.
    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

impl fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("remote_path", &self.remote_path)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    #[serde(default)]
    pub script_name: String,
    /// Local script path, relative to the workspace root.
    #[serde(default)]
    pub script_path: String,
}

/// Named hook references. Values are shell commands; absent or blank means
/// no hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HooksConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_upload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_upload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_deploy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_deploy: Option<String>,
}

impl HooksConfig {
    /// Configured command for a hook point, ignoring blank entries.
    pub fn get(&self, point: HookPoint) -> Option<&str> {
        let value = match point {
            HookPoint::BeforeBuild => &self.before_build,
            HookPoint::AfterBuild => &self.after_build,
            HookPoint::BeforeUpload => &self.before_upload,
            HookPoint::AfterUpload => &self.after_upload,
            HookPoint::BeforeDeploy => &self.before_deploy,
            HookPoint::AfterDeploy => &self.after_deploy,
        };
        value.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        HookPoint::ALL.iter().all(|p| self.get(*p).is_none())
    }
}

/// One configured module. The four stage blocks are required; a record
/// missing any of them does not deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub path: String,
    pub build: BuildConfig,
    pub compress: CompressConfig,
    pub upload: UploadConfig,
    pub deploy: DeployConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
}

impl ModuleConfig {
    /// Reject records with blank identity fields.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("id", &self.id),
            ("name", &self.name),
            ("path", &self.path),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::validation_invalid_argument(
                    field,
                    format!("Module field '{}' must not be empty", field),
                    non_empty(&self.id),
                    None,
                ));
            }
        }

        if self.upload.port == 0 {
            return Err(Error::config_invalid_value(
                "upload.port",
                Some(self.upload.port.to_string()),
                "port must be between 1 and 65535",
            ));
        }

        Ok(())
    }

    /// Copy safe to print: a non-empty upload password is masked.
    pub fn redacted(&self) -> ModuleConfig {
        let mut module = self.clone();
        if !module.upload.password.is_empty() {
            module.upload.password = REDACTED.to_string();
        }
        module
    }
}

/// Placeholder printed instead of a stored secret.
pub const REDACTED: &str = "<redacted>";

fn non_empty(value: &str) -> Option<String> {
    (!value.trim().is_empty()).then(|| value.to_string())
}

/// Candidate module found by scanning a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedModule {
    pub name: String,
    /// Directory relative to the scanned root.
    pub path: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "id": "web",
            "name": "web",
            "type": "npm",
            "path": "web",
            "build": {"command": "npm run build", "directory": "./dist", "workingDirectory": "web"},
            "compress": {"enabled": true, "target": "./dist", "outputName": "web.zip"},
            "upload": {"host": "h", "port": 2222, "username": "u", "password": "p", "remotePath": "/srv/web"},
            "deploy": {"scriptName": "web.sh", "scriptPath": ".deploy/scripts/web.sh"}
        })
    }

    #[test]
    fn deserializes_camel_case_record() {
        let module: ModuleConfig = serde_json::from_value(sample()).unwrap();
        assert_eq!(module.module_type, ModuleType::Npm);
        assert_eq!(module.build.working_directory, "web");
        assert_eq!(module.upload.port, 2222);
        assert_eq!(module.upload.remote_path, "/srv/web");
        assert!(module.hooks.is_empty());
    }

    #[test]
    fn missing_stage_block_is_rejected() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("deploy");
        assert!(serde_json::from_value::<ModuleConfig>(value).is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut value = sample();
        value["type"] = json!("cargo");
        assert!(serde_json::from_value::<ModuleConfig>(value).is_err());
        assert!("cargo".parse::<ModuleType>().is_err());
        assert_eq!("maven".parse::<ModuleType>().unwrap(), ModuleType::Maven);
    }

    #[test]
    fn validate_rejects_blank_identity() {
        let mut module: ModuleConfig = serde_json::from_value(sample()).unwrap();
        assert!(module.validate().is_ok());

        module.name = "  ".to_string();
        let err = module.validate().unwrap_err();
        assert_eq!(err.details["field"], "name");
    }

    #[test]
    fn validate_rejects_port_zero() {
        let mut module: ModuleConfig = serde_json::from_value(sample()).unwrap();
        module.upload.port = 0;
        let err = module.validate().unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");
        assert_eq!(err.details["key"], "upload.port");
    }

    #[test]
    fn archive_name_falls_back_to_module_name() {
        let mut compress: CompressConfig = serde_json::from_value(sample()["compress"].clone()).unwrap();
        assert_eq!(compress.archive_name("web"), "web.zip");
        compress.output_name = "  ".to_string();
        assert_eq!(compress.archive_name("api"), "api.zip");
    }

    #[test]
    fn redacted_copy_masks_password_only() {
        let module: ModuleConfig = serde_json::from_value(sample()).unwrap();
        let shown = serde_json::to_string(&module.redacted()).unwrap();
        assert!(shown.contains(r#""password":"<redacted>""#));
        assert!(shown.contains(r#""username":"u""#));
        assert_eq!(module.upload.password, "p");

        let mut blank = module.clone();
        blank.upload.password.clear();
        assert_eq!(blank.redacted().upload.password, "");
        assert!(!format!("{:?}", module).contains("\"p\""));
    }

    #[test]
    fn hooks_ignore_blank_commands() {
        let hooks = HooksConfig {
            before_build: Some("   ".to_string()),
            after_deploy: Some("echo done".to_string()),
            ..HooksConfig::default()
        };
        assert_eq!(hooks.get(HookPoint::BeforeBuild), None);
        assert_eq!(hooks.get(HookPoint::AfterDeploy), Some("echo done"));
    }

    #[test]
    fn upload_debug_redacts_password() {
        let upload = UploadConfig {
            password: "hunter2".to_string(),
            ..UploadConfig::default()
        };
        assert!(!format!("{:?}", upload).contains("hunter2"));
    }
}
