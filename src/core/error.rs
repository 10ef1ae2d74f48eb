use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidJson,
    ConfigInvalidValue,
    ConfigIdCollision,

    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidJson,

    ModuleNotFound,

    BuildFailed,
    BuildSpawnFailed,

    CompressTargetNotFound,
    CompressWriteFailed,

    TransferConnectFailed,
    TransferUploadFailed,

    RemoteCommandFailed,

    DeployScriptNotFound,
    DeployScriptFailed,

    HookFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigIdCollision => "config.id_collision",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",

            ErrorCode::ModuleNotFound => "module.not_found",

            ErrorCode::BuildFailed => "build.failed",
            ErrorCode::BuildSpawnFailed => "build.spawn_failed",

            ErrorCode::CompressTargetNotFound => "compress.target_not_found",
            ErrorCode::CompressWriteFailed => "compress.write_failed",

            ErrorCode::TransferConnectFailed => "transfer.connect_failed",
            ErrorCode::TransferUploadFailed => "transfer.upload_failed",

            ErrorCode::RemoteCommandFailed => "remote.command_failed",

            ErrorCode::DeployScriptNotFound => "deploy.script_not_found",
            ErrorCode::DeployScriptFailed => "deploy.script_failed",

            ErrorCode::HookFailed => "hook.failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundDetails {
    pub id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Build stage failure. `exit_code` is `None` when the process never started
/// or was killed by a signal.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildFailedDetails {
    pub module_id: String,
    pub command: String,
    pub working_directory: String,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressTargetNotFoundDetails {
    pub target: String,
    pub resolved: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_working_directory: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressWriteFailedDetails {
    pub output: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConnectFailedDetails {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferUploadFailedDetails {
    pub local_path: String,
    pub remote_path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stderr: String,
    pub host: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployScriptNotFoundDetails {
    pub script_path: String,
    pub resolved: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployScriptFailedDetails {
    pub remote_script: String,
    pub exit_code: i32,
    pub host: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookFailedDetails {
    pub hook: String,
    pub command: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            format!("Invalid argument: {}", problem),
            details,
        )
    }

    pub fn validation_invalid_json(err: serde_json::Error, context: Option<String>) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
        });

        Self::new(
            ErrorCode::ValidationInvalidJson,
            format!("Invalid JSON: {}", err),
            details,
        )
    }

    pub fn module_not_found(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::ModuleNotFound,
            format!("Module '{}' not found", id),
            to_details(NotFoundDetails { id }),
        )
        .with_hint("Run 'alphonse module list' to see configured modules")
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("Missing required configuration key '{}'", key),
            to_details(ConfigMissingKeyDetails { key, path }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigInvalidJson,
            format!("Invalid JSON in configuration {}: {}", path, err),
            to_details(ConfigInvalidJsonDetails {
                path,
                error: err.to_string(),
            }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value for '{}': {}", key, problem),
            to_details(ConfigInvalidValueDetails {
                key,
                value,
                problem,
            }),
        )
    }

    pub fn config_id_collision(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(
            ErrorCode::ConfigIdCollision,
            format!("Module ID '{}' already exists", id),
            to_details(NotFoundDetails { id: id.clone() }),
        )
        .with_hint(format!(
            "Run 'alphonse module set {} ...' to change the existing module",
            id
        ))
    }

    pub fn build_failed(message: impl Into<String>, details: BuildFailedDetails) -> Self {
        Self::new(ErrorCode::BuildFailed, message, to_details(details))
    }

    pub fn build_spawn_failed(message: impl Into<String>, details: BuildFailedDetails) -> Self {
        Self::new(ErrorCode::BuildSpawnFailed, message, to_details(details))
    }

    pub fn compress_target_not_found(
        target: impl Into<String>,
        resolved: impl Into<String>,
        module_working_directory: Option<String>,
    ) -> Self {
        let target = target.into();
        let resolved = resolved.into();
        Self::new(
            ErrorCode::CompressTargetNotFound,
            format!(
                "Compress target not found: {} (resolved path: {})",
                target, resolved
            ),
            to_details(CompressTargetNotFoundDetails {
                target,
                resolved,
                module_working_directory,
            }),
        )
    }

    pub fn compress_write_failed(output: impl Into<String>, error: impl Into<String>) -> Self {
        let output = output.into();
        let error = error.into();
        Self::new(
            ErrorCode::CompressWriteFailed,
            format!("Failed to write archive {}: {}", output, error),
            to_details(CompressWriteFailedDetails { output, error }),
        )
    }

    pub fn transfer_connect_failed(details: TransferConnectFailedDetails) -> Self {
        let message = format!(
            "Failed to connect to {}@{}:{}: {}",
            details.username, details.host, details.port, details.error
        );
        let mut err = Self::new(
            ErrorCode::TransferConnectFailed,
            message,
            to_details(details),
        );
        err.retryable = Some(true);
        err
    }

    pub fn transfer_upload_failed(details: TransferUploadFailedDetails) -> Self {
        let message = format!(
            "Failed to upload {} -> {}: {}",
            details.local_path, details.remote_path, details.error
        );
        Self::new(ErrorCode::TransferUploadFailed, message, to_details(details))
    }

    pub fn remote_command_failed(details: RemoteCommandFailedDetails) -> Self {
        let message = format!(
            "Remote command failed on {} (exit code {}): {}",
            details.host, details.exit_code, details.command
        );
        Self::new(ErrorCode::RemoteCommandFailed, message, to_details(details))
    }

    pub fn deploy_script_not_found(
        script_path: impl Into<String>,
        resolved: impl Into<String>,
    ) -> Self {
        let script_path = script_path.into();
        let resolved = resolved.into();
        Self::new(
            ErrorCode::DeployScriptNotFound,
            format!(
                "Deploy script not found: {} (resolved path: {})",
                script_path, resolved
            ),
            to_details(DeployScriptNotFoundDetails {
                script_path,
                resolved,
            }),
        )
    }

    pub fn deploy_script_failed(details: DeployScriptFailedDetails) -> Self {
        let message = format!(
            "Deploy script {} failed on {} with exit code {}",
            details.remote_script, details.host, details.exit_code
        );
        Self::new(ErrorCode::DeployScriptFailed, message, to_details(details))
    }

    pub fn hook_failed(details: HookFailedDetails) -> Self {
        let message = format!(
            "Hook '{}' failed (exit code {}): {}",
            details.hook, details.exit_code, details.command
        );
        Self::new(ErrorCode::HookFailed, message, to_details(details))
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let message = match &context {
            Some(ctx) => format!("IO error ({}): {}", ctx, error),
            None => format!("IO error: {}", error),
        };
        Self::new(
            ErrorCode::InternalIoError,
            message,
            to_details(InternalIoErrorDetails { error, context }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::InternalJsonError,
            format!("JSON error: {}", error),
            to_details(InternalJsonErrorDetails { error, context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::InternalUnexpected,
            format!("Unexpected error: {}", error),
            serde_json::json!({ "error": error }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    /// Prefix the message with the pipeline stage that produced it.
    /// Code and details are preserved.
    pub fn in_stage(mut self, stage: impl std::fmt::Display) -> Self {
        self.message = format!("{} failed: {}", stage, self.message);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_target_not_found_names_both_paths() {
        let err = Error::compress_target_not_found("./out", "/ws/app/out", None);
        assert_eq!(err.code, ErrorCode::CompressTargetNotFound);
        assert!(err.message.contains("./out"));
        assert!(err.message.contains("/ws/app/out"));
        assert_eq!(err.details["resolved"], "/ws/app/out");
    }

    #[test]
    fn in_stage_prefixes_message_and_keeps_code() {
        let err = Error::internal_unexpected("boom").in_stage("upload");
        assert_eq!(err.code, ErrorCode::InternalUnexpected);
        assert!(err.message.starts_with("upload failed: "));
    }

    #[test]
    fn build_details_skip_empty_output() {
        let err = Error::build_failed(
            "Build failed",
            BuildFailedDetails {
                module_id: "web".to_string(),
                command: "npm run build".to_string(),
                working_directory: "/ws/web".to_string(),
                exit_code: Some(2),
                stdout: String::new(),
                stderr: "boom".to_string(),
            },
        );
        assert_eq!(err.details["exitCode"], 2);
        assert_eq!(err.details["stderr"], "boom");
        assert!(err.details.get("stdout").is_none());
    }

    #[test]
    fn connect_failure_is_retryable() {
        let err = Error::transfer_connect_failed(TransferConnectFailedDetails {
            host: "h".to_string(),
            port: 22,
            username: "u".to_string(),
            error: "refused".to_string(),
        });
        assert_eq!(err.retryable, Some(true));
        assert_eq!(err.code.as_str(), "transfer.connect_failed");
    }
}
