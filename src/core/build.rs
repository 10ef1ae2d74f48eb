use serde::Serialize;
use std::path::Path;

use crate::error::{BuildFailedDetails, Error, Result};
use crate::hooks::{self, HookPoint, Hooks};
use crate::io;
use crate::module::ModuleConfig;
use crate::utils::command::{self, CapturedOutput};
use crate::workspace::Workspace;

/// Lines of build output quoted in a failure message.
const FAILURE_TAIL_LINES: usize = 15;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    pub module_id: String,
    pub command: String,
    pub working_directory: String,
    /// Entries removed from the output directory before building, when it
    /// existed and was cleaned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleaned_entries: Option<usize>,
    #[serde(flatten)]
    pub output: CapturedOutput,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
    pub success: bool,
}

/// A build command is usable when it is not blank.
pub fn validate_command(command: &str) -> bool {
    !command.trim().is_empty()
}

/// Run the build stage for `module`.
///
/// Order: `before_build` hook (its failure aborts the stage), clean the
/// configured output directory, run the command in the module working
/// directory, then `after_build` with the success flag whatever happened.
/// Stderr output alone never fails a build; only the exit status does.
pub fn build(workspace: &Workspace, module: &ModuleConfig, hooks: &Hooks) -> Result<BuildOutput> {
    let log = workspace.log();
    hooks.before_build(log, module)?;

    let outcome = run_build(workspace, module);
    let success = outcome.is_ok();
    let after = hooks.after_build(log, module, success);

    hooks::settle(log, HookPoint::AfterBuild, outcome, after)
}

fn run_build(workspace: &Workspace, module: &ModuleConfig) -> Result<BuildOutput> {
    let log = workspace.log();
    let working_dir = workspace.resolve(&module.build.working_directory);
    let cleaned_entries = clean_output_directory(workspace, module);

    log.info(&format!("Building module: {}", module.name));
    log.info(&format!("Build command: {}", module.build.command));
    log.info(&format!("Working directory: {}", working_dir.display()));

    if !validate_command(&module.build.command) {
        return Err(Error::validation_invalid_argument(
            "build.command",
            format!("Module '{}' has no build command", module.id),
            Some(module.id.clone()),
            None,
        ));
    }

    let limit = workspace.defaults().capture_limit;
    let output = command::run_captured(&module.build.command, Some(&working_dir), &[], limit)
        .map_err(|e| {
            log.error(&format!("Failed to start build for {}: {}", module.name, e));
            Error::build_spawn_failed(
                format!(
                    "Failed to start build command '{}' in {}: {}",
                    module.build.command,
                    working_dir.display(),
                    e
                ),
                BuildFailedDetails {
                    module_id: module.id.clone(),
                    command: module.build.command.clone(),
                    working_directory: working_dir.display().to_string(),
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                },
            )
        })?;

    if output.truncated {
        log.warn(&format!("Build output truncated at {} bytes per stream", limit));
    }

    if !output.success {
        log.error(&format!("Build failed for module {}", module.name));
        if !output.stdout.trim().is_empty() {
            log.error(output.stdout.trim_end());
        }
        if !output.stderr.trim().is_empty() {
            log.error(output.stderr.trim_end());
        }

        let message = format_build_error(
            &module.id,
            &module.build.command,
            &working_dir,
            output.exit_code,
            &output.stderr,
            &output.stdout,
        );
        return Err(Error::build_failed(
            message,
            BuildFailedDetails {
                module_id: module.id.clone(),
                command: module.build.command.clone(),
                working_directory: working_dir.display().to_string(),
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            },
        ));
    }

    if !output.stdout.trim().is_empty() {
        log.info(output.stdout.trim_end());
    }
    if !output.stderr.trim().is_empty() {
        log.warn(output.stderr.trim_end());
    }
    log.info(&format!("Module {} built successfully", module.name));

    Ok(BuildOutput {
        module_id: module.id.clone(),
        command: module.build.command.clone(),
        working_directory: working_dir.display().to_string(),
        cleaned_entries,
        output: CapturedOutput::new(output.stdout, output.stderr),
        exit_code: output.exit_code,
        truncated: output.truncated,
        success: true,
    })
}

/// Empty the build output directory if it exists. Failures are warnings:
/// stale files may then end up in the archive.
fn clean_output_directory(workspace: &Workspace, module: &ModuleConfig) -> Option<usize> {
    let log = workspace.log();

    if module.build.directory.trim().is_empty() {
        return None;
    }

    let dir = workspace.resolve_in_module(&module.build.working_directory, &module.build.directory);

    if !dir.is_dir() {
        log.info(&format!(
            "Build output directory does not exist, skipping cleanup: {}",
            dir.display()
        ));
        return None;
    }

    log.info(&format!("Cleaning build output directory: {}", dir.display()));
    match io::clean_directory(&dir) {
        Ok(removed) => {
            log.info(&format!("Removed {} entries from {}", removed, dir.display()));
            Some(removed)
        }
        Err(e) => {
            log.warn(&format!(
                "Failed to clean build output directory {}, continuing build: {}",
                dir.display(),
                e
            ));
            None
        }
    }
}

/// Failure message with the tail of the build output and hints for the
/// universal POSIX exit codes.
fn format_build_error(
    module_id: &str,
    build_cmd: &str,
    working_dir: &Path,
    exit_code: Option<i32>,
    stderr: &str,
    stdout: &str,
) -> String {
    let output_tail = command::tail_lines(&command::error_text(stdout, stderr), FAILURE_TAIL_LINES);

    let hint = match exit_code {
        Some(127) => "\nHint: Command not found. Check that the build command and its dependencies are installed and in PATH.",
        Some(126) => "\nHint: Permission denied. Check file permissions on the build script.",
        _ => "",
    };

    let code = exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());

    let mut msg = format!(
        "Build failed for '{}' (exit code {}).\n  Command: {}\n  Working directory: {}",
        module_id,
        code,
        build_cmd,
        working_dir.display()
    );

    if !output_tail.is_empty() {
        msg.push_str(&format!(
            "\n\n--- Build output (last {} lines) ---\n",
            FAILURE_TAIL_LINES
        ));
        msg.push_str(&output_tail);
        msg.push_str("\n--- End of output ---");
    }

    msg.push_str(hint);
    msg
}
