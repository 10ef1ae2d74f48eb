//! Remote deploy stage: ship a script and run it with elevated privileges.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{DeployScriptFailedDetails, Error, Result};
use crate::hooks::{self, HookPoint, Hooks};
use crate::log::LogSink;
use crate::module::UploadConfig;
use crate::paths;
use crate::ssh::{self, Connector, RemoteSession};
use crate::utils::shell;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutput {
    pub script_path: PathBuf,
    pub remote_script: String,
    pub host: String,
    pub exit_code: i32,
    /// Stderr lines dropped as escalation noise.
    #[serde(skip_serializing_if = "is_zero")]
    pub filtered_lines: usize,
    pub success: bool,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Remote command running `remote_script` under `program -S`, with the
/// password piped on stdin and an empty prompt.
///
/// The password is single-quoted with `'` rewritten as `'\''`, so a POSIX
/// shell hands it to `program` byte for byte.
pub fn escalation_command(program: &str, password: &str, remote_script: &str) -> String {
    format!(
        "{} | {} -S -p '' bash {}",
        shell::printf_line(password),
        shell::quote_arg(program),
        shell::quote_remote_path(remote_script)
    )
}

/// Whether a stderr line is a password prompt or escalation chatter.
pub fn is_escalation_noise(line: &str, program: &str) -> bool {
    let lower = line.to_lowercase();
    if lower.contains("password") || lower.contains("askpass") {
        return true;
    }

    let prefix = format!("{}:", paths::base_name(Path::new(program)));
    line.trim_start().starts_with(&prefix)
}

/// Text following a password prompt on the same line.
///
/// Prompts end without a newline, so the script's first stderr line can be
/// glued to one: `[sudo] password for u: fatal: missing`.
pub fn prompt_remainder(line: &str) -> Option<&str> {
    let lower = line.to_ascii_lowercase();
    let start = lower.find("password")?;
    let colon = lower[start..].find(": ")? + start;
    let rest = line[colon + 2..].trim();
    (!rest.is_empty()).then_some(rest)
}

/// Run the deploy stage.
///
/// The local script is checked first; a missing script fails before any hook
/// runs. Then: `before_deploy`, connect, upload the script next to the
/// artifact, `chmod +x`, run it escalated while streaming its output, dispose,
/// and `after_deploy` with the success flag whatever happened.
pub fn deploy(
    workspace: &Workspace,
    connector: &dyn Connector,
    script_path: &str,
    config: &UploadConfig,
    hooks: &Hooks,
) -> Result<DeployOutput> {
    let script = workspace.resolve(script_path);
    if !script.is_file() {
        return Err(Error::deploy_script_not_found(
            script_path,
            script.display().to_string(),
        ));
    }

    let log = workspace.log();
    hooks.before_deploy(log, &script, config)?;

    log.info(&format!("Deploying with script: {}", script_path));
    log.info(&format!("Server: {}:{}", config.host, config.port));

    let outcome = connector.connect(config).and_then(|mut session| {
        log.info("SSH connection established");
        let result = run_script(workspace, session.as_ref(), &script, config);
        session.dispose();
        result
    });

    match &outcome {
        Ok(_) => log.info("Deployment succeeded"),
        Err(e) => log.error(&format!("Deployment failed: {}", e.message)),
    }

    let after = hooks.after_deploy(log, &script, config, outcome.is_ok());
    hooks::settle(log, HookPoint::AfterDeploy, outcome, after)
}

fn run_script(
    workspace: &Workspace,
    session: &dyn RemoteSession,
    script: &Path,
    config: &UploadConfig,
) -> Result<DeployOutput> {
    let log = workspace.log();
    let program = workspace.defaults().escalation_program.as_str();

    let remote_script = paths::remote_join(&config.remote_path, &paths::base_name(script));
    session.put_file(script, &remote_script)?;
    log.info(&format!("Script uploaded: {}", remote_script));

    ssh::exec_checked(session, &format!("chmod +x {}", shell::quote_remote_path(&remote_script)))?;
    log.info("Script marked executable");

    log.info(&format!("Running deploy script via {} -S", program));
    let command = escalation_command(program, &config.password, &remote_script);
    let (exit_code, filtered_lines) = stream_escalated(session, &command, program, log)?;

    if exit_code != 0 {
        return Err(Error::deploy_script_failed(DeployScriptFailedDetails {
            remote_script,
            exit_code,
            host: session.host().to_string(),
        }));
    }

    Ok(DeployOutput {
        script_path: script.to_path_buf(),
        remote_script,
        host: session.host().to_string(),
        exit_code,
        filtered_lines,
        success: true,
    })
}

/// Execute `command`, logging stdout as info and stderr as warnings minus
/// escalation noise. Returns the exit code and the number of dropped lines.
fn stream_escalated(
    session: &dyn RemoteSession,
    command: &str,
    program: &str,
    log: &dyn LogSink,
) -> Result<(i32, usize)> {
    let mut filtered = 0;

    let code = session.exec(
        command,
        &mut |line: &str| {
            if !line.trim().is_empty() {
                log.info(line);
            }
        },
        &mut |line: &str| {
            if line.trim().is_empty() {
                return;
            }
            if !is_escalation_noise(line, program) {
                log.warn(line);
                return;
            }
            filtered += 1;
            if let Some(rest) = prompt_remainder(line).filter(|r| !is_escalation_noise(r, program)) {
                log.warn(rest);
            }
        },
    )?;

    Ok((code, filtered))
}
