//! Lifecycle extension points around the build, upload and deploy stages.
//!
//! Stages only see [`Hooks`]: six optional typed callbacks, where an absent
//! hook is a no-op. [`shell_hooks`] is the collaborator that turns the
//! `HooksConfig` strings of a module (and the registry's global hooks) into
//! callbacks running shell commands. Global hooks run first, then module hooks.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, HookFailedDetails, Result};
use crate::log::LogSink;
use crate::module::{HooksConfig, ModuleConfig, UploadConfig};
use crate::utils::command;
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeBuild,
    AfterBuild,
    BeforeUpload,
    AfterUpload,
    BeforeDeploy,
    AfterDeploy,
}

impl HookPoint {
    pub const ALL: [HookPoint; 6] = [
        HookPoint::BeforeBuild,
        HookPoint::AfterBuild,
        HookPoint::BeforeUpload,
        HookPoint::AfterUpload,
        HookPoint::BeforeDeploy,
        HookPoint::AfterDeploy,
    ];

    /// Name as used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::BeforeBuild => "beforeBuild",
            HookPoint::AfterBuild => "afterBuild",
            HookPoint::BeforeUpload => "beforeUpload",
            HookPoint::AfterUpload => "afterUpload",
            HookPoint::BeforeDeploy => "beforeDeploy",
            HookPoint::AfterDeploy => "afterDeploy",
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            HookPoint::BeforeBuild | HookPoint::AfterBuild => "build",
            HookPoint::BeforeUpload | HookPoint::AfterUpload => "upload",
            HookPoint::BeforeDeploy | HookPoint::AfterDeploy => "deploy",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type BuildHook = Box<dyn Fn(&dyn LogSink, &ModuleConfig) -> Result<()> + Send + Sync>;
pub type AfterBuildHook = Box<dyn Fn(&dyn LogSink, &ModuleConfig, bool) -> Result<()> + Send + Sync>;
/// Receives the local artifact path and the upload target.
pub type UploadHook = Box<dyn Fn(&dyn LogSink, &Path, &UploadConfig) -> Result<()> + Send + Sync>;
pub type AfterUploadHook = Box<dyn Fn(&dyn LogSink, &Path, &UploadConfig, bool) -> Result<()> + Send + Sync>;
/// Receives the local deploy script path and the upload target.
pub type DeployHook = Box<dyn Fn(&dyn LogSink, &Path, &UploadConfig) -> Result<()> + Send + Sync>;
pub type AfterDeployHook = Box<dyn Fn(&dyn LogSink, &Path, &UploadConfig, bool) -> Result<()> + Send + Sync>;

/// Typed extension points. After-hooks receive the stage's success flag and
/// run whether or not the stage succeeded.
#[derive(Default)]
pub struct Hooks {
    pub before_build: Option<BuildHook>,
    pub after_build: Option<AfterBuildHook>,
    pub before_upload: Option<UploadHook>,
    pub after_upload: Option<AfterUploadHook>,
    pub before_deploy: Option<DeployHook>,
    pub after_deploy: Option<AfterDeployHook>,
}

impl Hooks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.before_build.is_none()
            && self.after_build.is_none()
            && self.before_upload.is_none()
            && self.after_upload.is_none()
            && self.before_deploy.is_none()
            && self.after_deploy.is_none()
    }

    pub fn before_build(&self, log: &dyn LogSink, module: &ModuleConfig) -> Result<()> {
        match &self.before_build {
            Some(hook) => hook(log, module),
            None => Ok(()),
        }
    }

    pub fn after_build(&self, log: &dyn LogSink, module: &ModuleConfig, success: bool) -> Result<()> {
        match &self.after_build {
            Some(hook) => hook(log, module, success),
            None => Ok(()),
        }
    }

    pub fn before_upload(&self, log: &dyn LogSink, local: &Path, upload: &UploadConfig) -> Result<()> {
        match &self.before_upload {
            Some(hook) => hook(log, local, upload),
            None => Ok(()),
        }
    }

    pub fn after_upload(&self, log: &dyn LogSink, local: &Path, upload: &UploadConfig, success: bool) -> Result<()> {
        match &self.after_upload {
            Some(hook) => hook(log, local, upload, success),
            None => Ok(()),
        }
    }

    pub fn before_deploy(&self, log: &dyn LogSink, script: &Path, upload: &UploadConfig) -> Result<()> {
        match &self.before_deploy {
            Some(hook) => hook(log, script, upload),
            None => Ok(()),
        }
    }

    pub fn after_deploy(&self, log: &dyn LogSink, script: &Path, upload: &UploadConfig, success: bool) -> Result<()> {
        match &self.after_deploy {
            Some(hook) => hook(log, script, upload, success),
            None => Ok(()),
        }
    }
}

/// Combine a stage outcome with its after-hook outcome.
///
/// A failing after-hook fails a successful stage. When the stage already
/// failed, its error wins and the hook error is only logged.
pub fn settle<T>(
    log: &dyn LogSink,
    point: HookPoint,
    outcome: Result<T>,
    after: Result<()>,
) -> Result<T> {
    match (outcome, after) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(hook_err)) => Err(hook_err),
        (Err(stage_err), Ok(())) => Err(stage_err),
        (Err(stage_err), Err(hook_err)) => {
            log.warn(&format!("{} hook also failed: {}", point, hook_err.message));
            Err(stage_err)
        }
    }
}

// === Shell hook collaborator ===

/// Result of running a single hook command.
#[derive(Debug, Clone, Serialize)]
pub struct HookCommandResult {
    pub command: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Shell commands configured for a hook point: global first, then module.
pub fn resolve_commands(global: &HooksConfig, module: &HooksConfig, point: HookPoint) -> Vec<String> {
    [global.get(point), module.get(point)]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect()
}

/// Run hook commands in order, stopping at the first failure.
///
/// Output of each command is forwarded to `log`. A non-zero exit or a spawn
/// failure is a `hook.failed` error.
pub fn run_commands(
    commands: &[String],
    working_dir: &Path,
    point: HookPoint,
    env: &[(&str, &str)],
    log: &dyn LogSink,
    capture_limit: usize,
) -> Result<Vec<HookCommandResult>> {
    let mut results = Vec::new();

    for cmd in commands {
        log.info(&format!("Running {} hook: {}", point, cmd));

        let output = command::run_captured(cmd, Some(working_dir), env, capture_limit)
            .map_err(|e| {
                Error::hook_failed(HookFailedDetails {
                    hook: point.as_str().to_string(),
                    command: cmd.clone(),
                    exit_code: -1,
                    output: e.to_string(),
                })
            })?;

        if !output.stdout.trim().is_empty() {
            log.info(output.stdout.trim_end());
        }
        if !output.stderr.trim().is_empty() {
            log.warn(output.stderr.trim_end());
        }

        if !output.success {
            return Err(Error::hook_failed(HookFailedDetails {
                hook: point.as_str().to_string(),
                command: cmd.clone(),
                exit_code: output.exit_code.unwrap_or(-1),
                output: command::error_text(&output.stdout, &output.stderr),
            }));
        }

        results.push(HookCommandResult {
            command: cmd.clone(),
            success: output.success,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
        });
    }

    Ok(results)
}

/// Everything a shell hook closure needs, owned so the closure is `'static`.
#[derive(Clone)]
struct ShellHookContext {
    module_id: String,
    module_name: String,
    working_dir: PathBuf,
    capture_limit: usize,
}

impl ShellHookContext {
    fn run(
        &self,
        log: &dyn LogSink,
        commands: &[String],
        point: HookPoint,
        success: Option<bool>,
        path_var: Option<(&str, &Path)>,
    ) -> Result<()> {
        let success_text = success.map(|s| if s { "true" } else { "false" });
        let path_text = path_var.map(|(name, p)| (name, p.to_string_lossy().to_string()));

        let mut env: Vec<(&str, &str)> = vec![
            ("ALPHONSE_MODULE_ID", self.module_id.as_str()),
            ("ALPHONSE_MODULE_NAME", self.module_name.as_str()),
            ("ALPHONSE_STAGE", point.stage()),
            ("ALPHONSE_HOOK", point.as_str()),
        ];
        if let Some(text) = success_text {
            env.push(("ALPHONSE_SUCCESS", text));
        }
        if let Some((name, value)) = &path_text {
            env.push((*name, value.as_str()));
        }

        run_commands(
            commands,
            &self.working_dir,
            point,
            &env,
            log,
            self.capture_limit,
        )
        .map(|_| ())
    }
}

/// Build [`Hooks`] that run the configured shell commands for `module`.
///
/// Commands run in the module's build working directory. Points with no
/// configured command stay absent.
pub fn shell_hooks(workspace: &Workspace, module: &ModuleConfig, global: &HooksConfig) -> Hooks {
    let ctx = ShellHookContext {
        module_id: module.id.clone(),
        module_name: module.name.clone(),
        working_dir: workspace.resolve(&module.build.working_directory),
        capture_limit: workspace.defaults().capture_limit,
    };

    let commands = |point| {
        let list = resolve_commands(global, &module.hooks, point);
        (!list.is_empty()).then_some(list)
    };

    let mut hooks = Hooks::none();

    if let Some(list) = commands(HookPoint::BeforeBuild) {
        let ctx = ctx.clone();
        hooks.before_build = Some(Box::new(move |log: &dyn LogSink, _module: &ModuleConfig| {
            ctx.run(log, &list, HookPoint::BeforeBuild, None, None)
        }));
    }

    if let Some(list) = commands(HookPoint::AfterBuild) {
        let ctx = ctx.clone();
        hooks.after_build = Some(Box::new(move |log: &dyn LogSink, _module: &ModuleConfig, success: bool| {
            ctx.run(log, &list, HookPoint::AfterBuild, Some(success), None)
        }));
    }

    if let Some(list) = commands(HookPoint::BeforeUpload) {
        let ctx = ctx.clone();
        hooks.before_upload = Some(Box::new(move |log: &dyn LogSink, local: &Path, _upload: &UploadConfig| {
            ctx.run(
                log,
                &list,
                HookPoint::BeforeUpload,
                None,
                Some(("ALPHONSE_ARTIFACT", local)),
            )
        }));
    }

    if let Some(list) = commands(HookPoint::AfterUpload) {
        let ctx = ctx.clone();
        hooks.after_upload = Some(Box::new(
            move |log: &dyn LogSink, local: &Path, _upload: &UploadConfig, success: bool| {
                ctx.run(
                    log,
                    &list,
                    HookPoint::AfterUpload,
                    Some(success),
                    Some(("ALPHONSE_ARTIFACT", local)),
                )
            },
        ));
    }

    if let Some(list) = commands(HookPoint::BeforeDeploy) {
        let ctx = ctx.clone();
        hooks.before_deploy = Some(Box::new(move |log: &dyn LogSink, script: &Path, _upload: &UploadConfig| {
            ctx.run(
                log,
                &list,
                HookPoint::BeforeDeploy,
                None,
                Some(("ALPHONSE_SCRIPT", script)),
            )
        }));
    }

    if let Some(list) = commands(HookPoint::AfterDeploy) {
        hooks.after_deploy = Some(Box::new(
            move |log: &dyn LogSink, script: &Path, _upload: &UploadConfig, success: bool| {
                ctx.run(
                    log,
                    &list,
                    HookPoint::AfterDeploy,
                    Some(success),
                    Some(("ALPHONSE_SCRIPT", script)),
                )
            },
        ));
    }

    hooks
}
