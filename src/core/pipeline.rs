//! Stage orchestration: build, compress, upload and deploy, strictly in order.
//!
//! A stage runs only when every earlier stage of the run succeeded. The first
//! failure ends the run with its error prefixed by the stage label; nothing
//! already done is undone.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::build::{self, BuildOutput};
use crate::compress::{self, ArchiveOutput};
use crate::deploy::{self, DeployOutput};
use crate::error::{Error, Result};
use crate::hooks::Hooks;
use crate::log::{LogSink, MemoryLog, TeeLog};
use crate::module::ModuleConfig;
use crate::ssh::Connector;
use crate::transfer::{self, UploadOutput};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Build,
    Compress,
    Upload,
    Deploy,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Build => "Build",
            Stage::Compress => "Compress",
            Stage::Upload => "Upload",
            Stage::Deploy => "Deploy",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which stages an entry point runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Build only.
    Build,
    /// Compress and transfer, no build and no remote script.
    Upload,
    /// Remote script only.
    Deploy,
    /// All four stages.
    Full,
}

impl RunMode {
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            RunMode::Build => &[Stage::Build],
            RunMode::Upload => &[Stage::Compress, Stage::Upload],
            RunMode::Deploy => &[Stage::Deploy],
            RunMode::Full => &[Stage::Build, Stage::Compress, Stage::Upload, Stage::Deploy],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub status: StageStatus,
}

/// State of one pipeline invocation. Lives only as long as the run.
pub struct PipelineRun {
    module: ModuleConfig,
    mode: RunMode,
    current: Option<Stage>,
    stages: Vec<StageRecord>,
    log: Arc<MemoryLog>,
}

impl PipelineRun {
    fn new(module: &ModuleConfig, mode: RunMode) -> Self {
        Self {
            module: module.clone(),
            mode,
            current: None,
            stages: Vec::new(),
            log: Arc::new(MemoryLog::new()),
        }
    }

    pub fn module(&self) -> &ModuleConfig {
        &self.module
    }

    pub fn current_stage(&self) -> Option<Stage> {
        self.current
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.log.lines()
    }

    fn completed(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|r| r.status == StageStatus::Success)
            .map(|r| r.stage)
            .collect()
    }

    /// Run one stage, recording its outcome and tagging its error.
    fn step<T>(&mut self, log: &dyn LogSink, stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let total = self.mode.stages().len();
        let position = self
            .mode
            .stages()
            .iter()
            .position(|s| *s == stage)
            .map(|i| i + 1)
            .unwrap_or(total);

        self.current = Some(stage);
        log.info(&format!("[{}/{}] {} started: {}", position, total, stage, self.module.name));

        match f() {
            Ok(value) => {
                log.info(&format!("[{}/{}] {} complete", position, total, stage));
                self.stages.push(StageRecord {
                    stage,
                    status: StageStatus::Success,
                });
                Ok(value)
            }
            Err(err) => {
                log.error(&format!("[{}/{}] {} failed", position, total, stage));
                self.stages.push(StageRecord {
                    stage,
                    status: StageStatus::Failed,
                });
                Err(err.in_stage(stage))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub module_id: String,
    pub mode: RunMode,
    pub stages_completed: Vec<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveOutput>,
    /// Path handed to the upload stage: the archive, or the raw target when
    /// compression is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeployOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_exit_code: Option<i32>,
    pub log: Vec<String>,
}

/// Runs modules through the stages with one set of hooks and one transport.
pub struct Pipeline<'a> {
    workspace: &'a Workspace,
    connector: &'a dyn Connector,
    hooks: Hooks,
}

impl<'a> Pipeline<'a> {
    pub fn new(workspace: &'a Workspace, connector: &'a dyn Connector) -> Self {
        Self {
            workspace,
            connector,
            hooks: Hooks::none(),
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn build_only(&self, module: &ModuleConfig) -> Result<PipelineReport> {
        self.run(module, RunMode::Build)
    }

    pub fn upload_only(&self, module: &ModuleConfig) -> Result<PipelineReport> {
        self.run(module, RunMode::Upload)
    }

    pub fn deploy_only(&self, module: &ModuleConfig) -> Result<PipelineReport> {
        self.run(module, RunMode::Deploy)
    }

    pub fn run_full(&self, module: &ModuleConfig) -> Result<PipelineReport> {
        self.run(module, RunMode::Full)
    }

    /// Run the stages of `mode` for a snapshot of `module`.
    pub fn run(&self, module: &ModuleConfig, mode: RunMode) -> Result<PipelineReport> {
        let mut run = PipelineRun::new(module, mode);

        let sinks: Vec<Arc<dyn LogSink>> = vec![self.workspace.log_handle(), run.log.clone() as Arc<dyn LogSink>];
        let workspace = self
            .workspace
            .clone()
            .with_log(Arc::new(TeeLog::new(sinks)));
        let log = workspace.log();

        let mut report = PipelineReport {
            module_id: module.id.clone(),
            mode,
            stages_completed: Vec::new(),
            build: None,
            archive: None,
            artifact: None,
            upload: None,
            deploy: None,
            remote_exit_code: None,
            log: Vec::new(),
        };

        for stage in mode.stages() {
            match stage {
                Stage::Build => {
                    let output = run.step(log, Stage::Build, || {
                        build::build(&workspace, module, &self.hooks)
                    })?;
                    report.build = Some(output);
                }
                Stage::Compress => {
                    let artifact = run.step(log, Stage::Compress, || {
                        self.artifact(&workspace, module)
                    })?;
                    report.artifact = Some(artifact.path.clone());
                    report.archive = artifact.archive;
                }
                Stage::Upload => {
                    let artifact = report.artifact.clone().ok_or_else(|| {
                        Error::internal_unexpected("Upload stage reached without an artifact")
                    })?;
                    let output = run.step(log, Stage::Upload, || {
                        transfer::upload(
                            &workspace,
                            self.connector,
                            &artifact,
                            &module.upload,
                            &self.hooks,
                        )
                    })?;
                    report.upload = Some(output);
                }
                Stage::Deploy => {
                    let output = run.step(log, Stage::Deploy, || {
                        deploy::deploy(
                            &workspace,
                            self.connector,
                            &module.deploy.script_path,
                            &module.upload,
                            &self.hooks,
                        )
                    })?;
                    report.remote_exit_code = Some(output.exit_code);
                    report.deploy = Some(output);
                }
            }
        }

        run.current = None;
        report.stages_completed = run.completed();
        report.log = run.log_lines();
        Ok(report)
    }

    /// Produce the upload artifact: an archive when compression is enabled,
    /// otherwise the resolved compress target itself.
    fn artifact(&self, workspace: &Workspace, module: &ModuleConfig) -> Result<Artifact> {
        let working_dir = Some(module.build.working_directory.as_str());

        if !module.compress.enabled {
            let target = compress::resolve_target(workspace, &module.compress, working_dir);
            workspace.log().info(&format!(
                "Compression disabled, uploading {} as is",
                target.display()
            ));
            return Ok(Artifact {
                path: target,
                archive: None,
            });
        }

        let archive = compress::compress(
            workspace,
            &module.compress,
            &module.name,
            &workspace.output_dir(),
            working_dir,
        )?;

        Ok(Artifact {
            path: archive.path.clone(),
            archive: Some(archive),
        })
    }
}

struct Artifact {
    path: PathBuf,
    archive: Option<ArchiveOutput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_run_stages_in_pipeline_order() {
        assert_eq!(RunMode::Build.stages(), &[Stage::Build]);
        assert_eq!(RunMode::Upload.stages(), &[Stage::Compress, Stage::Upload]);
        assert_eq!(RunMode::Deploy.stages(), &[Stage::Deploy]);
        assert_eq!(
            RunMode::Full.stages(),
            &[Stage::Build, Stage::Compress, Stage::Upload, Stage::Deploy]
        );
    }

    #[test]
    fn failed_step_is_recorded_and_prefixed() {
        let module: ModuleConfig = serde_json::from_value(serde_json::json!({
            "id": "web", "name": "web", "type": "npm", "path": "web",
            "build": {}, "compress": {}, "upload": {}, "deploy": {}
        }))
        .unwrap();
        let mut run = PipelineRun::new(&module, RunMode::Full);
        let log = MemoryLog::new();

        run.step(&log, Stage::Build, || Ok(())).unwrap();
        let err = run
            .step(&log, Stage::Compress, || -> Result<()> {
                Err(crate::Error::internal_unexpected("disk full"))
            })
            .unwrap_err();

        assert!(err.message.starts_with("Compress failed: "));
        assert_eq!(run.completed(), vec![Stage::Build]);
        assert_eq!(run.stages()[1].status, StageStatus::Failed);
        assert_eq!(run.current_stage(), Some(Stage::Compress));
        assert!(log.contains("[2/4] Compress failed"));
    }
}
