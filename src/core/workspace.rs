use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::defaults::{self, Defaults};
use crate::error::Result;
use crate::log::{FileLog, LogSink, StderrLog, TeeLog};
use crate::paths;

/// Explicit context every stage runs in: where the workspace lives, where log
/// lines go, and which tunables apply.
#[derive(Clone)]
pub struct Workspace {
    root: PathBuf,
    log: Arc<dyn LogSink>,
    defaults: Defaults,
}

impl Workspace {
    /// Workspace with built-in defaults overridden by `.deploy/settings.json`.
    ///
    /// A relative `root` is anchored at the current directory, so every
    /// resolved path is absolute.
    pub fn new(root: impl Into<PathBuf>, log: Arc<dyn LogSink>) -> Self {
        let root = paths::absolutize(&root.into());
        let defaults = defaults::load_defaults(&root);
        Self {
            root,
            log,
            defaults,
        }
    }

    /// Workspace logging to stderr and to the persistent log file.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let file = FileLog::open(&paths::log_file(&root))?;
        let sinks: Vec<Arc<dyn LogSink>> = vec![Arc::new(StderrLog), Arc::new(file)];
        let log = TeeLog::new(sinks);
        Ok(Self::new(root, Arc::new(log)))
    }

    pub fn with_defaults(mut self, defaults: Defaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Same workspace with log lines sent to `log` instead.
    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log(&self) -> &dyn LogSink {
        self.log.as_ref()
    }

    pub fn log_handle(&self) -> Arc<dyn LogSink> {
        Arc::clone(&self.log)
    }

    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        paths::resolve(&self.root, relative)
    }

    pub fn resolve_in_module(
        &self,
        working_directory: impl AsRef<Path>,
        relative: impl AsRef<Path>,
    ) -> PathBuf {
        paths::resolve_in_module(&self.root, working_directory, relative)
    }

    /// Absolute directory archives are written to.
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.defaults.output_dir)
    }
}
