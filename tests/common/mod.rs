#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alphonse::module::UploadConfig;
use alphonse::ssh::{Connector, LineHandler, RemoteSession};
use alphonse::{ModuleConfig, Result};

/// In-process stand-in for a remote host. Remote absolute paths map into
/// `remote_root`; the escalated deploy command runs the uploaded script
/// locally with `sh`.
#[derive(Clone)]
pub struct FakeRemote {
    pub remote_root: PathBuf,
    pub commands: Arc<Mutex<Vec<String>>>,
    pub connects: Arc<AtomicUsize>,
    pub disposals: Arc<AtomicUsize>,
}

impl FakeRemote {
    pub fn new(remote_root: &Path) -> Self {
        Self {
            remote_root: remote_root.to_path_buf(),
            commands: Arc::new(Mutex::new(Vec::new())),
            connects: Arc::new(AtomicUsize::new(0)),
            disposals: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Local path standing in for a remote one.
    pub fn path(&self, remote: &str) -> PathBuf {
        self.remote_root.join(remote.trim_start_matches('/'))
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> usize {
        self.disposals.load(Ordering::SeqCst)
    }
}

impl Connector for FakeRemote {
    fn connect(&self, _config: &UploadConfig) -> Result<Box<dyn RemoteSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            remote: self.clone(),
        }))
    }
}

struct FakeSession {
    remote: FakeRemote,
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('\'')
}

impl RemoteSession for FakeSession {
    fn host(&self) -> &str {
        "h"
    }

    fn put_file(&self, local: &Path, remote: &str) -> Result<()> {
        let target = self.remote.path(remote);
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::copy(local, &target).unwrap();
        Ok(())
    }

    fn exec(
        &self,
        command: &str,
        on_stdout: LineHandler<'_>,
        on_stderr: LineHandler<'_>,
    ) -> Result<i32> {
        self.remote.commands.lock().unwrap().push(command.to_string());

        if let Some(path) = command.strip_prefix("mkdir -p ") {
            fs::create_dir_all(self.remote.path(unquote(path))).unwrap();
            return Ok(0);
        }

        if let Some((_, script)) = command.rsplit_once(" -p '' bash ") {
            let output = Command::new("sh")
                .arg(self.remote.path(unquote(script)))
                .current_dir(&self.remote.remote_root)
                .output()
                .unwrap();
            for line in String::from_utf8_lossy(&output.stdout).lines() {
                on_stdout(line);
            }
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                on_stderr(line);
            }
            return Ok(output.status.code().unwrap_or(-1));
        }

        Ok(0)
    }

    fn dispose(&mut self) {
        self.remote.disposals.fetch_add(1, Ordering::SeqCst);
    }
}

/// The module used by the end-to-end scenarios.
pub fn module(command: &str, directory: &str) -> ModuleConfig {
    serde_json::from_value(serde_json::json!({
        "id": "x",
        "name": "x",
        "type": "npm",
        "path": ".",
        "build": {"command": command, "directory": directory, "workingDirectory": "."},
        "compress": {"enabled": true, "target": "./out", "outputName": "x.zip"},
        "upload": {"host": "h", "port": 22, "username": "u", "password": "p", "remotePath": "/srv/x"},
        "deploy": {"scriptName": "deploy.sh", "scriptPath": "deploy.sh"}
    }))
    .unwrap()
}

pub fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
