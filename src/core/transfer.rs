//! Upload stage: copy a local file or directory tree to the remote host.

use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result, TransferUploadFailedDetails};
use crate::hooks::{self, HookPoint, Hooks};
use crate::log::LogSink;
use crate::module::UploadConfig;
use crate::paths;
use crate::ssh::{self, Connector, RemoteSession};
use crate::utils::shell;
use crate::workspace::Workspace;

/// Outcome of copying one file during a directory upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransfer {
    pub local_path: PathBuf,
    pub remote_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileTransfer {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-file results of [`put_directory`], in upload-completion order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUpload {
    pub uploaded: Vec<FileTransfer>,
    pub failed: Vec<FileTransfer>,
}

impl DirectoryUpload {
    pub fn total(&self) -> usize {
        self.uploaded.len() + self.failed.len()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutput {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub host: String,
    /// Present for directory uploads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<DirectoryUpload>,
    pub success: bool,
}

/// Copy every file under `local_dir` to the same relative path below
/// `remote_dir`, running at most `concurrency` transfers at once.
///
/// `on_file` sees each file as it finishes. A failing file is recorded and
/// does not stop the others; only an unreadable local tree fails the call.
pub fn put_directory(
    session: &dyn RemoteSession,
    local_dir: &Path,
    remote_dir: &str,
    concurrency: usize,
    on_file: &(dyn Fn(&FileTransfer) + Sync),
) -> Result<DirectoryUpload> {
    let mut files = Vec::new();
    let mut empty_dirs = Vec::new();
    collect_files(local_dir, "", &mut files, &mut empty_dirs).map_err(|e| {
        Error::transfer_upload_failed(TransferUploadFailedDetails {
            local_path: local_dir.display().to_string(),
            remote_path: remote_dir.to_string(),
            error: format!("cannot read local directory: {}", e),
        })
    })?;

    let queue: Mutex<VecDeque<(PathBuf, String)>> = Mutex::new(
        files
            .into_iter()
            .map(|(local, relative)| (local, paths::remote_join(remote_dir, &relative)))
            .collect(),
    );
    let report = Mutex::new(DirectoryUpload::default());
    let workers = concurrency.max(1);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let next = match queue.lock() {
                    Ok(mut pending) => pending.pop_front(),
                    Err(_) => None,
                };
                let Some((local, remote)) = next else {
                    break;
                };

                let transfer = FileTransfer {
                    error: session.put_file(&local, &remote).err().map(|e| e.message),
                    local_path: local,
                    remote_path: remote,
                };
                on_file(&transfer);

                if let Ok(mut report) = report.lock() {
                    if transfer.succeeded() {
                        report.uploaded.push(transfer);
                    } else {
                        report.failed.push(transfer);
                    }
                }
            });
        }
    });

    let mut report = report
        .into_inner()
        .map_err(|_| Error::internal_unexpected("Upload worker panicked"))?;

    for relative in empty_dirs {
        let remote = paths::remote_join(remote_dir, &relative);
        let command = format!("mkdir -p {}", shell::quote_remote_path(&remote));
        if let Err(e) = ssh::exec_checked(session, &command) {
            let transfer = FileTransfer {
                local_path: local_dir.join(&relative),
                remote_path: remote,
                error: Some(e.message),
            };
            on_file(&transfer);
            report.failed.push(transfer);
        }
    }

    Ok(report)
}

/// Files below `dir` as `(absolute, relative)` pairs with `/` separators,
/// plus relative paths of empty directories. Sorted by name.
fn collect_files(
    dir: &Path,
    prefix: &str,
    files: &mut Vec<(PathBuf, String)>,
    empty_dirs: &mut Vec<String>,
) -> std::io::Result<()> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    children.sort();

    for path in children {
        let relative = format!("{}{}", prefix, paths::base_name(&path));
        if path.is_dir() {
            if fs::read_dir(&path)?.next().is_none() {
                empty_dirs.push(relative);
            } else {
                collect_files(&path, &format!("{}/", relative), files, empty_dirs)?;
            }
        } else {
            files.push((path, relative));
        }
    }

    Ok(())
}

/// Run the upload stage.
///
/// Order: `before_upload` hook, connect, create the remote directory, copy
/// the file or tree, dispose the session, then `after_upload` with the
/// success flag whatever happened. The session is disposed exactly once on
/// every path past a successful connect.
pub fn upload(
    workspace: &Workspace,
    connector: &dyn Connector,
    local_path: &Path,
    config: &UploadConfig,
    hooks: &Hooks,
) -> Result<UploadOutput> {
    let log = workspace.log();
    hooks.before_upload(log, local_path, config)?;

    log.info(&format!("Uploading to {}:{}", config.host, config.port));
    log.info(&format!("Local path: {}", local_path.display()));
    log.info(&format!("Remote path: {}", config.remote_path));

    let outcome = connector.connect(config).and_then(|mut session| {
        log.info("SSH connection established");
        let result = transfer(workspace, session.as_ref(), local_path, config);
        session.dispose();
        result
    });

    match &outcome {
        Ok(_) => log.info("Upload complete"),
        Err(e) => log.error(&format!("Upload failed: {}", e.message)),
    }

    let after = hooks.after_upload(log, local_path, config, outcome.is_ok());
    hooks::settle(log, HookPoint::AfterUpload, outcome, after)
}

fn transfer(
    workspace: &Workspace,
    session: &dyn RemoteSession,
    local_path: &Path,
    config: &UploadConfig,
) -> Result<UploadOutput> {
    let log = workspace.log();

    ssh::exec_checked(
        session,
        &format!("mkdir -p {}", shell::quote_remote_path(&config.remote_path)),
    )?;

    let metadata = fs::metadata(local_path).map_err(|e| {
        Error::transfer_upload_failed(TransferUploadFailedDetails {
            local_path: local_path.display().to_string(),
            remote_path: config.remote_path.clone(),
            error: e.to_string(),
        })
    })?;

    if metadata.is_dir() {
        let concurrency = workspace.defaults().transfer_concurrency;
        let files = put_directory(
            session,
            local_path,
            &config.remote_path,
            concurrency,
            &|file| log_file_transfer(log, file),
        )?;

        if !files.failed.is_empty() {
            log.warn(&format!(
                "{} of {} files failed to upload",
                files.failed.len(),
                files.total()
            ));
        }

        return Ok(UploadOutput {
            local_path: local_path.to_path_buf(),
            remote_path: config.remote_path.clone(),
            host: session.host().to_string(),
            files: Some(files),
            success: true,
        });
    }

    let remote = paths::remote_join(&config.remote_path, &paths::base_name(local_path));
    session.put_file(local_path, &remote)?;
    log.info(&format!("Uploaded {} -> {}", local_path.display(), remote));

    Ok(UploadOutput {
        local_path: local_path.to_path_buf(),
        remote_path: remote,
        host: session.host().to_string(),
        files: None,
        success: true,
    })
}

fn log_file_transfer(log: &dyn LogSink, file: &FileTransfer) {
    match &file.error {
        None => log.info(&format!(
            "Uploaded {} -> {}",
            file.local_path.display(),
            file.remote_path
        )),
        Some(e) => log.warn(&format!(
            "Failed to upload {} -> {}: {}",
            file.local_path.display(),
            file.remote_path,
            e
        )),
    }
}

/// Connect and dispose without transferring anything.
pub fn test_connection(connector: &dyn Connector, config: &UploadConfig) -> bool {
    match connector.connect(config) {
        Ok(mut session) => {
            session.dispose();
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::log::MemoryLog;
    use crate::ssh::LineHandler;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Session that copies into a local directory standing in for `/`.
    struct DirSession {
        remote_root: PathBuf,
        fail_suffix: Option<String>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        disposals: Arc<AtomicUsize>,
        commands: Arc<Mutex<Vec<String>>>,
    }

    impl DirSession {
        fn local(&self, remote: &str) -> PathBuf {
            self.remote_root.join(remote.trim_start_matches('/'))
        }
    }

    impl RemoteSession for DirSession {
        fn host(&self) -> &str {
            "h"
        }

        fn put_file(&self, local: &Path, remote: &str) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));

            let result = match &self.fail_suffix {
                Some(suffix) if remote.ends_with(suffix.as_str()) => {
                    Err(Error::transfer_upload_failed(TransferUploadFailedDetails {
                        local_path: local.display().to_string(),
                        remote_path: remote.to_string(),
                        error: "connection reset".to_string(),
                    }))
                }
                _ => {
                    let target = self.local(remote);
                    fs::create_dir_all(target.parent().unwrap()).unwrap();
                    fs::copy(local, target).map(|_| ()).map_err(|e| {
                        Error::internal_io(e.to_string(), None)
                    })
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn exec(&self, command: &str, _: LineHandler<'_>, _: LineHandler<'_>) -> Result<i32> {
            self.commands.lock().unwrap().push(command.to_string());
            if let Some(path) = command.strip_prefix("mkdir -p ") {
                fs::create_dir_all(self.local(path.trim_matches('\''))).unwrap();
            }
            Ok(0)
        }

        fn dispose(&mut self) {
            self.disposals.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct DirConnector {
        remote_root: PathBuf,
        fail_suffix: Option<String>,
        refuse: bool,
        peak: Arc<AtomicUsize>,
        disposals: Arc<AtomicUsize>,
        commands: Arc<Mutex<Vec<String>>>,
    }

    impl DirConnector {
        fn new(remote_root: &Path) -> Self {
            Self {
                remote_root: remote_root.to_path_buf(),
                fail_suffix: None,
                refuse: false,
                peak: Arc::new(AtomicUsize::new(0)),
                disposals: Arc::new(AtomicUsize::new(0)),
                commands: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn session(&self) -> DirSession {
            DirSession {
                remote_root: self.remote_root.clone(),
                fail_suffix: self.fail_suffix.clone(),
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak: Arc::clone(&self.peak),
                disposals: Arc::clone(&self.disposals),
                commands: Arc::clone(&self.commands),
            }
        }
    }

    impl Connector for DirConnector {
        fn connect(&self, config: &UploadConfig) -> Result<Box<dyn RemoteSession>> {
            if self.refuse {
                return Err(Error::transfer_connect_failed(
                    crate::error::TransferConnectFailedDetails {
                        host: config.host.clone(),
                        port: config.port,
                        username: config.username.clone(),
                        error: "refused".to_string(),
                    },
                ));
            }
            Ok(Box::new(self.session()))
        }
    }

    fn upload_config(remote_path: &str) -> UploadConfig {
        UploadConfig {
            host: "h".to_string(),
            port: 22,
            username: "u".to_string(),
            password: "p".to_string(),
            remote_path: remote_path.to_string(),
        }
    }

    fn twelve_files(dir: &Path) -> PathBuf {
        let local = dir.join("site");
        for i in 0..12 {
            let sub = local.join(format!("d{}", i % 3));
            fs::create_dir_all(&sub).unwrap();
            fs::write(sub.join(format!("f{}.txt", i)), format!("file {}", i)).unwrap();
        }
        local
    }

    #[test]
    fn directory_upload_is_bounded_and_survives_one_failure() {
        let local_dir = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let local = twelve_files(local_dir.path());

        let mut connector = DirConnector::new(remote_dir.path());
        connector.fail_suffix = Some("f7.txt".to_string());
        let session = connector.session();
        let ticks = AtomicUsize::new(0);

        let report = put_directory(&session, &local, "/srv/x", 5, &|_| {
            ticks.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(report.uploaded.len(), 11);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].remote_path.ends_with("/srv/x/d1/f7.txt"));
        assert_eq!(ticks.load(Ordering::SeqCst), 12);
        assert!(connector.peak.load(Ordering::SeqCst) <= 5);

        for i in (0..12).filter(|i| *i != 7) {
            let arrived = remote_dir
                .path()
                .join(format!("srv/x/d{}/f{}.txt", i % 3, i));
            assert_eq!(fs::read_to_string(arrived).unwrap(), format!("file {}", i));
        }
    }

    #[test]
    fn empty_directories_are_created_remotely() {
        let local_dir = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        fs::create_dir_all(local_dir.path().join("site/empty")).unwrap();

        let connector = DirConnector::new(remote_dir.path());
        let session = connector.session();
        let report =
            put_directory(&session, &local_dir.path().join("site"), "/srv/x", 5, &|_| {}).unwrap();

        assert_eq!(report.total(), 0);
        assert!(remote_dir.path().join("srv/x/empty").is_dir());
    }

    #[test]
    fn file_upload_lands_under_remote_path_and_disposes_once() {
        let local_dir = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let archive = local_dir.path().join("x.zip");
        fs::write(&archive, "zip").unwrap();

        let log = Arc::new(MemoryLog::new());
        let ws = Workspace::new(local_dir.path(), log.clone());
        let connector = DirConnector::new(remote_dir.path());

        let output = upload(&ws, &connector, &archive, &upload_config("/srv/x"), &Hooks::none()).unwrap();

        assert_eq!(output.remote_path, "/srv/x/x.zip");
        assert_eq!(
            fs::read_to_string(remote_dir.path().join("srv/x/x.zip")).unwrap(),
            "zip"
        );
        assert_eq!(connector.disposals.load(Ordering::SeqCst), 1);
        assert_eq!(connector.commands.lock().unwrap()[0], "mkdir -p '/srv/x'");
        assert!(log.contains("Upload complete"));
    }

    #[test]
    fn missing_local_path_fails_and_still_disposes() {
        let local_dir = TempDir::new().unwrap();
        let remote_dir = TempDir::new().unwrap();
        let ws = Workspace::new(local_dir.path(), Arc::new(MemoryLog::new()));
        let connector = DirConnector::new(remote_dir.path());

        let seen = Arc::new(Mutex::new(None));
        let mut hooks = Hooks::none();
        let seen_in_hook = Arc::clone(&seen);
        hooks.after_upload = Some(Box::new(move |_: &dyn LogSink, _: &Path, _: &UploadConfig, success: bool| {
            *seen_in_hook.lock().unwrap() = Some(success);
            Ok(())
        }));

        let err = upload(
            &ws,
            &connector,
            &local_dir.path().join("gone.zip"),
            &upload_config("/srv/x"),
            &hooks,
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::TransferUploadFailed);
        assert_eq!(connector.disposals.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), Some(false));
    }

    #[test]
    fn refused_connection_runs_after_hook_without_dispose() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path(), Arc::new(MemoryLog::new()));
        let mut connector = DirConnector::new(dir.path());
        connector.refuse = true;

        let called = Arc::new(AtomicUsize::new(0));
        let mut hooks = Hooks::none();
        let counter = Arc::clone(&called);
        hooks.after_upload = Some(Box::new(move |_: &dyn LogSink, _: &Path, _: &UploadConfig, success: bool| {
            assert!(!success);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let err = upload(&ws, &connector, dir.path(), &upload_config("/srv"), &hooks).unwrap_err();

        assert_eq!(err.code, ErrorCode::TransferConnectFailed);
        assert_eq!(called.load(Ordering::SeqCst), 1);
        assert_eq!(connector.disposals.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_before_hook_skips_connect() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path(), Arc::new(MemoryLog::new()));
        let connector = DirConnector::new(dir.path());

        let mut hooks = Hooks::none();
        hooks.before_upload = Some(Box::new(|_: &dyn LogSink, _: &Path, _: &UploadConfig| {
            Err(Error::internal_unexpected("no"))
        }));

        assert!(upload(&ws, &connector, dir.path(), &upload_config("/srv"), &hooks).is_err());
        assert!(connector.commands.lock().unwrap().is_empty());
    }

    #[test]
    fn test_connection_reports_reachability() {
        let dir = TempDir::new().unwrap();
        let mut connector = DirConnector::new(dir.path());
        assert!(test_connection(&connector, &upload_config("/srv")));
        assert_eq!(connector.disposals.load(Ordering::SeqCst), 1);

        connector.refuse = true;
        assert!(!test_connection(&connector, &upload_config("/srv")));
    }
}
