use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use crate::error::{Error, Result, TransferConnectFailedDetails, TransferUploadFailedDetails};
use crate::module::UploadConfig;
use crate::utils::command::for_each_line;
use crate::utils::shell;

use super::{Connector, LineHandler, RemoteSession};

/// Opens [`SshSession`]s through the system OpenSSH client.
#[derive(Debug, Clone)]
pub struct SshConnector {
    pub connect_timeout_secs: u32,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
        }
    }
}

impl Connector for SshConnector {
    fn connect(&self, config: &UploadConfig) -> Result<Box<dyn RemoteSession>> {
        let session = SshSession::connect(config, self.connect_timeout_secs)?;
        Ok(Box::new(session))
    }
}

/// Password-authenticated OpenSSH session.
///
/// `connect` authenticates once through `sshpass -e` (the password travels in
/// the `SSHPASS` environment variable) and leaves a ControlMaster running on a
/// private socket. Every later command reuses that master, so the password is
/// sent exactly once and never appears on a command line.
pub struct SshSession {
    host: String,
    user: String,
    port: u16,
    control_path: PathBuf,
    connect_timeout_secs: u32,
    disposed: bool,
}

impl SshSession {
    pub fn connect(config: &UploadConfig, connect_timeout_secs: u32) -> Result<Self> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let control_path = std::env::temp_dir().join(format!("alphonse-{}.sock", &id[..12]));

        let session = SshSession {
            host: config.host.clone(),
            user: config.username.clone(),
            port: config.port,
            control_path,
            connect_timeout_secs,
            // Nothing to close until the master is up.
            disposed: true,
        };

        let mut session = session;
        session.start_master(&config.password)?;
        session.disposed = false;

        Ok(session)
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Options shared by the master and every multiplexed command.
    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-S".to_string(),
            self.control_path.to_string_lossy().to_string(),
            "-p".to_string(),
            self.port.to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ];
        args.push(self.destination());
        args
    }

    /// Options for commands riding on the already-open master.
    fn mux_command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "ControlMaster=no", "-o", "BatchMode=yes"]);
        cmd.args(self.base_args());
        cmd
    }

    fn start_master(&self, password: &str) -> Result<()> {
        // The backgrounded master keeps any inherited pipe open, so its
        // diagnostics go to a file instead of a captured stderr.
        let error_log = self.control_path.with_extension("log");

        let mut cmd = Command::new("sshpass");
        cmd.arg("-e")
            .arg("ssh")
            .args(["-M", "-f", "-N"])
            .args([
                "-o",
                "ControlPersist=yes",
                "-o",
                "PubkeyAuthentication=no",
                "-o",
                "PreferredAuthentications=password,keyboard-interactive",
                "-o",
                "NumberOfPasswordPrompts=1",
            ])
            .arg("-E")
            .arg(&error_log)
            .args(self.base_args())
            .env("SSHPASS", password)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let status = cmd.status().map_err(|e| {
            let err = self.connect_error(format!("failed to run sshpass: {}", e));
            if e.kind() == std::io::ErrorKind::NotFound {
                err.with_hint("Install sshpass and the OpenSSH client; password authentication requires both")
            } else {
                err
            }
        })?;

        let diagnostics = std::fs::read_to_string(&error_log).unwrap_or_default();
        let _ = std::fs::remove_file(&error_log);

        if status.success() {
            return Ok(());
        }

        let diagnostics = diagnostics.trim().to_string();
        let reason = match status.code() {
            Some(5) => "authentication failed (invalid username or password)".to_string(),
            Some(6) => "host key is unknown and could not be accepted".to_string(),
            _ if diagnostics.is_empty() => format!("ssh exited with {}", status),
            _ => diagnostics,
        };

        Err(self.connect_error(reason))
    }

    fn connect_error(&self, reason: String) -> Error {
        Error::transfer_connect_failed(TransferConnectFailedDetails {
            host: self.host.clone(),
            port: self.port,
            username: self.user.clone(),
            error: reason,
        })
    }

    fn upload_error(&self, local: &Path, remote: &str, reason: String) -> Error {
        Error::transfer_upload_failed(TransferUploadFailedDetails {
            local_path: local.display().to_string(),
            remote_path: remote.to_string(),
            error: reason,
        })
    }
}

impl RemoteSession for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn put_file(&self, local: &Path, remote: &str) -> Result<()> {
        let source = File::open(local)
            .map_err(|e| self.upload_error(local, remote, format!("cannot open local file: {}", e)))?;

        let parent = remote_parent(remote);
        let remote_command = format!(
            "mkdir -p {} && cat > {}",
            shell::quote_remote_path(parent),
            shell::quote_remote_path(remote)
        );

        let output = self
            .mux_command()
            .arg(remote_command)
            .stdin(source)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| self.upload_error(local, remote, format!("failed to run ssh: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("ssh exited with {}", output.status)
            } else {
                stderr
            };
            return Err(self.upload_error(local, remote, reason));
        }

        Ok(())
    }

    fn exec(
        &self,
        command: &str,
        on_stdout: LineHandler<'_>,
        on_stderr: LineHandler<'_>,
    ) -> Result<i32> {
        // The command is fed to a remote `sh -s` on stdin so it never shows up
        // in a process listing on either side.
        let mut child = self
            .mux_command()
            .arg("sh -s")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::internal_io(e.to_string(), Some("spawn ssh".to_string())))?;

        let mut script = command.to_string();
        script.push('\n');
        feed_stdin(&mut child, script.as_bytes())?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        std::thread::scope(|scope| {
            scope.spawn(move || {
                if let Some(pipe) = stderr {
                    for_each_line(pipe, |line| on_stderr(line));
                }
            });
            if let Some(pipe) = stdout {
                for_each_line(pipe, |line| on_stdout(line));
            }
        });

        let status = child
            .wait()
            .map_err(|e| Error::internal_io(e.to_string(), Some("wait for ssh".to_string())))?;

        Ok(status.code().unwrap_or(-1))
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        let socket = self.control_path.to_string_lossy().to_string();
        let _ = Command::new("ssh")
            .args(["-S", socket.as_str(), "-O", "exit"])
            .arg(self.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let _ = std::fs::remove_file(&self.control_path);
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Write `input` to the child's stdin and close it. On failure the child is
/// killed and reaped before the error is returned.
fn feed_stdin(child: &mut Child, input: &[u8]) -> Result<()> {
    let Some(mut stdin) = child.stdin.take() else {
        return Ok(());
    };

    if let Err(e) = stdin.write_all(input) {
        drop(stdin);
        let _ = child.kill();
        let _ = child.wait();
        return Err(Error::internal_io(
            e.to_string(),
            Some("write remote command".to_string()),
        ));
    }

    Ok(())
}

/// Parent directory of a remote POSIX path; `/` for top-level paths.
fn remote_parent(remote: &str) -> &str {
    match remote.trim_end_matches('/').rfind('/') {
        Some(0) => "/",
        Some(idx) => &remote[..idx],
        None => ".",
    }
}
