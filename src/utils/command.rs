//! Local process execution with bounded output capture.

use serde::Serialize;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

/// Output of a finished local command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Set when either stream exceeded the capture limit and was cut.
    pub truncated: bool,
}

/// Captured output from command execution.
/// Reusable primitive for any command that executes external processes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapturedOutput {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
}

impl CapturedOutput {
    pub fn new(stdout: String, stderr: String) -> Self {
        Self { stdout, stderr }
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

/// Build a platform shell invocation for a full command line.
///
/// Commands may use pipes, `&&` chains and environment expansion, so they go
/// through `sh -c` (or `cmd /C` on Windows) rather than direct exec.
pub fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    }

    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

/// Run a shell command, capturing at most `limit` bytes of each stream.
///
/// Output past the limit is drained and discarded so the child never blocks on
/// a full pipe. Returns `Err` only when the process could not be spawned or
/// waited on; a non-zero exit is reported through `CommandOutput::success`.
pub fn run_captured(
    command: &str,
    current_dir: Option<&Path>,
    env: &[(&str, &str)],
    limit: usize,
) -> std::io::Result<CommandOutput> {
    let mut cmd = shell_command(command);

    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    cmd.envs(env.iter().copied())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_reader = thread::spawn(move || match stdout {
        Some(pipe) => read_capped(pipe, limit),
        None => (Vec::new(), false),
    });
    let stderr_reader = thread::spawn(move || match stderr {
        Some(pipe) => read_capped(pipe, limit),
        None => (Vec::new(), false),
    });

    let status = child.wait()?;

    let (out, out_cut) = stdout_reader.join().unwrap_or_default();
    let (err, err_cut) = stderr_reader.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&out).to_string(),
        stderr: String::from_utf8_lossy(&err).to_string(),
        success: status.success(),
        exit_code: status.code(),
        truncated: out_cut || err_cut,
    })
}

/// Read a stream to EOF, keeping the first `limit` bytes.
fn read_capped<R: Read>(mut reader: R, limit: usize) -> (Vec<u8>, bool) {
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                if room < n {
                    truncated = true;
                }
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    (kept, truncated)
}

/// Invoke `on_line` for every line of `reader` as it arrives.
///
/// Lines are decoded lossily and passed without their trailing newline.
pub fn for_each_line<R: Read>(reader: R, mut on_line: impl FnMut(&str)) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                on_line(text.trim_end_matches(['\n', '\r']));
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

/// Extract error text from command output.
///
/// Prefers stderr, falls back to stdout if stderr is empty.
pub fn error_text(stdout: &str, stderr: &str) -> String {
    if !stderr.trim().is_empty() {
        stderr.trim().to_string()
    } else {
        stdout.trim().to_string()
    }
}

/// Last `count` lines of `text`, joined with newlines.
pub fn tail_lines(text: &str, count: usize) -> String {
    let tail: Vec<&str> = text.lines().rev().take(count).collect();
    tail.into_iter().rev().collect::<Vec<_>>().join("\n")
}
