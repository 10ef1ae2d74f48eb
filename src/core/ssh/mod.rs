//! Authenticated remote sessions used by the upload and deploy stages.
//!
//! Stages talk to [`RemoteSession`] only; [`SshConnector`] is the production
//! implementation and tests substitute their own [`Connector`].

mod client;

pub use client::{SshConnector, SshSession};

use std::path::Path;

use crate::error::{Error, RemoteCommandFailedDetails, Result};
use crate::module::UploadConfig;

/// Callback receiving one line of remote output, without its newline.
pub type LineHandler<'a> = &'a mut (dyn FnMut(&str) + Send);

/// An open, authenticated connection to a remote host.
///
/// `put_file` may be called from several threads at once. `dispose` must be
/// safe to call more than once.
pub trait RemoteSession: Send + Sync {
    /// Host name, for messages.
    fn host(&self) -> &str;

    /// Copy a local file to an absolute remote path, creating missing parent
    /// directories.
    fn put_file(&self, local: &Path, remote: &str) -> Result<()>;

    /// Run a shell command remotely, streaming its output line by line.
    ///
    /// Returns the remote exit code. `Err` means the command could not be
    /// run at all.
    fn exec(
        &self,
        command: &str,
        on_stdout: LineHandler<'_>,
        on_stderr: LineHandler<'_>,
    ) -> Result<i32>;

    /// Close the session.
    fn dispose(&mut self);
}

/// Opens sessions for an upload target.
pub trait Connector: Send + Sync {
    fn connect(&self, config: &UploadConfig) -> Result<Box<dyn RemoteSession>>;
}

/// Run `command` and fail with `remote.command_failed` on a non-zero exit.
///
/// Stdout is discarded; stderr is kept for the error.
pub fn exec_checked(session: &dyn RemoteSession, command: &str) -> Result<()> {
    let mut stderr = String::new();
    let code = session.exec(command, &mut |_: &str| {}, &mut |line: &str| {
        stderr.push_str(line);
        stderr.push('\n');
    })?;

    if code != 0 {
        return Err(Error::remote_command_failed(RemoteCommandFailedDetails {
            command: command.to_string(),
            exit_code: code,
            stderr: stderr.trim_end().to_string(),
            host: session.host().to_string(),
        }));
    }

    Ok(())
}
