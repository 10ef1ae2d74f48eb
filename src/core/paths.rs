//! Path resolution against the workspace root and fixed on-disk locations.
//!
//! Resolution is lexical: nothing here touches the filesystem, so resolving a
//! path that does not exist yet is fine.

use std::path::{Component, Path, PathBuf};

/// Directory holding all pipeline state for a workspace.
pub const DEPLOY_DIR: &str = ".deploy";

/// Resolve `relative` against `root` and normalize the result.
///
/// Absolute inputs replace `root` entirely, so resolving an already-resolved
/// path returns it unchanged. An empty `relative` yields `root` itself.
pub fn resolve(root: &Path, relative: impl AsRef<Path>) -> PathBuf {
    normalize(&root.join(relative.as_ref()))
}

/// Resolve `relative` against a module's working directory, which is itself
/// resolved against `root` first.
pub fn resolve_in_module(
    root: &Path,
    working_directory: impl AsRef<Path>,
    relative: impl AsRef<Path>,
) -> PathBuf {
    resolve(&resolve(root, working_directory), relative)
}

/// Collapse `.` and `..` components without consulting the filesystem.
///
/// `..` never climbs above the filesystem root; on relative inputs leading
/// `..` components are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }

    out
}

/// `path` made absolute against the current directory, then normalized.
///
/// A relative path is returned relative only when the current directory
/// cannot be read.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize(&cwd.join(path)),
        Err(_) => normalize(path),
    }
}

/// Join a file name onto a remote POSIX directory.
pub fn remote_join(remote_dir: &str, name: &str) -> String {
    let trimmed = remote_dir.trim_end_matches('/');
    if trimmed.is_empty() && remote_dir.starts_with('/') {
        format!("/{}", name)
    } else if trimmed.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", trimmed, name)
    }
}

/// Base name of a path as a string, empty when there is none.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// `<root>/.deploy`
pub fn deploy_dir(root: &Path) -> PathBuf {
    root.join(DEPLOY_DIR)
}

/// Module registry file
pub fn config_file(root: &Path) -> PathBuf {
    deploy_dir(root).join("config.json")
}

/// Optional overrides for built-in defaults
pub fn settings_file(root: &Path) -> PathBuf {
    deploy_dir(root).join("settings.json")
}

/// Persistent pipeline log
pub fn log_file(root: &Path) -> PathBuf {
    deploy_dir(root).join("logs").join("deploy.log")
}
