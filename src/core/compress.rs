//! Zip archiving of build output.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};
use crate::module::CompressConfig;
use crate::paths;
use crate::utils::io::format_bytes;
use crate::workspace::Workspace;

const COMPRESSION_LEVEL: i32 = 9;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveOutput {
    pub path: PathBuf,
    /// Files and empty directories stored in the archive.
    pub entries: usize,
    pub size: u64,
    pub sha256: String,
}

/// Absolute path of the compress target.
///
/// With a module working directory the target is relative to it, otherwise
/// to the workspace root.
pub fn resolve_target(
    workspace: &Workspace,
    config: &CompressConfig,
    module_working_dir: Option<&str>,
) -> PathBuf {
    match module_working_dir {
        Some(wd) => workspace.resolve_in_module(wd, &config.target),
        None => workspace.resolve(&config.target),
    }
}

/// Whether `target`, relative to `root`, exists as a file or directory.
pub fn validate_target(root: &Path, target: &str) -> bool {
    paths::resolve(root, target).exists()
}

/// Archive the configured target into `output_dir`.
///
/// A directory target has its contents stored at the archive root; a file
/// target is stored under its base name. The archive name defaults to
/// `<module_name>.zip`. A missing target fails before anything is written.
/// On a write error a partial archive may be left behind.
pub fn compress(
    workspace: &Workspace,
    config: &CompressConfig,
    module_name: &str,
    output_dir: &Path,
    module_working_dir: Option<&str>,
) -> Result<ArchiveOutput> {
    let log = workspace.log();

    crate::io::ensure_dir(output_dir, "create archive output directory")?;

    let target = resolve_target(workspace, config, module_working_dir);

    let output_name = config.archive_name(module_name);
    let output_path = output_dir.join(&output_name);

    let metadata = match fs::metadata(&target) {
        Ok(m) => m,
        Err(_) => {
            log.error(&format!("Compress target path: {}", target.display()));
            log.error(&format!(
                "Module working directory: {}",
                module_working_dir.unwrap_or("(not set)")
            ));
            return Err(Error::compress_target_not_found(
                &config.target,
                target.display().to_string(),
                module_working_dir.map(str::to_string),
            ));
        }
    };

    log.info(&format!(
        "Compressing {} -> {}",
        config.target,
        output_path.display()
    ));

    let entries = write_archive(&target, metadata.is_dir(), &output_path)
        .map_err(|e| {
            log.error(&format!("Compression failed: {}", e));
            Error::compress_write_failed(output_path.display().to_string(), e.to_string())
        })?;

    let size = fs::metadata(&output_path)
        .map(|m| m.len())
        .map_err(|e| Error::compress_write_failed(output_path.display().to_string(), e.to_string()))?;
    let sha256 = file_sha256(&output_path)
        .map_err(|e| Error::compress_write_failed(output_path.display().to_string(), e.to_string()))?;

    log.info(&format!(
        "Compressed {} ({} entries, {})",
        output_path.display(),
        entries,
        format_bytes(size)
    ));

    Ok(ArchiveOutput {
        path: output_path,
        entries,
        size,
        sha256,
    })
}

fn write_archive(target: &Path, is_dir: bool, output_path: &Path) -> io::Result<usize> {
    let file = File::create(output_path)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let entries = if is_dir {
        let mut count = 0;
        add_directory(&mut zip, target, "", output_path, &mut count)?;
        count
    } else {
        let name = paths::base_name(target);
        add_file(&mut zip, target, &name)?;
        1
    };

    let mut writer = zip.finish().map_err(zip_to_io)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;

    Ok(entries)
}

/// Store the contents of `dir` under `prefix`, recursing into subdirectories.
/// Entries are added in name order. The archive being written is skipped if it
/// lives inside the target.
fn add_directory<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    prefix: &str,
    output_path: &Path,
    count: &mut usize,
) -> io::Result<()> {
    let mut children: Vec<PathBuf> = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<_>>()?;
    children.sort();

    for path in children {
        if path == output_path {
            continue;
        }

        let name = format!("{}{}", prefix, paths::base_name(&path));
        let metadata = fs::metadata(&path)?;

        if metadata.is_dir() {
            let nested_prefix = format!("{}/", name);
            if fs::read_dir(&path)?.next().is_none() {
                zip.add_directory(nested_prefix.as_str(), entry_options(&metadata))
                    .map_err(zip_to_io)?;
                *count += 1;
            } else {
                add_directory(zip, &path, &nested_prefix, output_path, count)?;
            }
        } else {
            add_file(zip, &path, &name)?;
            *count += 1;
        }
    }

    Ok(())
}

fn add_file<W: Write + io::Seek>(zip: &mut ZipWriter<W>, path: &Path, name: &str) -> io::Result<()> {
    let metadata = fs::metadata(path)?;
    zip.start_file(name, entry_options(&metadata))
        .map_err(zip_to_io)?;
    let mut source = File::open(path)?;
    io::copy(&mut source, zip)?;
    Ok(())
}

fn entry_options(metadata: &fs::Metadata) -> FileOptions {
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL))
        .large_file(metadata.len() >= u32::MAX as u64);

    #[cfg(unix)]
    let options = {
        use std::os::unix::fs::PermissionsExt;
        options.unix_permissions(metadata.permissions().mode() & 0o7777)
    };

    options
}

fn zip_to_io(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::Other, other.to_string()),
    }
}

/// Hex SHA-256 of a file's contents.
pub fn file_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLog;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn workspace(root: &Path) -> Workspace {
        Workspace::new(root, Arc::new(MemoryLog::new()))
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn directory_contents_are_stored_at_archive_root() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("out/sub")).unwrap();
        fs::write(dir.path().join("out/a.txt"), "a").unwrap();
        fs::write(dir.path().join("out/sub/b.txt"), "b").unwrap();

        let ws = workspace(dir.path());
        let config = CompressConfig {
            enabled: true,
            target: "./out".to_string(),
            output_name: String::new(),
        };

        let archive = compress(&ws, &config, "app", &ws.output_dir(), None).unwrap();

        assert_eq!(archive.path, ws.output_dir().join("app.zip"));
        assert_eq!(archive.entries, 2);
        assert_eq!(entry_names(&archive.path), vec!["a.txt", "sub/b.txt"]);
        assert_eq!(archive.sha256.len(), 64);
        assert_eq!(archive.size, fs::metadata(&archive.path).unwrap().len());
    }

    #[test]
    fn file_target_is_stored_by_base_name() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("svc/target")).unwrap();
        fs::write(dir.path().join("svc/target/app.jar"), "jar").unwrap();

        let ws = workspace(dir.path());
        let config = CompressConfig {
            enabled: true,
            target: "target/app.jar".to_string(),
            output_name: "svc.zip".to_string(),
        };

        let archive = compress(&ws, &config, "svc", &ws.output_dir(), Some("svc")).unwrap();

        assert_eq!(entry_names(&archive.path), vec!["app.jar"]);
    }

    #[test]
    fn archive_content_round_trips() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out/index.html"), "<h1>hi</h1>").unwrap();

        let ws = workspace(dir.path());
        let config = CompressConfig {
            enabled: true,
            target: "out".to_string(),
            output_name: "x.zip".to_string(),
        };
        let archive = compress(&ws, &config, "x", &ws.output_dir(), Some(".")).unwrap();

        let mut zip = zip::ZipArchive::new(File::open(&archive.path).unwrap()).unwrap();
        let mut entry = zip.by_name("index.html").unwrap();
        let mut content = String::new();
        io::Read::read_to_string(&mut entry, &mut content).unwrap();
        assert_eq!(content, "<h1>hi</h1>");
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
    }

    #[test]
    fn missing_target_fails_before_archive_is_created() {
        let dir = TempDir::new().unwrap();
        let ws = workspace(dir.path());
        let config = CompressConfig {
            enabled: true,
            target: "./missing".to_string(),
            output_name: "x.zip".to_string(),
        };

        let err = compress(&ws, &config, "x", &ws.output_dir(), Some("web")).unwrap_err();

        assert_eq!(err.code.as_str(), "compress.target_not_found");
        assert!(err.message.contains("./missing"));
        let resolved = dir.path().join("web").join("missing");
        assert!(err.message.contains(&resolved.display().to_string()));
        assert!(!ws.output_dir().join("x.zip").exists());
    }

    #[test]
    fn archive_inside_target_is_not_archived_into_itself() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "x").unwrap();
        let ws = workspace(dir.path());
        let config = CompressConfig {
            enabled: true,
            target: ".".to_string(),
            output_name: "self.zip".to_string(),
        };

        let archive = compress(&ws, &config, "self", dir.path(), None).unwrap();

        assert_eq!(entry_names(&archive.path), vec!["index.html"]);
    }

    #[test]
    fn empty_subdirectories_are_kept() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("out/empty")).unwrap();
        fs::write(dir.path().join("out/a.txt"), "a").unwrap();
        let ws = workspace(dir.path());
        let config = CompressConfig {
            enabled: true,
            target: "out".to_string(),
            output_name: String::new(),
        };

        let archive = compress(&ws, &config, "app", &ws.output_dir(), None).unwrap();

        assert_eq!(entry_names(&archive.path), vec!["a.txt", "empty/"]);
    }

    #[test]
    fn validate_target_checks_existence() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        assert!(validate_target(dir.path(), "./dist"));
        assert!(!validate_target(dir.path(), "./nope"));
    }
}
