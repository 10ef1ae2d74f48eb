//! Module detection over the immediate subdirectories of a workspace, plus
//! default configuration for detected modules.

use std::fs;
use std::path::Path;

use crate::module::{
    BuildConfig, CompressConfig, DeployConfig, DetectedModule, HooksConfig, ModuleConfig,
    ModuleType, UploadConfig,
};

/// Directory names never considered modules, besides hidden ones.
const SKIPPED_DIRS: &[&str] = &["node_modules", "out", "target", "dist"];

/// Marker files checked in order; the first present one decides the type.
const MARKERS: &[(&str, ModuleType)] = &[
    ("package.json", ModuleType::Npm),
    ("pom.xml", ModuleType::Maven),
    ("requirements.txt", ModuleType::Python),
    ("setup.py", ModuleType::Python),
];

/// Scan `root` for module directories. Unreadable roots yield nothing.
///
/// Results are sorted by path so repeated scans are stable.
pub fn detect_modules(root: &Path) -> Vec<DetectedModule> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };

    let mut modules: Vec<DetectedModule> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_skipped(&name) {
                return None;
            }
            let module_type = detect_module_type(&entry.path())?;
            Some(DetectedModule {
                name: name.clone(),
                path: name,
                module_type,
            })
        })
        .collect();

    modules.sort_by(|a, b| a.path.cmp(&b.path));
    modules
}

/// Type of the module rooted at `dir`, if any marker file is present.
pub fn detect_module_type(dir: &Path) -> Option<ModuleType> {
    MARKERS
        .iter()
        .find(|(marker, _)| dir.join(marker).is_file())
        .map(|(_, module_type)| *module_type)
}

fn is_skipped(name: &str) -> bool {
    name.starts_with('.') || SKIPPED_DIRS.contains(&name)
}

/// Build command and output directory conventional for each module type.
fn build_defaults(module_type: ModuleType) -> (&'static str, &'static str) {
    match module_type {
        ModuleType::Npm => ("npm run build", "./dist"),
        ModuleType::Maven => ("mvn clean package", "./target"),
        ModuleType::Python => ("python setup.py build", "./dist"),
    }
}

/// Starting configuration for a detected module. Upload host and credentials
/// are left blank for the operator to fill in.
pub fn default_module_config(detected: &DetectedModule, id: &str) -> ModuleConfig {
    let (command, directory) = build_defaults(detected.module_type);

    ModuleConfig {
        id: id.to_string(),
        name: detected.name.clone(),
        module_type: detected.module_type,
        path: detected.path.clone(),
        build: BuildConfig {
            command: command.to_string(),
            directory: directory.to_string(),
            working_directory: detected.path.clone(),
        },
        compress: CompressConfig {
            enabled: true,
            target: directory.to_string(),
            output_name: format!("{}.zip", detected.name),
        },
        upload: UploadConfig {
            remote_path: format!("/var/www/{}", detected.name),
            ..UploadConfig::default()
        },
        deploy: DeployConfig {
            script_name: format!("{}.sh", detected.name),
            script_path: format!(".deploy/scripts/{}.sh", detected.name),
        },
        hooks: HooksConfig::default(),
    }
}

/// Id for a newly detected module: its name when free, otherwise the name
/// with a random suffix.
pub fn unique_module_id(name: &str, taken: &[String]) -> String {
    if !taken.iter().any(|id| id == name) {
        return name.to_string();
    }
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", name, &suffix[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn detects_each_marker_type() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "web/package.json");
        touch(dir.path(), "api/pom.xml");
        touch(dir.path(), "ml/requirements.txt");
        touch(dir.path(), "tool/setup.py");
        touch(dir.path(), "docs/README.md");

        let found = detect_modules(dir.path());

        let summary: Vec<(&str, ModuleType)> = found
            .iter()
            .map(|m| (m.path.as_str(), m.module_type))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("api", ModuleType::Maven),
                ("ml", ModuleType::Python),
                ("tool", ModuleType::Python),
                ("web", ModuleType::Npm),
            ]
        );
    }

    #[test]
    fn first_marker_wins() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "mixed/pom.xml");
        touch(dir.path(), "mixed/package.json");

        assert_eq!(
            detect_module_type(&dir.path().join("mixed")),
            Some(ModuleType::Npm)
        );
    }

    #[test]
    fn skips_hidden_and_artifact_directories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), ".cache/package.json");
        touch(dir.path(), "node_modules/package.json");
        touch(dir.path(), "out/package.json");
        touch(dir.path(), "package.json");

        assert!(detect_modules(dir.path()).is_empty());
    }

    #[test]
    fn missing_root_yields_nothing() {
        assert!(detect_modules(Path::new("/nonexistent/workspace")).is_empty());
    }

    #[test]
    fn default_config_follows_module_type() {
        let detected = DetectedModule {
            name: "api".to_string(),
            path: "api".to_string(),
            module_type: ModuleType::Maven,
        };

        let config = default_module_config(&detected, "api");

        assert_eq!(config.build.command, "mvn clean package");
        assert_eq!(config.build.directory, "./target");
        assert_eq!(config.build.working_directory, "api");
        assert_eq!(config.compress.target, "./target");
        assert_eq!(config.compress.output_name, "api.zip");
        assert_eq!(config.upload.port, 22);
        assert_eq!(config.upload.remote_path, "/var/www/api");
        assert_eq!(config.deploy.script_path, ".deploy/scripts/api.sh");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unique_id_avoids_taken_names() {
        assert_eq!(unique_module_id("web", &[]), "web");
        let id = unique_module_id("web", &["web".to_string()]);
        assert!(id.starts_with("web-"));
        assert_eq!(id.len(), "web-".len() + 8);
    }
}
