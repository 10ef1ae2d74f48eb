//! Module registry persisted at `<root>/.deploy/config.json`.
//!
//! Every mutation is load-full-file, change in memory, write-full-file. There
//! is no locking: two writers racing on the same file can lose an update.

use crate::error::{Error, Result};
use crate::io;
use crate::module::{HooksConfig, ModuleConfig};
use crate::paths;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

// ============================================================================
// JSON Parsing Utilities
// ============================================================================

/// Parse JSON string into typed value.
pub fn from_str<T: DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s)
        .map_err(|e| Error::validation_invalid_json(e, Some("parse json".to_string())))
}

/// Serialize value to pretty-printed JSON string.
pub fn to_string_pretty<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize json".to_string())))
}

/// Read JSON spec from string, file (@path), or stdin (-).
pub fn read_json_spec_to_string(spec: &str) -> Result<String> {
    use std::io::IsTerminal;

    if spec.trim() == "-" {
        let mut buf = String::new();
        let mut stdin = std::io::stdin();
        if stdin.is_terminal() {
            return Err(Error::validation_invalid_argument(
                "json",
                "Cannot read JSON from stdin when stdin is a TTY",
                None,
                None,
            ));
        }
        stdin
            .read_to_string(&mut buf)
            .map_err(|e| Error::internal_io(e.to_string(), Some("read stdin".to_string())))?;
        return Ok(buf);
    }

    if let Some(path) = spec.strip_prefix('@') {
        if path.trim().is_empty() {
            return Err(Error::validation_invalid_argument(
                "json",
                "Invalid JSON spec '@' (missing file path)",
                None,
                None,
            ));
        }

        return io::read_file(Path::new(path), &format!("read {}", path));
    }

    Ok(spec.to_string())
}

// ============================================================================
// Merge
// ============================================================================

/// Fields touched by a merge patch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub id: String,
    pub updated_fields: Vec<String>,
}

/// Merge a JSON patch into any serializable config type.
///
/// Objects merge recursively, `null` removes a key, anything else replaces.
pub fn merge_config<T: Serialize + DeserializeOwned>(
    existing: &mut T,
    patch: Value,
) -> Result<Vec<String>> {
    let patch_obj = match &patch {
        Value::Object(obj) => obj,
        _ => {
            return Err(Error::validation_invalid_argument(
                "merge",
                "Merge patch must be a JSON object",
                None,
                None,
            ))
        }
    };

    let updated_fields: Vec<String> = patch_obj.keys().cloned().collect();

    if updated_fields.is_empty() {
        return Err(Error::validation_invalid_argument(
            "merge",
            "Merge patch cannot be empty",
            None,
            None,
        ));
    }

    let mut base = serde_json::to_value(&*existing)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize config".to_string())))?;

    deep_merge(&mut base, patch);

    *existing = serde_json::from_value(base)
        .map_err(|e| Error::validation_invalid_json(e, Some("merge config".to_string())))?;

    Ok(updated_fields)
}

fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base_obj), Value::Object(patch_obj)) => {
            for (key, value) in patch_obj {
                if value.is_null() {
                    base_obj.remove(&key);
                } else {
                    deep_merge(base_obj.entry(key).or_insert(Value::Null), value);
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

// ============================================================================
// Registry
// ============================================================================

/// On-disk shape of the registry file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    #[serde(default)]
    pub global_hooks: HooksConfig,
}

impl Registry {
    pub fn find(&self, id: &str) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Every module valid and no id used twice.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for module in &self.modules {
            module.validate()?;
            if !seen.insert(module.id.as_str()) {
                return Err(Error::config_id_collision(&module.id));
            }
        }
        Ok(())
    }
}

/// Handle on a workspace's registry file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Registry for the workspace rooted at `root`.
    pub fn new(root: &Path) -> Self {
        Self {
            path: paths::config_file(root),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry, writing the empty default shape first if the file
    /// does not exist.
    pub fn load(&self) -> Result<Registry> {
        if !self.path.exists() {
            let registry = Registry::default();
            self.save(&registry)?;
            return Ok(registry);
        }

        let content = io::read_file(&self.path, &format!("read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::config_invalid_json(self.path.display().to_string(), e))
    }

    /// Validate and write the whole registry atomically.
    pub fn save(&self, registry: &Registry) -> Result<()> {
        registry.validate()?;
        let content = to_string_pretty(registry)?;
        io::write_file_atomic(&self.path, &content, "write module registry")
    }

    pub fn list(&self) -> Result<Vec<ModuleConfig>> {
        Ok(self.load()?.modules)
    }

    pub fn get(&self, id: &str) -> Result<ModuleConfig> {
        let registry = self.load()?;
        match registry.find(id) {
            Some(module) => Ok(module.clone()),
            None => Err(not_found(&registry, id)),
        }
    }

    pub fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.load()?.find(id).is_some())
    }

    pub fn add(&self, module: ModuleConfig) -> Result<ModuleConfig> {
        module.validate()?;
        let mut registry = self.load()?;

        if registry.find(&module.id).is_some() {
            return Err(Error::config_id_collision(&module.id));
        }

        registry.modules.push(module.clone());
        self.save(&registry)?;
        Ok(module)
    }

    /// Merge a partial JSON record into an existing module.
    ///
    /// Fields absent from `patch` keep their prior values. Changing `id` to one
    /// already in use is rejected.
    pub fn update(&self, id: &str, patch: Value) -> Result<MergeResult> {
        let mut registry = self.load()?;

        let index = registry
            .modules
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| not_found(&registry, id))?;

        let mut module = registry.modules[index].clone();
        let updated_fields = merge_config(&mut module, patch)?;

        if module.id != id && registry.find(&module.id).is_some() {
            return Err(Error::config_id_collision(&module.id));
        }

        let new_id = module.id.clone();
        registry.modules[index] = module;
        self.save(&registry)?;

        Ok(MergeResult {
            id: new_id,
            updated_fields,
        })
    }

    /// Remove a module, returning the removed record.
    pub fn delete(&self, id: &str) -> Result<ModuleConfig> {
        let mut registry = self.load()?;

        let index = registry
            .modules
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| not_found(&registry, id))?;

        let removed = registry.modules.remove(index);
        self.save(&registry)?;
        Ok(removed)
    }

    pub fn global_hooks(&self) -> Result<HooksConfig> {
        Ok(self.load()?.global_hooks)
    }

    pub fn set_global_hooks(&self, patch: Value) -> Result<HooksConfig> {
        let mut registry = self.load()?;
        merge_config(&mut registry.global_hooks, patch)?;
        self.save(&registry)?;
        Ok(registry.global_hooks)
    }
}

fn not_found(registry: &Registry, id: &str) -> Error {
    let similar = find_similar_ids(registry.modules.iter().map(|m| m.id.as_str()), id);
    let err = Error::module_not_found(id);
    if similar.is_empty() {
        err
    } else {
        err.with_hint(format!("Did you mean: {}?", similar.join(", ")))
    }
}

// ============================================================================
// Fuzzy Matching
// ============================================================================

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();

    if a_chars.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a_chars.len();
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row: Vec<usize> = vec![0; b_len + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = if a_char == b_char { 0 } else { 1 };
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Up to three ids close to `target`: prefix matches first, then suffix
/// matches, then edit distance of at most 3.
fn find_similar_ids<'a>(ids: impl Iterator<Item = &'a str>, target: &str) -> Vec<String> {
    let target_lower = target.to_lowercase();
    let mut matches: Vec<(String, usize)> = Vec::new();

    for id in ids {
        let id_lower = id.to_lowercase();

        if id_lower.starts_with(&target_lower) && id_lower != target_lower {
            matches.push((id.to_string(), 0));
            continue;
        }

        if id_lower.ends_with(&target_lower) {
            matches.push((id.to_string(), 1));
            continue;
        }

        let dist = levenshtein(&target_lower, &id_lower);
        if dist <= 3 && dist > 0 {
            matches.push((id.to_string(), dist + 10));
        }
    }

    matches.sort_by_key(|(_, priority)| *priority);
    matches.into_iter().take(3).map(|(id, _)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{BuildConfig, CompressConfig, DeployConfig, ModuleType, UploadConfig};
    use serde_json::json;
    use tempfile::TempDir;

    fn module(id: &str) -> ModuleConfig {
        ModuleConfig {
            id: id.to_string(),
            name: id.to_string(),
            module_type: ModuleType::Npm,
            path: id.to_string(),
            build: BuildConfig {
                command: "npm run build".to_string(),
                directory: "./dist".to_string(),
                working_directory: id.to_string(),
            },
            compress: CompressConfig::default(),
            upload: UploadConfig::default(),
            deploy: DeployConfig::default(),
            hooks: HooksConfig::default(),
        }
    }

    #[test]
    fn load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());

        let registry = store.load().unwrap();

        assert!(registry.modules.is_empty());
        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(written, json!({"modules": [], "globalHooks": {}}));
    }

    #[test]
    fn add_get_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());

        store.add(module("web")).unwrap();
        store.add(module("api")).unwrap();

        assert_eq!(store.get("api").unwrap().name, "api");
        assert_eq!(store.list().unwrap().len(), 2);

        let removed = store.delete("web").unwrap();
        assert_eq!(removed.id, "web");
        assert!(!store.exists("web").unwrap());
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());

        store.add(module("web")).unwrap();
        let err = store.add(module("web")).unwrap_err();
        assert_eq!(err.code.as_str(), "config.id_collision");
    }

    #[test]
    fn update_merges_partial_fields() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        store.add(module("web")).unwrap();

        let result = store
            .update("web", json!({"build": {"command": "npm run dist"}}))
            .unwrap();

        assert_eq!(result.updated_fields, vec!["build"]);
        let updated = store.get("web").unwrap();
        assert_eq!(updated.build.command, "npm run dist");
        assert_eq!(updated.build.directory, "./dist");
        assert_eq!(updated.build.working_directory, "web");
    }

    #[test]
    fn update_rejects_renaming_onto_existing_id() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        store.add(module("web")).unwrap();
        store.add(module("api")).unwrap();

        let err = store.update("web", json!({"id": "api"})).unwrap_err();
        assert_eq!(err.code.as_str(), "config.id_collision");
        assert!(store.exists("web").unwrap());
    }

    #[test]
    fn removing_a_stage_block_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        store.add(module("web")).unwrap();

        let err = store.update("web", json!({"upload": null})).unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_json");
        assert_eq!(store.get("web").unwrap().upload, UploadConfig::default());
    }

    #[test]
    fn missing_module_suggests_similar_ids() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        store.add(module("frontend")).unwrap();

        let err = store.get("frontnd").unwrap_err();
        assert_eq!(err.code.as_str(), "module.not_found");
        assert!(err.hints.iter().any(|h| h.message.contains("frontend")));
    }

    #[test]
    fn corrupt_file_reports_invalid_json() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{\"modules\": [{\"id\": \"x\"}]}").unwrap();

        let err = store.load().unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_json");
    }

    #[test]
    fn global_hooks_merge() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());

        store
            .set_global_hooks(json!({"beforeBuild": "echo start"}))
            .unwrap();
        let hooks = store
            .set_global_hooks(json!({"afterDeploy": "echo done"}))
            .unwrap();

        assert_eq!(hooks.before_build.as_deref(), Some("echo start"));
        assert_eq!(hooks.after_deploy.as_deref(), Some("echo done"));
    }

    #[test]
    fn levenshtein_distance() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
    }
}
