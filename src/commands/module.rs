use clap::{Args, Subcommand};
use serde::Serialize;

use alphonse::config::{self, ConfigStore};
use alphonse::module::HooksConfig;
use alphonse::ModuleConfig;

use super::{merge_json_sources, CmdResult, DynamicSetArgs, GlobalArgs};

#[derive(Args)]
pub struct ModuleArgs {
    #[command(subcommand)]
    command: ModuleCommand,
}

#[derive(Subcommand)]
enum ModuleCommand {
    /// List configured modules
    List,
    /// Display a module configuration
    Show {
        /// Module ID
        id: String,
    },
    /// Add a module from a full JSON configuration
    Add {
        /// JSON spec (positional, supports @file and - for stdin)
        spec: Option<String>,

        /// Explicit JSON spec (takes precedence over positional)
        #[arg(long, value_name = "JSON")]
        json: Option<String>,
    },
    /// Update module fields; unspecified fields keep their values
    #[command(visible_aliases = ["edit", "merge"])]
    Set {
        #[command(flatten)]
        args: DynamicSetArgs,
    },
    /// Delete a module configuration
    Delete {
        /// Module ID
        id: String,
    },
    /// Show or update hooks applied to every module
    GlobalHooks {
        /// JSON patch for the global hooks (omit to show them)
        spec: Option<String>,
    },
}

/// Modules in this output always have their password masked.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOutput {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<ModuleConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub updated_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_hooks: Option<HooksConfig>,
}

impl ModuleOutput {
    fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            id: None,
            module: None,
            modules: Vec::new(),
            updated_fields: Vec::new(),
            global_hooks: None,
        }
    }
}

pub fn run(args: ModuleArgs, global: &GlobalArgs) -> CmdResult<ModuleOutput> {
    let store = ConfigStore::new(&global.root);

    match args.command {
        ModuleCommand::List => {
            let mut output = ModuleOutput::new("module.list");
            output.modules = store.list()?.iter().map(ModuleConfig::redacted).collect();
            Ok((output, 0))
        }
        ModuleCommand::Show { id } => {
            let mut output = ModuleOutput::new("module.show");
            output.module = Some(store.get(&id)?.redacted());
            output.id = Some(id);
            Ok((output, 0))
        }
        ModuleCommand::Add { spec, json } => {
            let spec = json.or(spec).ok_or_else(|| {
                alphonse::Error::validation_missing_argument(vec!["spec".to_string()])
            })?;
            let raw = config::read_json_spec_to_string(&spec)?;
            let module: ModuleConfig = config::from_str(&raw)?;

            let added = store.add(module)?;
            let mut output = ModuleOutput::new("module.add");
            output.id = Some(added.id.clone());
            output.module = Some(added.redacted());
            Ok((output, 0))
        }
        ModuleCommand::Set { args } => {
            let patch = merge_json_sources(args.json_spec(), &args.extra)?;
            let merged = store.update(&args.id, patch)?;

            let mut output = ModuleOutput::new("module.set");
            output.module = Some(store.get(&merged.id)?.redacted());
            output.id = Some(merged.id);
            output.updated_fields = merged.updated_fields;
            Ok((output, 0))
        }
        ModuleCommand::Delete { id } => {
            let removed = store.delete(&id)?;
            let mut output = ModuleOutput::new("module.delete");
            output.id = Some(removed.id.clone());
            output.module = Some(removed.redacted());
            Ok((output, 0))
        }
        ModuleCommand::GlobalHooks { spec } => {
            let mut output = ModuleOutput::new("module.global_hooks");
            output.global_hooks = Some(match spec {
                Some(spec) => {
                    let patch = merge_json_sources(Some(&spec), &[])?;
                    store.set_global_hooks(patch)?
                }
                None => store.global_hooks()?,
            });
            Ok((output, 0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stored_module(root: &std::path::Path) {
        let module: ModuleConfig = serde_json::from_value(serde_json::json!({
            "id": "web", "name": "web", "type": "npm", "path": "web",
            "build": {}, "compress": {},
            "upload": {"host": "h", "username": "u", "password": "hunter2", "remotePath": "/srv/web"},
            "deploy": {}
        }))
        .unwrap();
        ConfigStore::new(root).add(module).unwrap();
    }

    fn printed(command: ModuleCommand, root: &std::path::Path) -> String {
        let global = GlobalArgs {
            root: root.to_path_buf(),
        };
        let (output, code) = run(ModuleArgs { command }, &global).unwrap();
        assert_eq!(code, 0);
        serde_json::to_string(&output).unwrap()
    }

    #[test]
    fn printed_modules_never_show_the_password() {
        let dir = TempDir::new().unwrap();
        stored_module(dir.path());

        let commands = vec![
            ModuleCommand::List,
            ModuleCommand::Show {
                id: "web".to_string(),
            },
            ModuleCommand::Set {
                args: DynamicSetArgs {
                    id: "web".to_string(),
                    extra: vec!["--name".to_string(), "web-app".to_string()],
                    ..DynamicSetArgs::default()
                },
            },
        ];
        for command in commands {
            let json = printed(command, dir.path());
            assert!(!json.contains("hunter2"), "{}", json);
            assert!(json.contains("<redacted>"), "{}", json);
        }

        let stored = ConfigStore::new(dir.path()).get("web").unwrap();
        assert_eq!(stored.upload.password, "hunter2");
        assert_eq!(stored.name, "web-app");

        let json = printed(
            ModuleCommand::Delete {
                id: "web".to_string(),
            },
            dir.path(),
        );
        assert!(!json.contains("hunter2"));
    }
}
