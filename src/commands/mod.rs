use clap::Args;
use serde_json::{json, Map, Value};
use std::path::PathBuf;

use alphonse::config::{self, ConfigStore};
use alphonse::hooks::{self, Hooks};
use alphonse::{ModuleConfig, Workspace};

pub type CmdResult<T> = alphonse::Result<(T, i32)>;

pub(crate) struct GlobalArgs {
    /// Workspace root every relative path resolves against.
    pub root: PathBuf,
}

/// Shared arguments for `set` style commands.
///
/// Arbitrary `--key value` pairs map directly to top-level JSON keys. When
/// combining `--json` with trailing flags, put `--` before the flags:
///
/// ```sh
/// alphonse module set web --json '{"upload":{"host":"h"}}' -- --name web-app
/// ```
#[derive(Args, Default, Debug)]
pub struct DynamicSetArgs {
    /// Module ID
    pub id: String,

    /// JSON patch (positional, supports @file and - for stdin)
    pub spec: Option<String>,

    /// Explicit JSON patch (takes precedence over positional)
    #[arg(long, value_name = "JSON")]
    pub json: Option<String>,

    /// Dynamic key=value flags (e.g., --name web-app)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub extra: Vec<String>,
}

impl DynamicSetArgs {
    pub fn json_spec(&self) -> Option<&str> {
        self.json.as_deref().or(self.spec.as_deref())
    }
}

// ============================================================================
// JSON Input Parsing (CLI layer)
// ============================================================================

/// Parse --key value pairs into a JSON object.
fn parse_kv_flags(extra: &[String]) -> alphonse::Result<Value> {
    let mut obj = Map::new();
    let mut iter = extra.iter();

    while let Some(arg) = iter.next() {
        if let Some(key) = arg.strip_prefix("--") {
            let value = iter.next().ok_or_else(|| {
                alphonse::Error::validation_invalid_argument(
                    key,
                    format!("Missing value for flag --{}", key),
                    None,
                    None,
                )
            })?;
            obj.insert(key.to_string(), parse_value(value));
        }
    }

    Ok(Value::Object(obj))
}

/// Parse a string value into a JSON value.
/// Order: JSON literal, bool, number, string.
fn parse_value(s: &str) -> Value {
    if let Ok(v) = serde_json::from_str(s) {
        return v;
    }
    if s == "true" {
        return json!(true);
    }
    if s == "false" {
        return json!(false);
    }
    if let Ok(n) = s.parse::<i64>() {
        return json!(n);
    }
    json!(s)
}

/// Merge a JSON spec with --key value flags. Flags override spec values.
pub fn merge_json_sources(spec: Option<&str>, extra: &[String]) -> alphonse::Result<Value> {
    let mut base = match spec {
        Some(spec) => {
            let raw = config::read_json_spec_to_string(spec)?;
            serde_json::from_str(&raw).map_err(|e| {
                alphonse::Error::validation_invalid_json(e, Some("parse JSON spec".to_string()))
            })?
        }
        None => Value::Object(Map::new()),
    };

    if !extra.is_empty() {
        let flags = parse_kv_flags(extra)?;
        if let (Value::Object(base_obj), Value::Object(flags_obj)) = (&mut base, flags) {
            for (k, v) in flags_obj {
                base_obj.insert(k, v);
            }
        }
    }

    Ok(base)
}

// ============================================================================
// Module context
// ============================================================================

/// Everything a stage command needs for one module.
pub(crate) struct ModuleContext {
    pub workspace: Workspace,
    pub module: ModuleConfig,
    pub hooks: Hooks,
}

/// Open the workspace, load `module_id` and wire its shell hooks.
pub(crate) fn module_context(global: &GlobalArgs, module_id: &str) -> alphonse::Result<ModuleContext> {
    let workspace = Workspace::open(&global.root)?;
    let store = ConfigStore::new(&global.root);
    let module = store.get(module_id)?;
    let global_hooks = store.global_hooks()?;
    let hooks = hooks::shell_hooks(&workspace, &module, &global_hooks);

    Ok(ModuleContext {
        workspace,
        module,
        hooks,
    })
}

pub mod build;
pub mod connection;
pub mod deploy;
pub mod detect;
pub mod module;
pub mod ship;
pub mod upload;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (alphonse::Result<serde_json::Value>, i32) {
    crate::tty::status("alphonse is working...");

    match command {
        crate::Commands::Detect(args) => dispatch!(args, global, detect),
        crate::Commands::Module(args) => dispatch!(args, global, module),
        crate::Commands::Build(args) => dispatch!(args, global, build),
        crate::Commands::Upload(args) => dispatch!(args, global, upload),
        crate::Commands::Deploy(args) => dispatch!(args, global, deploy),
        crate::Commands::Ship(args) => dispatch!(args, global, ship),
        crate::Commands::TestConnection(args) => dispatch!(args, global, connection),
    }
}
