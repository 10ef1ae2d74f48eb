use clap::Args;
use serde::Serialize;

use alphonse::config::ConfigStore;
use alphonse::detect;
use alphonse::module::DetectedModule;

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct DetectArgs {
    /// Register detected modules that are not configured yet
    #[arg(long)]
    pub add: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectOutput {
    pub modules: Vec<DetectedModule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub already_configured: Vec<String>,
}

pub fn run(args: DetectArgs, global: &GlobalArgs) -> CmdResult<DetectOutput> {
    let modules = detect::detect_modules(&global.root);
    alphonse::log_status!("detect", "Found {} modules", modules.len());

    let mut output = DetectOutput {
        modules,
        added: Vec::new(),
        already_configured: Vec::new(),
    };

    if !args.add {
        return Ok((output, 0));
    }

    let defaults = alphonse::defaults::load_defaults(&global.root);
    let store = ConfigStore::new(&global.root);
    let mut registry = store.load()?;

    for detected in &output.modules {
        if let Some(existing) = registry.modules.iter().find(|m| m.path == detected.path) {
            output.already_configured.push(existing.id.clone());
            continue;
        }

        let taken: Vec<String> = registry.modules.iter().map(|m| m.id.clone()).collect();
        let id = detect::unique_module_id(&detected.name, &taken);
        let mut config = detect::default_module_config(detected, &id);
        config.upload.port = defaults.ssh_port;
        registry.modules.push(config);
        output.added.push(id);
    }

    if !output.added.is_empty() {
        store.save(&registry)?;
    }

    Ok((output, 0))
}
