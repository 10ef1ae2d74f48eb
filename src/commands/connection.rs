use clap::Args;
use serde::Serialize;

use alphonse::config::ConfigStore;
use alphonse::ssh::SshConnector;
use alphonse::transfer;

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct ConnectionArgs {
    /// Module ID
    pub module_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOutput {
    pub module_id: String,
    pub endpoint: String,
    pub connected: bool,
}

/// Open and close a session for the module's upload target.
///
/// An unreachable host is reported as `connected: false` with exit code 10
/// rather than an error.
pub fn run(args: ConnectionArgs, global: &GlobalArgs) -> CmdResult<ConnectionOutput> {
    let module = ConfigStore::new(&global.root).get(&args.module_id)?;
    let defaults = alphonse::defaults::load_defaults(&global.root);
    let connector = SshConnector {
        connect_timeout_secs: defaults.connect_timeout_secs,
    };

    alphonse::log_status!("connect", "Testing {}", module.upload.endpoint());
    let connected = transfer::test_connection(&connector, &module.upload);
    let exit_code = if connected { 0 } else { 10 };

    Ok((
        ConnectionOutput {
            module_id: module.id,
            endpoint: module.upload.endpoint(),
            connected,
        },
        exit_code,
    ))
}
