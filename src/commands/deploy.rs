use clap::Args;

use alphonse::pipeline::{Pipeline, PipelineReport};
use alphonse::ssh::SshConnector;

use super::{module_context, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct DeployArgs {
    /// Module ID
    pub module_id: String,
}

/// Run only the remote deploy script.
pub fn run(args: DeployArgs, global: &GlobalArgs) -> CmdResult<PipelineReport> {
    let ctx = module_context(global, &args.module_id)?;
    let connector = SshConnector {
        connect_timeout_secs: ctx.workspace.defaults().connect_timeout_secs,
    };

    alphonse::log_status!(
        "deploy",
        "Running {} on {}",
        ctx.module.deploy.script_path,
        ctx.module.upload.host
    );
    let report = Pipeline::new(&ctx.workspace, &connector)
        .with_hooks(ctx.hooks)
        .deploy_only(&ctx.module)?;

    Ok((report, 0))
}
