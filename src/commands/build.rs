use clap::Args;

use alphonse::pipeline::{Pipeline, PipelineReport};
use alphonse::ssh::SshConnector;

use super::{module_context, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct BuildArgs {
    /// Module ID
    pub module_id: String,
}

pub fn run(args: BuildArgs, global: &GlobalArgs) -> CmdResult<PipelineReport> {
    let ctx = module_context(global, &args.module_id)?;
    let connector = SshConnector {
        connect_timeout_secs: ctx.workspace.defaults().connect_timeout_secs,
    };

    alphonse::log_status!("build", "Building {}", ctx.module.name);
    let report = Pipeline::new(&ctx.workspace, &connector)
        .with_hooks(ctx.hooks)
        .build_only(&ctx.module)?;

    Ok((report, 0))
}
