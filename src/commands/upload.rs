use clap::Args;

use alphonse::pipeline::{Pipeline, PipelineReport};
use alphonse::ssh::SshConnector;

use super::{module_context, CmdResult, GlobalArgs};

#[derive(Args)]
pub struct UploadArgs {
    /// Module ID
    pub module_id: String,
}

/// Compress and transfer without building or running the deploy script.
pub fn run(args: UploadArgs, global: &GlobalArgs) -> CmdResult<PipelineReport> {
    let ctx = module_context(global, &args.module_id)?;
    let connector = SshConnector {
        connect_timeout_secs: ctx.workspace.defaults().connect_timeout_secs,
    };

    alphonse::log_status!(
        "upload",
        "Uploading {} to {}",
        ctx.module.name,
        ctx.module.upload.endpoint()
    );
    let report = Pipeline::new(&ctx.workspace, &connector)
        .with_hooks(ctx.hooks)
        .upload_only(&ctx.module)?;

    Ok((report, 0))
}
