use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{build, connection, deploy, detect, module, ship, upload};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "alphonse")]
#[command(version = VERSION)]
#[command(about = "Build, package, upload and deploy workspace modules")]
struct Cli {
    /// Workspace root (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    root: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect modules under the workspace root
    Detect(detect::DetectArgs),
    /// Manage module configurations
    #[command(visible_alias = "modules")]
    Module(module::ModuleArgs),
    /// Run a module's build command
    Build(build::BuildArgs),
    /// Compress and upload a module's build output
    Upload(upload::UploadArgs),
    /// Run a module's deploy script on its server
    Deploy(deploy::DeployArgs),
    /// Build, compress, upload and deploy a module
    #[command(visible_alias = "build-and-deploy")]
    Ship(ship::ShipArgs),
    /// Check that a module's server accepts its credentials
    TestConnection(connection::ConnectionArgs),
}

/// Absolute workspace root from `--root`, with `~` expanded.
fn resolve_root(root: Option<&str>) -> alphonse::Result<PathBuf> {
    let cwd = std::env::current_dir().map_err(|e| {
        alphonse::Error::internal_io(e.to_string(), Some("read current directory".to_string()))
    })?;

    Ok(match root {
        Some(dir) => {
            let expanded = PathBuf::from(shellexpand::tilde(dir).as_ref());
            alphonse::paths::normalize(&cwd.join(expanded))
        }
        None => cwd,
    })
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let root = match resolve_root(cli.root.as_deref()) {
        Ok(root) => root,
        Err(err) => {
            let _ = output::print_result::<serde_json::Value>(Err(err));
            return std::process::ExitCode::from(1);
        }
    };

    let global = GlobalArgs { root };
    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    let _ = output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_root_becomes_absolute() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(resolve_root(Some("proj/./site")).unwrap(), cwd.join("proj/site"));
        assert_eq!(resolve_root(None).unwrap(), cwd);
        assert_eq!(resolve_root(Some("/srv/ws")).unwrap(), PathBuf::from("/srv/ws"));
    }

    #[test]
    fn exit_codes_clamp_to_a_byte() {
        assert_eq!(exit_code_to_u8(-1), 0);
        assert_eq!(exit_code_to_u8(20), 20);
        assert_eq!(exit_code_to_u8(300), 255);
    }
}
