use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use dcl_gateway::config;
use dcl_gateway::gateway::format;
use dcl_gateway::mcp_client::environment::ProcessEnv;

#[derive(Parser)]
#[command(name = "dcl-gateway")]
#[command(version)]
#[command(about = "MCP gateway that starts other MCP servers on demand, one call at a time")]
struct Cli {
    /// Config file (JSON, or YAML by extension). Defaults to ./mcp_config.json,
    /// then the user config directory.
    #[arg(long, env = config::CONFIG_PATH_VAR)]
    config: Option<PathBuf>,

    /// Validate the configuration, print the server listing to stderr and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let path = config::find_config_path(cli.config.as_deref(), &cwd);
    let config = config::load(path.as_deref(), &ProcessEnv).context("invalid configuration")?;

    if cli.check {
        let gateway = dcl_gateway::build_gateway(config);
        let entries: Vec<_> = gateway
            .list_available()
            .into_iter()
            .map(|summary| {
                let missing = gateway.missing_variables(&summary.name);
                (summary, missing)
            })
            .collect();
        eprint!("{}", format::endpoint_listing(&entries));
        return Ok(());
    }

    let log_file =
        dcl_gateway::init_tracing(config.log_dir.as_deref()).context("failed to set up logging")?;

    dcl_gateway::run(config, log_file)
        .await
        .context("gateway stopped with an I/O error")?;
    Ok(())
}
