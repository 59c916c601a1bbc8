//! mTLS ambassador - device certificate verification and preauthorization
//! in front of the Mender device API.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use mtls_ambassador::{
    cli::{Cli, Command},
    config::Config,
    gateway::Server,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

async fn run_server(cli: Cli) -> ExitCode {
    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(listen) = cli.listen {
                config.listen = listen;
            }
            config
        }
        Err(e) => {
            eprintln!("error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let level = if config.debug_log { "debug" } else { cli.log_level.as_str() };
    if let Err(e) = setup_tracing(level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "starting mtls-ambassador");
    config.dump();

    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    let server = match Server::new(&config).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to start ambassador: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Ambassador shutdown complete");
    ExitCode::SUCCESS
}
