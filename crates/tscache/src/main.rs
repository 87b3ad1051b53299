//! Tscache server binary entry point.

use std::process::ExitCode;
use std::sync::{Arc, RwLock};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use alopex_tscache::{CacheTree, CliArgs, Dispatcher, Result, Server, TimeseriesRegistry};

fn run(args: CliArgs) -> Result<()> {
    let config = args.into_config()?;
    info!("Starting tscache with config: {:?}", config);

    let registry = Arc::new(TimeseriesRegistry::with_origin(config.id_origin));
    let tree = Arc::new(RwLock::new(CacheTree::new()));
    let server = Server::bind(&config, Dispatcher::new(registry, tree))?;
    server.serve()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_line_number(true)
        .init();

    let args = CliArgs::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("tscache stopped: {}", err);
            ExitCode::FAILURE
        }
    }
}
