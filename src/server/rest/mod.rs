//! Code supporting the `server rest` sub command.

use std::time::Instant;

use actix_web::web::Data;
use clap::Parser;
use tracing::info;

use crate::{
    common::{trace_rss_now, VERSION},
    conf::Config,
    query::Engine,
};

pub mod actix_server;

/// Shared state of all request handlers.
pub struct WebServerData {
    pub engine: Engine,
}

/// Command line arguments for `server rest` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Run REST API server", long_about = None)]
pub struct Args {
    /// Path to configuration TOML file.
    #[arg(long, required = true)]
    pub path_conf: String,
    /// IP to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    pub listen_host: String,
    /// Port to listen on.
    #[arg(long, default_value_t = 8081)]
    pub listen_port: u16,
    /// Number of HTTP worker threads; one per core if omitted.
    #[arg(long)]
    pub workers: Option<usize>,
}

/// Main entry point for `server rest` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    info!("variant-lookup-worker {}", VERSION);
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    info!("Loading configuration...");
    let config = Config::load(&args.path_conf)?;

    info!("Opening data sources...");
    let before_loading = Instant::now();
    let engine = Engine::from_config(&config)?;
    info!(
        "...done loading data sources in {:?}",
        before_loading.elapsed()
    );

    let data = Data::new(WebServerData { engine });

    trace_rss_now();

    info!("Launching server ...");
    actix_server::main(args, data)?;

    info!("All done. Have a nice day!");
    Ok(())
}
