//! Code supporting the `query` sub command.

use std::{
    fs::File,
    io::{BufWriter, Write},
    time::Instant,
};

use clap::Parser;
use tracing::info;

use super::Engine;
use crate::{common::trace_rss_now, conf::Config};

/// Command line arguments for `query` sub command.
#[derive(Parser, Debug)]
#[command(author, version, about = "Run a single lookup query", long_about = None)]
pub struct Args {
    /// Path to configuration TOML file.
    #[arg(long, required = true)]
    pub path_conf: String,
    /// Query string: variants, rsIDs or one gene symbol.
    #[arg(long, required = true)]
    pub query: String,
    /// Path to output JSON file; stdout if omitted.
    #[arg(long)]
    pub path_output: Option<String>,
}

/// Main entry point for `query` sub command.
pub fn run(args_common: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    info!("args_common = {:?}", &args_common);
    info!("args = {:?}", &args);

    info!("Loading configuration...");
    let config = Config::load(&args.path_conf)?;
    let before_loading = Instant::now();
    let engine = Engine::from_config(&config)?;
    info!("...done loading data sources in {:?}", before_loading.elapsed());
    trace_rss_now();

    info!("Running query...");
    let before_query = Instant::now();
    let response = engine
        .run_query(&args.query)
        .map_err(|e| anyhow::anyhow!("query failed ({}): {}", e.kind(), e))?;
    info!(
        "...done with {} variants in {:?}",
        response.data.len(),
        before_query.elapsed()
    );

    let mut writer: Box<dyn Write> = match &args.path_output {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|e| {
            anyhow::anyhow!("could not create output file {}: {}", path, e)
        })?)),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    serde_json::to_writer_pretty(&mut writer, &response)?;
    writeln!(writer)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod test {
    use clap::Parser;

    use super::Args;

    #[test]
    fn parse_args() {
        let args = Args::parse_from([
            "query",
            "--path-conf",
            "conf.toml",
            "--query",
            "rs7412",
        ]);
        assert_eq!(args.path_conf, "conf.toml");
        assert_eq!(args.query, "rs7412");
        assert_eq!(args.path_output, None);
    }
}
