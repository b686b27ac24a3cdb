use clap::Parser;
use measurement_collector::config::Config;
use measurement_collector::{logger, server};

#[derive(Parser)]
#[command(name = "measurement-collector", about = "Measurement upload server", version)]
struct Cli {
    /// Configuration file, with or without the .toml extension.
    /// Defaults to ./collector.toml when present.
    #[arg(short, long)]
    config: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = match cli.config.as_deref() {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    logger::init(&cfg)?;

    // Build the Tokio runtime, sizing the worker pool from the config
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers.filter(|&w| w > 0) {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(server::run(cfg))
}
