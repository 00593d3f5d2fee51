use std::panic;

use clap::Parser;
use tracing::error;

use pcf_telemetry::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Report panics through tracing so they reach the configured log output
    panic::set_hook(Box::new(|panic_info| {
        error!(?panic_info, "Panic occurred");
    }));

    if let Err(e) = pcf_telemetry::run_server(&cli).await {
        eprintln!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}
