mod logging;

use clap::Parser;
use duplex_pump::{cli::StreamArgs, loopback, run};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "jsonl-pump")]
#[command(about = "Pump JSON records through a loopback duplex and print what comes back")]
struct Cli {
    #[command(flatten)]
    stream: StreamArgs,

    /// Print send/recv markers (same as --stream-verbose)
    #[arg(short, long)]
    verbose: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Records buffered between the send and receive sides
    #[arg(long, default_value_t = 16)]
    capacity: usize,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let io = cli.stream.open().await;
    let config = cli.stream.config(cli.verbose);
    let report = run(loopback::echo::<Value>(cli.capacity), io, config).await;
    tracing::debug!(
        sent = report.stats.sent,
        received = report.stats.received,
        success = report.is_success(),
        "jsonl-pump finished"
    );
}
