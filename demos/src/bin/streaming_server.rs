use clap::Parser;
use rpchost::registry::Registry;
use rpchost_demos::{config::StreamingArgs, streaming, telemetry};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = StreamingArgs::parse();
    telemetry::init();

    let mut registry = Registry::new();
    streaming::register(
        &mut registry,
        Duration::from_millis(args.feature_interval_ms),
    )?;

    rpchost_demos::run(&args.server, registry).await
}
