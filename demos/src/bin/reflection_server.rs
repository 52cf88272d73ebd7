use clap::Parser;
use rpchost::registry::Registry;
use rpchost_demos::{config::ServerArgs, orders, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    telemetry::init();

    let mut registry = Registry::new();
    orders::register(&mut registry)?;
    // must come last, it describes what is already registered
    rpchost_reflection::Builder::configure().register(&mut registry)?;

    rpchost_demos::run(&args, registry).await
}
