use clap::Parser;
use rpchost::registry::Registry;
use rpchost_demos::{config::ServerArgs, simple, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    telemetry::init();

    let mut registry = Registry::new();
    simple::register(&mut registry)?;
    rpchost_reflection::Builder::configure().register(&mut registry)?;

    rpchost_demos::run(&args, registry).await
}
