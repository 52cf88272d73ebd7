use clap::Parser;
use rpchost::registry::Registry;
use rpchost_demos::config::{ServerArgs, WebsiteArgs};
use rpchost_demos::{telemetry, website};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: ServerArgs = WebsiteArgs::parse().into();
    telemetry::init();

    let mut registry = Registry::new();
    website::register(&mut registry)?;

    rpchost_demos::run(&args, registry).await
}
