//! Demo servers built on `rpchost`.
//!
//! Each binary under `src/bin` assembles a [`Registry`] from the modules
//! here and serves it with [`run`] until interrupted.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod debugger;
pub mod orders;
pub mod pb;
pub mod simple;
pub mod streaming;
pub mod telemetry;
pub mod website;

use anyhow::Context as _;
use config::ServerArgs;
use rpchost::registry::Registry;
use tracing::info;

/// Serve `registry` as configured by `args` until Ctrl-C.
pub async fn run(args: &ServerArgs, registry: Registry) -> anyhow::Result<()> {
    let addr = args.addr();
    for service in registry.services() {
        info!(service = service.name(), methods = service.methods().len(), "registered");
    }

    args.server()
        .serve_with_shutdown(addr, registry, async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, shutting down");
            }
        })
        .await
        .with_context(|| format!("failed to serve on {}", addr))
}
