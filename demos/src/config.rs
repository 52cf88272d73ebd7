//! Command line configuration shared by the demo servers.

use clap::Parser;
use rpchost::Server;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Options every demo server accepts. Each flag falls back to an
/// environment variable.
#[derive(Parser, Debug, Clone)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 50051)]
    pub port: u16,

    /// Deadline applied to calls that do not carry their own, in
    /// milliseconds.
    #[arg(long, env = "TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Items a streaming call may queue ahead of the client.
    #[arg(long, env = "STREAM_BUFFER_SIZE")]
    pub stream_buffer_size: Option<usize>,
}

impl ServerArgs {
    /// The socket address to bind.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// A server builder configured from these options.
    pub fn server(&self) -> Server {
        let mut server = Server::builder().stream_buffer_size(self.stream_buffer_size);
        if let Some(ms) = self.timeout_ms {
            server = server.timeout(Duration::from_millis(ms));
        }
        server
    }
}

/// Options of `streaming-server`.
#[derive(Parser, Debug, Clone)]
pub struct StreamingArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Pause before each streamed feature, in milliseconds.
    #[arg(long, env = "FEATURE_INTERVAL_MS", default_value_t = 1000)]
    pub feature_interval_ms: u64,
}

/// Options of `website-server`, which listens on 50052 unless told
/// otherwise.
#[derive(Parser, Debug, Clone)]
pub struct WebsiteArgs {
    /// Address to listen on.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 50052)]
    pub port: u16,

    /// Deadline applied to calls that do not carry their own, in
    /// milliseconds.
    #[arg(long, env = "TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,
}

impl From<WebsiteArgs> for ServerArgs {
    fn from(args: WebsiteArgs) -> Self {
        ServerArgs {
            host: args.host,
            port: args.port,
            timeout_ms: args.timeout_ms,
            stream_buffer_size: None,
        }
    }
}
