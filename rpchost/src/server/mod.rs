//! The HTTP/2 transport server.

mod error;
mod incoming;

pub use self::error::Error;
pub use self::incoming::TcpIncoming;

use crate::dispatch::Dispatcher;
use crate::registry::Registry;
use crate::BoxError;
use hyper::server::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_stream::{Stream, StreamExt};
use tower::{limit::ConcurrencyLimitLayer, ServiceBuilder};
use tracing::{debug, info, trace};

const DEFAULT_HTTP2_KEEPALIVE_TIMEOUT_SECS: u64 = 20;

/// A gRPC server serving every service of one [`Registry`] on one listener.
///
/// ```no_run
/// # use rpchost::{registry::Registry, Server};
/// # async fn run(registry: Registry) -> Result<(), rpchost::server::Error> {
/// Server::builder()
///     .timeout(std::time::Duration::from_secs(30))
///     .serve("127.0.0.1:50051".parse().unwrap(), registry)
///     .await
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Server {
    concurrency_limit: Option<usize>,
    timeout: Option<Duration>,
    stream_buffer_size: Option<usize>,
    max_recv_message_size: Option<usize>,
    init_stream_window_size: Option<u32>,
    init_connection_window_size: Option<u32>,
    max_concurrent_streams: Option<u32>,
    tcp_keepalive: Option<Duration>,
    tcp_nodelay: bool,
    http2_keepalive_interval: Option<Duration>,
    http2_keepalive_timeout: Option<Duration>,
    max_frame_size: Option<u32>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            concurrency_limit: None,
            timeout: None,
            stream_buffer_size: None,
            max_recv_message_size: None,
            init_stream_window_size: None,
            init_connection_window_size: None,
            max_concurrent_streams: None,
            tcp_keepalive: None,
            tcp_nodelay: false,
            http2_keepalive_interval: None,
            http2_keepalive_timeout: None,
            max_frame_size: None,
        }
    }
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> Self {
        Server {
            tcp_nodelay: true,
            ..Default::default()
        }
    }

    /// Set the concurrency limit applied to inbound calls per connection.
    #[must_use]
    pub fn concurrency_limit_per_connection(self, limit: usize) -> Self {
        Server {
            concurrency_limit: Some(limit),
            ..self
        }
    }

    /// Set a timeout for every call. A shorter `grpc-timeout` sent by the
    /// caller still wins.
    #[must_use]
    pub fn timeout(self, timeout: Duration) -> Self {
        Server {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Number of items a server-streaming call produces ahead of the caller.
    ///
    /// Default is 1.
    #[must_use]
    pub fn stream_buffer_size(self, size: impl Into<Option<usize>>) -> Self {
        Server {
            stream_buffer_size: size.into(),
            ..self
        }
    }

    /// Limits the maximum size of a request message.
    ///
    /// Default is 4MB.
    #[must_use]
    pub fn max_recv_message_size(self, limit: usize) -> Self {
        Server {
            max_recv_message_size: Some(limit),
            ..self
        }
    }

    /// Sets the [`SETTINGS_INITIAL_WINDOW_SIZE`][spec] option for HTTP2
    /// stream-level flow control.
    ///
    /// Default is 65,535
    ///
    /// [spec]: https://httpwg.org/specs/rfc9113.html#InitialWindowSize
    #[must_use]
    pub fn initial_stream_window_size(self, sz: impl Into<Option<u32>>) -> Self {
        Server {
            init_stream_window_size: sz.into(),
            ..self
        }
    }

    /// Sets the max connection-level flow control for HTTP2
    ///
    /// Default is 65,535
    #[must_use]
    pub fn initial_connection_window_size(self, sz: impl Into<Option<u32>>) -> Self {
        Server {
            init_connection_window_size: sz.into(),
            ..self
        }
    }

    /// Sets the [`SETTINGS_MAX_CONCURRENT_STREAMS`][spec] option for HTTP2
    /// connections.
    ///
    /// Default is no limit (`None`).
    ///
    /// [spec]: https://httpwg.org/specs/rfc9113.html#n-stream-concurrency
    #[must_use]
    pub fn max_concurrent_streams(self, max: impl Into<Option<u32>>) -> Self {
        Server {
            max_concurrent_streams: max.into(),
            ..self
        }
    }

    /// Set the interval between HTTP2 Ping frames. `None` disables HTTP2
    /// keepalive.
    ///
    /// Default is no HTTP2 keepalive (`None`)
    #[must_use]
    pub fn http2_keepalive_interval(self, http2_keepalive_interval: Option<Duration>) -> Self {
        Server {
            http2_keepalive_interval,
            ..self
        }
    }

    /// Sets a timeout for receiving an acknowledgement of the keepalive ping.
    ///
    /// Default is 20 seconds.
    #[must_use]
    pub fn http2_keepalive_timeout(self, http2_keepalive_timeout: Option<Duration>) -> Self {
        Server {
            http2_keepalive_timeout,
            ..self
        }
    }

    /// Set whether TCP keepalive messages are enabled on accepted connections.
    ///
    /// Default is no keepalive (`None`)
    #[must_use]
    pub fn tcp_keepalive(self, tcp_keepalive: Option<Duration>) -> Self {
        Server {
            tcp_keepalive,
            ..self
        }
    }

    /// Set the value of `TCP_NODELAY` option for accepted connections. Enabled by default.
    #[must_use]
    pub fn tcp_nodelay(self, enabled: bool) -> Self {
        Server {
            tcp_nodelay: enabled,
            ..self
        }
    }

    /// Sets the maximum frame size to use for HTTP2.
    ///
    /// If not set, will default from underlying transport.
    #[must_use]
    pub fn max_frame_size(self, frame_size: impl Into<Option<u32>>) -> Self {
        Server {
            max_frame_size: frame_size.into(),
            ..self
        }
    }

    /// Build the dispatcher this server would run for `registry`.
    pub fn dispatcher(&self, registry: Registry) -> Dispatcher {
        let mut dispatcher = Dispatcher::new(registry).timeout(self.timeout);
        if let Some(size) = self.stream_buffer_size {
            dispatcher = dispatcher.stream_buffer_size(size);
        }
        if let Some(limit) = self.max_recv_message_size {
            dispatcher = dispatcher.max_recv_message_size(limit);
        }
        dispatcher
    }

    /// Serve `registry` on `addr` until the process ends.
    pub async fn serve(self, addr: SocketAddr, registry: Registry) -> Result<(), Error> {
        self.serve_with_shutdown(addr, registry, std::future::pending())
            .await
    }

    /// Serve `registry` on `addr` until `signal` completes, then drain open
    /// connections.
    pub async fn serve_with_shutdown<F>(
        self,
        addr: SocketAddr,
        registry: Registry,
        signal: F,
    ) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let incoming = TcpIncoming::bind(addr)
            .map_err(Error::from_bind)?
            .with_nodelay(self.tcp_nodelay)
            .with_keepalive(self.tcp_keepalive);

        if let Ok(local) = incoming.local_addr() {
            info!(%local, services = registry.len(), "listening");
        }

        self.serve_with_incoming_shutdown(incoming, registry, signal)
            .await
    }

    /// Serve `registry` on the connections of `incoming` until `signal`
    /// completes.
    ///
    /// TCP options of this builder are not applied to `incoming`.
    pub async fn serve_with_incoming_shutdown<I, IO, IE, F>(
        self,
        incoming: I,
        registry: Registry,
        signal: F,
    ) -> Result<(), Error>
    where
        I: Stream<Item = Result<IO, IE>>,
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        IE: Into<BoxError>,
        F: Future<Output = ()>,
    {
        let dispatcher = self.dispatcher(registry);
        let concurrency_limit = self.concurrency_limit;

        let mut builder = http2::Builder::new(TokioExecutor::new());
        builder
            .timer(TokioTimer::new())
            .initial_stream_window_size(self.init_stream_window_size)
            .initial_connection_window_size(self.init_connection_window_size)
            .max_concurrent_streams(self.max_concurrent_streams)
            .keep_alive_interval(self.http2_keepalive_interval)
            .keep_alive_timeout(
                self.http2_keepalive_timeout
                    .unwrap_or_else(|| Duration::new(DEFAULT_HTTP2_KEEPALIVE_TIMEOUT_SECS, 0)),
            )
            .max_frame_size(self.max_frame_size);

        let graceful = GracefulShutdown::new();
        // one clone per served connection
        let open_connections = Arc::new(());
        let mut incoming = std::pin::pin!(incoming);
        let mut signal = std::pin::pin!(signal);

        loop {
            tokio::select! {
                _ = &mut signal => {
                    trace!("signal received, shutting down");
                    break;
                },
                io = incoming.next() => {
                    let io = match io {
                        Some(Ok(io)) => io,
                        Some(Err(e)) => {
                            let e: BoxError = e.into();
                            trace!("error accepting connection: {}", e);
                            continue;
                        },
                        None => break,
                    };

                    let svc = ServiceBuilder::new()
                        .option_layer(concurrency_limit.map(ConcurrencyLimitLayer::new))
                        .service(dispatcher.clone());

                    let conn = builder.serve_connection(TokioIo::new(io), TowerToHyperService::new(svc));
                    let conn = graceful.watch(conn);
                    let open = open_connections.clone();

                    tokio::spawn(async move {
                        let _open = open;
                        if let Err(err) = conn.await {
                            debug!("failed serving connection: {}", err);
                        }
                    });
                },
            }
        }

        let connections = Arc::strong_count(&open_connections) - 1;
        debug!(connections, "draining connections");
        graceful.shutdown().await;

        Ok(())
    }
}
