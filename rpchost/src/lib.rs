//! A multi-service gRPC host.
//!
//! `rpchost` serves any number of independent gRPC services on a single
//! HTTP/2 listener. Services are described and bound to their handlers in a
//! [`Registry`]; the [`Dispatcher`] routes every inbound call to its handler,
//! gives the handler the call's metadata, deadline and cancellation signal,
//! and writes back exactly one terminal [`Status`]. Unary and server-streaming
//! calls are supported. Server-streamed items are delivered in order, one at a
//! time as the caller accepts them.
//!
//! # Example
//!
//! ```no_run
//! use rpchost::{registry::{Registry, ServiceDefinition}, Request, Server, Status};
//!
//! #[derive(Clone, PartialEq, prost::Message)]
//! pub struct HelloReq {
//!     #[prost(string, tag = "1")]
//!     pub name: String,
//! }
//!
//! impl prost::Name for HelloReq {
//!     const NAME: &'static str = "HelloReq";
//!     const PACKAGE: &'static str = "grpc_simple";
//! }
//!
//! #[derive(Clone, PartialEq, prost::Message)]
//! pub struct HelloResp {
//!     #[prost(string, tag = "1")]
//!     pub message: String,
//! }
//!
//! impl prost::Name for HelloResp {
//!     const NAME: &'static str = "HelloResp";
//!     const PACKAGE: &'static str = "grpc_simple";
//! }
//!
//! async fn say_hello(request: Request<HelloReq>) -> Result<HelloResp, Status> {
//!     Ok(HelloResp {
//!         message: format!("Hello {}", request.get_ref().name),
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = Registry::new();
//!     registry.register(
//!         ServiceDefinition::builder("grpc_simple.Greeter")
//!             .unary("SayHello", say_hello)
//!             .build(),
//!     )?;
//!
//!     Server::builder()
//!         .serve("127.0.0.1:50051".parse()?, registry)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod body;
pub mod metadata;
pub mod registry;
pub mod server;
pub mod streaming;

mod codec;
mod context;
mod dispatch;
mod handler;
mod request;
mod status;

pub use crate::context::{CallContext, CallScope, CancelReason, Cancellation};
pub use crate::dispatch::{Dispatcher, DEFAULT_STREAM_BUFFER_SIZE};
pub use crate::handler::{StreamingHandler, UnaryHandler};
pub use crate::registry::Registry;
pub use crate::request::Request;
pub use crate::server::Server;
pub use crate::status::{Code, Status};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;
