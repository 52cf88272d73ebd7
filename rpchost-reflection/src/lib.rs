//! Service reflection for `rpchost`.
//!
//! Registers the `rpchost.reflection.v1.ServerReflection` service, which
//! lets a generic client list the services a host serves and discover each
//! method's name, call shape and message types.

#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]

/// Generated protobuf types from the `rpchost.reflection.v1` package.
pub mod proto {
    #![allow(unreachable_pub)]
    #![allow(missing_docs)]
    include!("generated/rpchost.reflection.v1.rs");
}

/// Implementation of the server component of service reflection.
pub mod server;

pub use server::{Builder, SERVICE_NAME};
