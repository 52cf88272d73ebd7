//! Message types of the demo services, generated from `proto/` by
//! `build.rs`.

/// The `grpc_simple` package.
pub mod grpc_simple {
    include!(concat!(env!("OUT_DIR"), "/grpc_simple.rs"));
}

/// The `order` package of the website demo.
pub mod order {
    include!(concat!(env!("OUT_DIR"), "/order.rs"));
}

/// The `price` package of the website demo.
pub mod price {
    include!(concat!(env!("OUT_DIR"), "/price.rs"));
}
