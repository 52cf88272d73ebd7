//! `grpc_simple.Debugger`, which echoes the caller's metadata back.

use crate::pb::grpc_simple::{MetadataReq, MetadataResp};
use rpchost::metadata::MetadataMap;
use rpchost::registry::ServiceDefinition;
use rpchost::{Request, Status};
use serde_json::{Map, Value};

/// The `grpc_simple.Debugger` service.
pub fn definition() -> ServiceDefinition {
    ServiceDefinition::builder("grpc_simple.Debugger")
        .unary("Metadata", metadata)
        .build()
}

async fn metadata(request: Request<MetadataReq>) -> Result<MetadataResp, Status> {
    let json = serde_json::to_string(&to_json(request.metadata()))
        .map_err(|e| Status::internal(format!("failed to encode metadata: {}", e)))?;

    Ok(MetadataResp { metadata: json })
}

/// Key to list of values, values in the order they were sent.
pub(crate) fn to_json(metadata: &MetadataMap) -> Value {
    let object = metadata
        .keys()
        .map(|key| {
            let values = metadata
                .get_all(key)
                .into_iter()
                .map(|value| Value::String(value.to_owned()))
                .collect();
            (key.to_owned(), Value::Array(values))
        })
        .collect::<Map<_, _>>();

    Value::Object(object)
}
