//! `grpc_simple.StreamingService` of `streaming-server`.

use crate::pb::grpc_simple::{ListFeaturesReq, ListFeaturesResp};
use rpchost::registry::{Registry, RegistryError, ServiceDefinition};
use rpchost::{Request, Status};
use std::time::Duration;
use tokio_stream::{Stream, StreamExt};

/// Every feature `ListFeatures` streams, in order.
pub const FEATURES: [&str; 8] = [
    "Upload Files",
    "Delete Files",
    "1TB Storage",
    "Share Files with Others",
    "Automated Backup",
    "Advanced Search",
    "Bulk File Upload",
    "File Preview",
];

/// Register `StreamingService`, pausing `interval` before each feature.
pub fn register(registry: &mut Registry, interval: Duration) -> Result<(), RegistryError> {
    registry.register(
        ServiceDefinition::builder("grpc_simple.StreamingService")
            .server_streaming("ListFeatures", move |request: Request<ListFeaturesReq>| {
                list_features(request, interval)
            })
            .build(),
    )
}

async fn list_features(
    _: Request<ListFeaturesReq>,
    interval: Duration,
) -> Result<impl Stream<Item = Result<ListFeaturesResp, Status>>, Status> {
    let features = tokio_stream::iter(FEATURES).then(move |name| async move {
        tokio::time::sleep(interval).await;
        Ok(ListFeaturesResp { name: name.into() })
    });

    Ok(features)
}
