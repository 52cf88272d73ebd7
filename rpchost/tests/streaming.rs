mod support;

use futures_util::{stream, Stream, StreamExt};
use rpchost::registry::{Registry, ServiceDefinition};
use rpchost::{CancelReason, Request, Server, Status};
use std::time::Duration;
use support::{input, Input, Output};
use tokio::sync::mpsc;
use tonic::Code;

async fn count(
    request: Request<Input>,
) -> Result<impl Stream<Item = Result<Output, Status>>, Status> {
    let n = request.get_ref().value;
    if n < 0 {
        return Err(Status::invalid_argument("count must not be negative"));
    }

    Ok(stream::iter(0..n).map(|value| {
        Ok(Output {
            value,
            text: format!("item {}", value),
        })
    }))
}

async fn fail_after_two(
    _: Request<Input>,
) -> Result<impl Stream<Item = Result<Output, Status>>, Status> {
    Ok(stream::iter(vec![
        Ok(Output {
            value: 0,
            ..Default::default()
        }),
        Ok(Output {
            value: 1,
            ..Default::default()
        }),
        Err(Status::unavailable("feature store went away")),
    ]))
}

fn ticking(
    context: rpchost::CallContext,
) -> impl Stream<Item = Result<Output, Status>> + Send + 'static {
    stream::unfold((0, context), |(value, context)| async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let text = context.metadata().get("x-stream").unwrap_or_default().to_owned();
        Some((Ok(Output { value, text }), (value + 1, context)))
    })
}

fn registry(observed: mpsc::UnboundedSender<Option<CancelReason>>) -> Registry {
    let mut registry = Registry::new();
    registry
        .register(
            ServiceDefinition::builder("test.Features")
                .server_streaming("Count", count)
                .server_streaming("FailAfterTwo", fail_after_two)
                .server_streaming("Ticks", move |request: Request<Input>| {
                    let observed = observed.clone();
                    async move {
                        let context = request.context().clone();
                        let watcher = context.clone();
                        tokio::spawn(async move {
                            watcher.cancelled().await;
                            let _ = observed.send(watcher.cancel_reason());
                        });
                        Ok::<_, Status>(ticking(context))
                    }
                })
                .build(),
        )
        .unwrap();
    registry
}

#[tokio::test]
async fn items_arrive_in_order_exactly_once() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let server = support::serve(Server::builder(), registry(tx)).await;
    let mut client = server.client().await;

    let mut stream = support::server_streaming(&mut client, "/test.Features/Count", input(8))
        .await
        .unwrap();

    let mut values = Vec::new();
    while let Some(output) = stream.message().await.unwrap() {
        values.push(output.value);
    }

    assert_eq!(values, (0..8).collect::<Vec<_>>());

    server.stop().await;
}

#[tokio::test]
async fn larger_buffer_keeps_order() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let server = support::serve(Server::builder().stream_buffer_size(16), registry(tx)).await;
    let mut client = server.client().await;

    let mut stream = support::server_streaming(&mut client, "/test.Features/Count", input(200))
        .await
        .unwrap();

    let mut values = Vec::new();
    while let Some(output) = stream.message().await.unwrap() {
        values.push(output.value);
    }

    assert_eq!(values, (0..200).collect::<Vec<_>>());

    server.stop().await;
}

#[tokio::test]
async fn failing_to_open_is_the_only_status() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let server = support::serve(Server::builder(), registry(tx)).await;
    let mut client = server.client().await;

    let err = support::server_streaming(&mut client, "/test.Features/Count", input(-1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);

    server.stop().await;
}

#[tokio::test]
async fn mid_stream_failure_keeps_delivered_items() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let server = support::serve(Server::builder(), registry(tx)).await;
    let mut client = server.client().await;

    let mut stream =
        support::server_streaming(&mut client, "/test.Features/FailAfterTwo", input(0))
            .await
            .unwrap();

    assert_eq!(stream.message().await.unwrap().unwrap().value, 0);
    assert_eq!(stream.message().await.unwrap().unwrap().value, 1);

    let err = stream.message().await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert_eq!(err.message(), "feature store went away");

    server.stop().await;
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_producer() {
    let (tx, mut observed) = mpsc::unbounded_channel();
    let server = support::serve(Server::builder(), registry(tx)).await;
    let mut client = server.client().await;

    let mut stream = support::server_streaming(&mut client, "/test.Features/Ticks", input(0))
        .await
        .unwrap();

    for expected in 0..3 {
        assert_eq!(stream.message().await.unwrap().unwrap().value, expected);
    }
    drop(stream);

    let reason = tokio::time::timeout(Duration::from_secs(5), observed.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, Some(CancelReason::PeerGone));

    server.stop().await;
}

#[tokio::test]
async fn deadline_ends_an_endless_stream() {
    let (tx, mut observed) = mpsc::unbounded_channel();
    let server = support::serve(Server::builder(), registry(tx)).await;
    let mut client = server.client().await;

    let mut request = input(0);
    request.set_timeout(Duration::from_millis(150));
    request
        .metadata_mut()
        .insert("x-stream", "same-every-time".parse().unwrap());

    let mut stream = support::server_streaming(&mut client, "/test.Features/Ticks", request)
        .await
        .unwrap();

    let mut received = 0;
    let err = loop {
        match stream.message().await {
            Ok(Some(output)) => {
                assert_eq!(output.value, received);
                assert_eq!(output.text, "same-every-time");
                received += 1;
            }
            Ok(None) => panic!("stream ended without an error"),
            Err(status) => break status,
        }
    };

    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert!(received > 0);

    let reason = tokio::time::timeout(Duration::from_secs(5), observed.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reason, Some(CancelReason::DeadlineExceeded));

    server.stop().await;
}
