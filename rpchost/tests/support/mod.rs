#![allow(dead_code)]

use http::uri::PathAndQuery;
use rpchost::{registry::Registry, Server};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::client::Grpc;
use tonic::codec::{ProstCodec, Streaming};
use tonic::transport::Channel;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Input {
    #[prost(int32, tag = "1")]
    pub value: i32,
    #[prost(string, tag = "2")]
    pub text: String,
}

impl prost::Name for Input {
    const NAME: &'static str = "Input";
    const PACKAGE: &'static str = "test";
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Output {
    #[prost(int32, tag = "1")]
    pub value: i32,
    #[prost(string, tag = "2")]
    pub text: String,
}

impl prost::Name for Output {
    const NAME: &'static str = "Output";
    const PACKAGE: &'static str = "test";
}

pub struct Running {
    pub addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), rpchost::server::Error>>,
}

impl Running {
    pub async fn client(&self) -> Grpc<Channel> {
        let channel = Channel::from_shared(format!("http://{}", self.addr))
            .unwrap()
            .connect()
            .await
            .unwrap();
        Grpc::new(channel)
    }

    pub async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

pub async fn serve(server: Server, registry: Registry) -> Running {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(server.serve_with_incoming_shutdown(
        TcpListenerStream::new(listener),
        registry,
        async {
            let _ = rx.await;
        },
    ));

    Running {
        addr,
        shutdown,
        handle,
    }
}

pub async fn unary(
    client: &mut Grpc<Channel>,
    path: &'static str,
    request: tonic::Request<Input>,
) -> Result<Output, tonic::Status> {
    client
        .ready()
        .await
        .map_err(|e| tonic::Status::unknown(e.to_string()))?;

    let codec: ProstCodec<Input, Output> = ProstCodec::default();
    client
        .unary(request, PathAndQuery::from_static(path), codec)
        .await
        .map(tonic::Response::into_inner)
}

pub async fn server_streaming(
    client: &mut Grpc<Channel>,
    path: &'static str,
    request: tonic::Request<Input>,
) -> Result<Streaming<Output>, tonic::Status> {
    client
        .ready()
        .await
        .map_err(|e| tonic::Status::unknown(e.to_string()))?;

    let codec: ProstCodec<Input, Output> = ProstCodec::default();
    client
        .server_streaming(request, PathAndQuery::from_static(path), codec)
        .await
        .map(tonic::Response::into_inner)
}

pub fn input(value: i32) -> tonic::Request<Input> {
    tonic::Request::new(Input {
        value,
        text: String::new(),
    })
}
