use http::uri::PathAndQuery;
use prost::Name;
use rpchost::registry::{Registry, ServiceDefinition};
use rpchost::{Request, Server, Status};
use rpchost_reflection::proto::{
    DescribeAllRequest, DescribeServiceRequest, ListServicesRequest, ListServicesResponse,
    MethodKind, ServiceDescriptor,
};
use rpchost_reflection::{Builder, SERVICE_NAME};
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::transport::Channel;
use tonic::Code;

#[derive(Clone, PartialEq, ::prost::Message)]
struct HelloReq {
    #[prost(string, tag = "1")]
    name: String,
}

impl Name for HelloReq {
    const NAME: &'static str = "HelloReq";
    const PACKAGE: &'static str = "grpc_simple";
}

#[derive(Clone, PartialEq, ::prost::Message)]
struct HelloResp {
    #[prost(string, tag = "1")]
    message: String,
}

impl Name for HelloResp {
    const NAME: &'static str = "HelloResp";
    const PACKAGE: &'static str = "grpc_simple";
}

async fn say_hello(request: Request<HelloReq>) -> Result<HelloResp, Status> {
    Ok(HelloResp {
        message: format!("Hello {}", request.get_ref().name),
    })
}

fn registry(include_self: bool) -> Registry {
    let mut registry = Registry::new();
    registry
        .register(
            ServiceDefinition::builder("grpc_simple.Greeter")
                .unary("SayHello", say_hello)
                .build(),
        )
        .unwrap();
    Builder::configure()
        .include_reflection_service(include_self)
        .register(&mut registry)
        .unwrap();
    registry
}

async fn start(registry: Registry) -> (Grpc<Channel>, oneshot::Sender<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(Server::builder().serve_with_incoming_shutdown(
        TcpListenerStream::new(listener),
        registry,
        async {
            let _ = rx.await;
        },
    ));

    let channel = Channel::from_shared(format!("http://{}", addr))
        .unwrap()
        .connect()
        .await
        .unwrap();

    (Grpc::new(channel), tx)
}

async fn list_services(client: &mut Grpc<Channel>) -> Vec<String> {
    client.ready().await.unwrap();
    let codec: ProstCodec<ListServicesRequest, ListServicesResponse> = ProstCodec::default();
    client
        .unary(
            tonic::Request::new(ListServicesRequest {}),
            PathAndQuery::from_static("/rpchost.reflection.v1.ServerReflection/ListServices"),
            codec,
        )
        .await
        .unwrap()
        .into_inner()
        .services
}

async fn describe(
    client: &mut Grpc<Channel>,
    name: &str,
) -> Result<ServiceDescriptor, tonic::Status> {
    client.ready().await.unwrap();
    let codec: ProstCodec<DescribeServiceRequest, ServiceDescriptor> = ProstCodec::default();
    client
        .unary(
            tonic::Request::new(DescribeServiceRequest { name: name.into() }),
            PathAndQuery::from_static("/rpchost.reflection.v1.ServerReflection/DescribeService"),
            codec,
        )
        .await
        .map(tonic::Response::into_inner)
}

#[tokio::test]
async fn lists_every_service_once_in_order() {
    let (mut client, shutdown) = start(registry(true)).await;

    let services = list_services(&mut client).await;
    assert_eq!(services, vec!["grpc_simple.Greeter", SERVICE_NAME]);

    shutdown.send(()).unwrap();
}

#[tokio::test]
async fn can_hide_itself() {
    let (mut client, shutdown) = start(registry(false)).await;

    let services = list_services(&mut client).await;
    assert_eq!(services, vec!["grpc_simple.Greeter"]);

    shutdown.send(()).unwrap();
}

#[tokio::test]
async fn describes_method_shapes() {
    let (mut client, shutdown) = start(registry(true)).await;

    let greeter = describe(&mut client, "grpc_simple.Greeter").await.unwrap();
    assert_eq!(greeter.methods.len(), 1);

    let method = &greeter.methods[0];
    assert_eq!(method.name, "SayHello");
    assert_eq!(method.kind(), MethodKind::Unary);
    assert_eq!(method.input_type, "grpc_simple.HelloReq");
    assert_eq!(method.output_type, "grpc_simple.HelloResp");

    let err = describe(&mut client, "grpc_simple.Missing").await.unwrap_err();
    assert_eq!(err.code(), Code::NotFound);

    shutdown.send(()).unwrap();
}

#[tokio::test]
async fn streams_every_descriptor() {
    let (mut client, shutdown) = start(registry(true)).await;

    client.ready().await.unwrap();
    let codec: ProstCodec<DescribeAllRequest, ServiceDescriptor> = ProstCodec::default();
    let mut stream = client
        .server_streaming(
            tonic::Request::new(DescribeAllRequest {}),
            PathAndQuery::from_static("/rpchost.reflection.v1.ServerReflection/DescribeAll"),
            codec,
        )
        .await
        .unwrap()
        .into_inner();

    let mut names = Vec::new();
    while let Some(service) = stream.message().await.unwrap() {
        names.push(service.name);
    }
    assert_eq!(names, vec!["grpc_simple.Greeter", SERVICE_NAME]);

    let own = describe(&mut client, SERVICE_NAME).await.unwrap();
    let kinds = own.methods.iter().map(|m| m.kind()).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![MethodKind::Unary, MethodKind::Unary, MethodKind::ServerStreaming]
    );

    shutdown.send(()).unwrap();
}
