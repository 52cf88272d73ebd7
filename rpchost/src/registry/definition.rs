use super::{MethodDescriptor, MethodKind, ServiceDescriptor};
use crate::handler::{Route, StreamingHandler, UnaryHandler};
use prost::{Message, Name};

/// A service ready to be registered: its descriptor and one handler per
/// method.
///
/// ```rust
/// # use rpchost::{registry::ServiceDefinition, Request, Status};
/// # #[derive(Clone, PartialEq, prost::Message)]
/// # struct HelloReq { #[prost(string, tag = "1")] name: String }
/// # impl prost::Name for HelloReq {
/// #     const NAME: &'static str = "HelloReq";
/// #     const PACKAGE: &'static str = "grpc_simple";
/// # }
/// # #[derive(Clone, PartialEq, prost::Message)]
/// # struct HelloResp { #[prost(string, tag = "1")] message: String }
/// # impl prost::Name for HelloResp {
/// #     const NAME: &'static str = "HelloResp";
/// #     const PACKAGE: &'static str = "grpc_simple";
/// # }
/// async fn say_hello(request: Request<HelloReq>) -> Result<HelloResp, Status> {
///     let message = format!("Hello {}", request.get_ref().name);
///     Ok(HelloResp { message })
/// }
///
/// let greeter = ServiceDefinition::builder("grpc_simple.Greeter")
///     .unary("SayHello", say_hello)
///     .build();
///
/// let method = greeter.descriptor().method("SayHello").unwrap();
/// assert_eq!(method.input_type(), "grpc_simple.HelloReq");
/// ```
#[derive(Debug)]
pub struct ServiceDefinition {
    pub(super) descriptor: ServiceDescriptor,
    pub(super) routes: Vec<Route>,
}

impl ServiceDefinition {
    /// Start building the definition of the service called `name`, a fully
    /// qualified protobuf service name such as `grpc_simple.Greeter`.
    pub fn builder(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            descriptor: ServiceDescriptor {
                name: name.into(),
                methods: Vec::new(),
            },
            routes: Vec::new(),
        }
    }

    /// The descriptor this definition will register.
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }
}

/// Builder for [`ServiceDefinition`].
///
/// Method names are checked for uniqueness when the definition is
/// registered, not while building it.
#[derive(Debug)]
pub struct ServiceBuilder {
    descriptor: ServiceDescriptor,
    routes: Vec<Route>,
}

impl ServiceBuilder {
    /// Add a unary method.
    pub fn unary<Req, H>(self, method: impl Into<String>, handler: H) -> Self
    where
        Req: Message + Default + Name + Send + 'static,
        H: UnaryHandler<Req>,
    {
        self.method(
            MethodDescriptor {
                name: method.into(),
                kind: MethodKind::Unary,
                input_type: Req::full_name(),
                output_type: H::Response::full_name(),
            },
            Route::unary(handler),
        )
    }

    /// Add a server-streaming method.
    pub fn server_streaming<Req, H>(self, method: impl Into<String>, handler: H) -> Self
    where
        Req: Message + Default + Name + Send + 'static,
        H: StreamingHandler<Req>,
    {
        self.method(
            MethodDescriptor {
                name: method.into(),
                kind: MethodKind::ServerStreaming,
                input_type: Req::full_name(),
                output_type: H::Response::full_name(),
            },
            Route::server_streaming(handler),
        )
    }

    fn method(mut self, descriptor: MethodDescriptor, route: Route) -> Self {
        self.descriptor.methods.push(descriptor);
        self.routes.push(route);
        self
    }

    /// Finish the definition.
    pub fn build(self) -> ServiceDefinition {
        ServiceDefinition {
            descriptor: self.descriptor,
            routes: self.routes,
        }
    }
}
