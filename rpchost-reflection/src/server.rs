use crate::proto;
use rpchost::registry::{self, MethodKind, Registry, RegistryError, ServiceDefinition};
use rpchost::{Request, Status};
use std::sync::{Arc, OnceLock};
use tokio_stream::Stream;
use tracing::{debug, info};

/// The fully qualified name of the reflection service.
pub const SERVICE_NAME: &str = "rpchost.reflection.v1.ServerReflection";

/// A builder used to register the reflection service.
///
/// The service describes the registry as it is when the service is
/// registered, so it should be registered after every other service.
#[derive(Debug)]
pub struct Builder {
    include_reflection_service: bool,
}

impl Builder {
    /// Create a new builder that can configure the reflection service.
    pub fn configure() -> Self {
        Builder {
            include_reflection_service: true,
        }
    }

    /// Describe the reflection service itself. This is enabled by
    /// default - set `include` to false to disable.
    pub fn include_reflection_service(mut self, include: bool) -> Self {
        self.include_reflection_service = include;
        self
    }

    /// Register the reflection service into `registry`.
    pub fn register(self, registry: &mut Registry) -> Result<(), RegistryError> {
        let catalog = Arc::new(Catalog::default());

        let list = catalog.clone();
        let describe = catalog.clone();
        let all = catalog.clone();
        let definition = ServiceDefinition::builder(SERVICE_NAME)
            .unary(
                "ListServices",
                move |request: Request<proto::ListServicesRequest>| {
                    list.clone().list_services(request)
                },
            )
            .unary(
                "DescribeService",
                move |request: Request<proto::DescribeServiceRequest>| {
                    describe.clone().describe_service(request)
                },
            )
            .server_streaming(
                "DescribeAll",
                move |request: Request<proto::DescribeAllRequest>| {
                    all.clone().describe_all(request)
                },
            )
            .build();

        registry.register(definition)?;

        let services = registry
            .services()
            .iter()
            .filter(|service| self.include_reflection_service || service.name() != SERVICE_NAME)
            .map(describe_service)
            .collect::<Vec<_>>();

        info!(services = services.len(), "reflection catalog ready");
        // a fresh catalog is only ever filled here
        let _ = catalog.services.set(services);

        Ok(())
    }
}

#[derive(Debug, Default)]
struct Catalog {
    services: OnceLock<Vec<proto::ServiceDescriptor>>,
}

impl Catalog {
    fn services(&self) -> &[proto::ServiceDescriptor] {
        self.services.get().map(Vec::as_slice).unwrap_or_default()
    }

    async fn list_services(
        self: Arc<Self>,
        _: Request<proto::ListServicesRequest>,
    ) -> Result<proto::ListServicesResponse, Status> {
        let services = self
            .services()
            .iter()
            .map(|service| service.name.clone())
            .collect();

        Ok(proto::ListServicesResponse { services })
    }

    async fn describe_service(
        self: Arc<Self>,
        request: Request<proto::DescribeServiceRequest>,
    ) -> Result<proto::ServiceDescriptor, Status> {
        let name = &request.get_ref().name;
        debug!(service = %name, "describe service");

        self.services()
            .iter()
            .find(|service| &service.name == name)
            .cloned()
            .ok_or_else(|| Status::not_found(format!("service {} not found", name)))
    }

    async fn describe_all(
        self: Arc<Self>,
        _: Request<proto::DescribeAllRequest>,
    ) -> Result<impl Stream<Item = Result<proto::ServiceDescriptor, Status>>, Status> {
        let services = self.services().to_vec();
        Ok(tokio_stream::iter(services.into_iter().map(Ok)))
    }
}

fn describe_service(service: &registry::ServiceDescriptor) -> proto::ServiceDescriptor {
    proto::ServiceDescriptor {
        name: service.name().to_owned(),
        methods: service
            .methods()
            .iter()
            .map(|method| proto::MethodDescriptor {
                name: method.name().to_owned(),
                kind: method_kind(method.kind()) as i32,
                input_type: method.input_type().to_owned(),
                output_type: method.output_type().to_owned(),
            })
            .collect(),
    }
}

fn method_kind(kind: MethodKind) -> proto::MethodKind {
    match kind {
        MethodKind::Unary => proto::MethodKind::Unary,
        MethodKind::ServerStreaming => proto::MethodKind::ServerStreaming,
    }
}
