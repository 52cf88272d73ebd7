//! The service contract registry.
//!
//! A [`Registry`] maps every registered `(service, method)` pair to its
//! [`MethodDescriptor`] and its handler. It is filled before serving starts
//! and handed to the [`Dispatcher`](crate::Dispatcher) by value, after which
//! it is only ever read.

mod definition;

pub use self::definition::{ServiceBuilder, ServiceDefinition};

use crate::handler::Route;
use crate::status::Status;
use std::collections::HashMap;
use std::{error, fmt};
use tracing::debug;

/// The shape of a method's call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MethodKind {
    /// One request message, one response message.
    Unary,
    /// One request message, a stream of response messages.
    ServerStreaming,
}

impl MethodKind {
    /// The lowercase name of this kind, as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodKind::Unary => "unary",
            MethodKind::ServerStreaming => "server_streaming",
        }
    }
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The signature of one method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    name: String,
    kind: MethodKind,
    input_type: String,
    output_type: String,
}

impl MethodDescriptor {
    /// The method name, unique within its service.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the method is unary or server-streaming.
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    /// Fully qualified name of the request message type.
    pub fn input_type(&self) -> &str {
        &self.input_type
    }

    /// Fully qualified name of the response message type.
    pub fn output_type(&self) -> &str {
        &self.output_type
    }
}

/// A registered service and its methods, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDescriptor {
    name: String,
    methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    /// The fully qualified service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The service's methods, in the order they were declared.
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|method| method.name == name)
    }
}

/// Errors raised while registering or resolving services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A service with this name is already registered.
    DuplicateService(String),
    /// A service definition declares the same method name twice.
    DuplicateMethod {
        /// The service being registered.
        service: String,
        /// The repeated method name.
        method: String,
    },
    /// A service or method name is empty or contains `/`, so it cannot be
    /// carried in a call path.
    InvalidName {
        /// The service being registered.
        service: String,
        /// The offending method name, or `None` when the service name
        /// itself is invalid.
        method: Option<String>,
    },
    /// No service with this name is registered.
    UnknownService(String),
    /// The service is registered but has no such method.
    UnknownMethod {
        /// The registered service.
        service: String,
        /// The method that was asked for.
        method: String,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateService(service) => {
                write!(f, "service {} is already registered", service)
            }
            RegistryError::DuplicateMethod { service, method } => {
                write!(f, "service {} declares method {} twice", service, method)
            }
            RegistryError::InvalidName {
                service,
                method: None,
            } => write!(f, "invalid service name {:?}", service),
            RegistryError::InvalidName {
                service,
                method: Some(method),
            } => write!(f, "invalid method name {:?} for service {}", method, service),
            RegistryError::UnknownService(service) => write!(f, "unknown service {}", service),
            RegistryError::UnknownMethod { service, method } => {
                write!(f, "unknown method {} for service {}", method, service)
            }
        }
    }
}

impl error::Error for RegistryError {}

impl From<RegistryError> for Status {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownService(service) => Status::unknown_service(&service),
            RegistryError::UnknownMethod { service, method } => {
                Status::unknown_method(&service, &method)
            }
            err @ (RegistryError::DuplicateService(_)
            | RegistryError::DuplicateMethod { .. }
            | RegistryError::InvalidName { .. }) => Status::internal(err.to_string()),
        }
    }
}

#[derive(Debug)]
struct Entry {
    service: usize,
    method: usize,
    route: Route,
}

/// A resolved method: its descriptor and the handler bound to it.
#[derive(Debug)]
pub struct Resolved<'a> {
    descriptor: &'a MethodDescriptor,
    route: &'a Route,
}

impl<'a> Resolved<'a> {
    /// The descriptor of the resolved method.
    pub fn descriptor(&self) -> &'a MethodDescriptor {
        self.descriptor
    }

    pub(crate) fn route(&self) -> &'a Route {
        self.route
    }
}

/// The set of services served on one listener.
#[derive(Debug, Default)]
pub struct Registry {
    // keyed by the request path, "/{service}/{method}"
    routes: HashMap<String, Entry>,
    services: HashMap<String, usize>,
    descriptors: Vec<ServiceDescriptor>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register a service.
    ///
    /// Fails if a name is empty or contains `/`, if a service of the same
    /// name is registered, or if the definition repeats a method name. On
    /// failure the registry is left exactly as it was.
    pub fn register(&mut self, definition: ServiceDefinition) -> Result<(), RegistryError> {
        let ServiceDefinition { descriptor, routes } = definition;

        if !is_valid_name(&descriptor.name) {
            return Err(RegistryError::InvalidName {
                service: descriptor.name,
                method: None,
            });
        }
        if let Some(method) = descriptor.methods.iter().find(|m| !is_valid_name(&m.name)) {
            return Err(RegistryError::InvalidName {
                service: descriptor.name.clone(),
                method: Some(method.name.clone()),
            });
        }

        if self.services.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateService(descriptor.name));
        }

        for (i, method) in descriptor.methods.iter().enumerate() {
            if descriptor.methods[..i].iter().any(|m| m.name == method.name) {
                return Err(RegistryError::DuplicateMethod {
                    service: descriptor.name.clone(),
                    method: method.name.clone(),
                });
            }
        }

        let service = self.descriptors.len();
        for (method, (desc, route)) in descriptor.methods.iter().zip(routes).enumerate() {
            self.routes.insert(
                path(&descriptor.name, &desc.name),
                Entry {
                    service,
                    method,
                    route,
                },
            );
        }

        debug!(
            service = %descriptor.name,
            methods = descriptor.methods.len(),
            "registered service"
        );
        self.services.insert(descriptor.name.clone(), service);
        self.descriptors.push(descriptor);

        Ok(())
    }

    /// Find the handler for `method` of `service`.
    pub fn resolve(&self, service: &str, method: &str) -> Result<Resolved<'_>, RegistryError> {
        match self.routes.get(&path(service, method)) {
            Some(entry) => Ok(Resolved {
                descriptor: &self.descriptors[entry.service].methods[entry.method],
                route: &entry.route,
            }),
            None if self.services.contains_key(service) => Err(RegistryError::UnknownMethod {
                service: service.to_owned(),
                method: method.to_owned(),
            }),
            None => Err(RegistryError::UnknownService(service.to_owned())),
        }
    }

    /// Every registered service, in registration order.
    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.descriptors
    }

    /// Look up a registered service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name).map(|&i| &self.descriptors[i])
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if no service is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

// each name is one path segment, so distinct pairs never share a path
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}

fn path(service: &str, method: &str) -> String {
    format!("/{}/{}", service, method)
}
