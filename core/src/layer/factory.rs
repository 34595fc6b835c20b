//! Layer registry and factory

use std::collections::HashMap;
use std::fmt;

use log::*;

use super::resolver::Resolver;
use crate::client::ClientLayer;
use crate::error::LayerError;
use crate::json;
use crate::options::LayerOptions;
use crate::role::Role;
use crate::server::ServerLayer;

pub type ClientConstructor =
    Box<dyn Fn(LayerOptions) -> anyhow::Result<Box<dyn ClientLayer>> + Send + Sync>;
pub type ServerConstructor =
    Box<dyn Fn(LayerOptions) -> anyhow::Result<Box<dyn ServerLayer>> + Send + Sync>;

/// A registered constructor. The variant is the capability the constructor was verified
/// to provide when it was registered.
enum Constructor {
    Client(ClientConstructor),
    Server(ServerConstructor),
}

impl Constructor {
    fn role(&self) -> Role {
        match self {
            Self::Client(_) => Role::Client,
            Self::Server(_) => Role::Server,
        }
    }
}

/// A constructed layer
pub enum Layer {
    Client(Box<dyn ClientLayer>),
    Server(Box<dyn ServerLayer>),
}

impl Layer {
    pub fn role(&self) -> Role {
        match self {
            Self::Client(_) => Role::Client,
            Self::Server(_) => Role::Server,
        }
    }

    pub fn into_client(self) -> Option<Box<dyn ClientLayer>> {
        match self {
            Self::Client(layer) => Some(layer),
            Self::Server(_) => None,
        }
    }

    pub fn into_server(self) -> Option<Box<dyn ServerLayer>> {
        match self {
            Self::Server(layer) => Some(layer),
            Self::Client(_) => None,
        }
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Layer::{}", self.role())
    }
}

/// Registry of layer constructors keyed by type reference.
///
/// There is no global registry; construct one (usually with [`LayerRegistry::with_builtins`])
/// and pass it to whoever needs layers.
pub struct LayerRegistry {
    resolver: Resolver,
    constructors: HashMap<String, Constructor>,
}

impl Default for LayerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl LayerRegistry {
    /// Creates an empty registry
    pub fn new(resolver: Resolver) -> Self {
        Self {
            resolver,
            constructors: HashMap::new(),
        }
    }

    /// Creates a registry holding the built-in JSON client and server layers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new(Resolver::default());
        registry.register_client_format(json::FORMAT_NAME, json::client_layer);
        registry.register_server_format(json::FORMAT_NAME, json::server_layer);
        registry
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Registers a client layer constructor under a full type reference
    pub fn register_client<F>(&mut self, type_ref: impl Into<String>, constructor: F)
    where
        F: Fn(LayerOptions) -> anyhow::Result<Box<dyn ClientLayer>> + Send + Sync + 'static,
    {
        self.insert(type_ref.into(), Constructor::Client(Box::new(constructor)));
    }

    /// Registers a server layer constructor under a full type reference
    pub fn register_server<F>(&mut self, type_ref: impl Into<String>, constructor: F)
    where
        F: Fn(LayerOptions) -> anyhow::Result<Box<dyn ServerLayer>> + Send + Sync + 'static,
    {
        self.insert(type_ref.into(), Constructor::Server(Box::new(constructor)));
    }

    /// Registers a client layer for a format name, under the naming convention
    pub fn register_client_format<F>(&mut self, format: &str, constructor: F)
    where
        F: Fn(LayerOptions) -> anyhow::Result<Box<dyn ClientLayer>> + Send + Sync + 'static,
    {
        let type_ref = self.resolver.target(format, Role::Client);
        self.register_client(type_ref, constructor);
    }

    /// Registers a server layer for a format name, under the naming convention
    pub fn register_server_format<F>(&mut self, format: &str, constructor: F)
    where
        F: Fn(LayerOptions) -> anyhow::Result<Box<dyn ServerLayer>> + Send + Sync + 'static,
    {
        let type_ref = self.resolver.target(format, Role::Server);
        self.register_server(type_ref, constructor);
    }

    fn insert(&mut self, type_ref: String, constructor: Constructor) {
        debug!("Registering {} layer {}", constructor.role(), type_ref);
        if let Some(previous) = self.constructors.insert(type_ref.clone(), constructor) {
            warn!(
                "Replaced previously registered {} layer {}",
                previous.role(),
                type_ref
            );
        }
    }

    pub fn contains(&self, type_ref: &str) -> bool {
        self.constructors.contains_key(type_ref)
    }

    /// Registered type references, sorted
    pub fn type_refs(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        refs.sort_unstable();
        refs
    }

    /// See [`get_layer`]
    pub fn get_layer<R>(
        &self,
        identifier: &str,
        role: R,
        options: LayerOptions,
    ) -> Result<Layer, LayerError>
    where
        R: TryInto<Role>,
        LayerError: From<R::Error>,
    {
        get_layer(self, identifier, role, options)
    }

    /// Builds a client layer
    pub fn client(
        &self,
        identifier: &str,
        options: LayerOptions,
    ) -> Result<Box<dyn ClientLayer>, LayerError> {
        match get_layer(self, identifier, Role::Client, options)? {
            Layer::Client(layer) => Ok(layer),
            Layer::Server(_) => unreachable!("contract checked by get_layer"),
        }
    }

    /// Builds a server layer
    pub fn server(
        &self,
        identifier: &str,
        options: LayerOptions,
    ) -> Result<Box<dyn ServerLayer>, LayerError> {
        match get_layer(self, identifier, Role::Server, options)? {
            Layer::Server(layer) => Ok(layer),
            Layer::Client(_) => unreachable!("contract checked by get_layer"),
        }
    }
}

/// Returns the layer registered for `identifier` and `role`, constructed with `options`.
///
/// Fails with
/// * [`LayerError::InvalidRole`] if `role` does not convert to a [`Role`]; nothing is
///   constructed,
/// * [`LayerError::LayerNotFound`] if nothing is registered under the resolved type
///   reference, or if its constructor fails,
/// * [`LayerError::ContractViolation`] if the registered layer serves the other role;
///   nothing is constructed.
pub fn get_layer<R>(
    registry: &LayerRegistry,
    identifier: &str,
    role: R,
    options: LayerOptions,
) -> Result<Layer, LayerError>
where
    R: TryInto<Role>,
    LayerError: From<R::Error>,
{
    let role = role.try_into()?;
    let target = registry.resolver.target(identifier, role);

    let Some(constructor) = registry.constructors.get(&target) else {
        return Err(LayerError::LayerNotFound {
            target,
            reason: "no layer registered under this name".to_string(),
        });
    };

    if constructor.role() != role {
        return Err(LayerError::ContractViolation {
            type_ref: target,
            interface: role.interface(),
        });
    }

    debug!("Constructing {} layer {} for '{}'", role, target, identifier);
    let layer = match constructor {
        Constructor::Client(ctor) => ctor(options).map(Layer::Client),
        Constructor::Server(ctor) => ctor(options).map(Layer::Server),
    };

    layer.map_err(|e| LayerError::LayerNotFound {
        reason: format!("construction failed: {:#}", e),
        target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{Server, handler};
    use crate::{Incoming, JsonCodec};
    use anyhow::bail;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_registry(count: &Arc<AtomicUsize>) -> LayerRegistry {
        let mut registry = LayerRegistry::new(Resolver::default());
        let c = count.clone();
        registry.register_server_format("JSON", move |options| {
            c.fetch_add(1, Ordering::SeqCst);
            json::server_layer(options)
        });
        registry
    }

    #[test]
    fn test_builtins() {
        let registry = LayerRegistry::with_builtins();
        assert_eq!(
            registry.type_refs(),
            ["rpc_layer::rpc::Client::JSON", "rpc_layer::rpc::Server::JSON"]
        );

        let layer = registry
            .get_layer("JSON", Role::Server, LayerOptions::new())
            .unwrap();
        assert_eq!(layer.role(), Role::Server);
        assert!(layer.into_client().is_none());

        let layer = registry
            .get_layer("JSON", 1u8, LayerOptions::new())
            .unwrap();
        assert_eq!(layer.role(), Role::Client);
    }

    #[test]
    fn test_invalid_role_constructs_nothing() {
        let count = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(&count);

        for code in [0u8, 3, 255] {
            assert!(matches!(
                registry.get_layer("JSON", code, LayerOptions::new()),
                Err(LayerError::InvalidRole(_))
            ));
        }
        assert!(matches!(
            registry.get_layer("JSON", "proxy", LayerOptions::new()),
            Err(LayerError::InvalidRole(_))
        ));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        registry.server("JSON", LayerOptions::new()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_layer_not_found() {
        let registry = LayerRegistry::with_builtins();
        match registry.get_layer("XML", Role::Client, LayerOptions::new()) {
            Err(LayerError::LayerNotFound { target, .. }) => {
                assert_eq!(target, "rpc_layer::rpc::Client::XML");
            }
            other => panic!("unexpected {:?}", other),
        }
        // Format names are case-sensitive
        assert!(matches!(
            registry.get_layer("json", Role::Server, LayerOptions::new()),
            Err(LayerError::LayerNotFound { .. })
        ));
    }

    #[test]
    fn test_construction_failure() {
        let mut registry = LayerRegistry::with_builtins();
        registry.register_server("acme::Broken", |_| bail!("missing certificate"));

        match registry.get_layer("acme::Broken", Role::Server, LayerOptions::new()) {
            Err(LayerError::LayerNotFound { target, reason }) => {
                assert_eq!(target, "acme::Broken");
                assert!(reason.contains("missing certificate"));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Bad client option rejected by the JSON client constructor
        let options = LayerOptions::new().with("timeout_ms", "soon");
        assert!(matches!(
            registry.get_layer("JSON", Role::Client, options),
            Err(LayerError::LayerNotFound { .. })
        ));
    }

    #[test]
    fn test_contract_violation() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut registry = LayerRegistry::with_builtins();
        let c = count.clone();
        registry.register_server("acme::Json", move |options| {
            c.fetch_add(1, Ordering::SeqCst);
            json::server_layer(options)
        });

        let err = registry
            .get_layer("acme::Json", Role::Client, LayerOptions::new())
            .unwrap_err();
        match &err {
            LayerError::ContractViolation {
                type_ref,
                interface,
            } => {
                assert_eq!(type_ref, "acme::Json");
                assert_eq!(*interface, "ClientLayer");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "Class acme::Json does not implement ClientLayer interface"
        );
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_custom_layer_with_options() {
        let mut registry = LayerRegistry::with_builtins();
        registry.register_server("acme::Lenient", |options| {
            let mut server = Server::new(JsonCodec, options);
            server.bind("ping", handler(|_| Ok(json!("pong"))));
            Ok(Box::new(server))
        });

        let options = LayerOptions::new().with(json::OPTION_STRICT_VERSION, false);
        let mut server = registry.server("acme::Lenient", options).unwrap();
        let response = server
            .execute(
                &Incoming::new(r#"{"method":"ping","id":1}"#),
                LayerOptions::new(),
                false,
            )
            .unwrap();
        assert!(response.contains("pong"));
    }

    #[test]
    fn test_custom_base() {
        let mut registry = LayerRegistry::new(Resolver::new("acme"));
        registry.register_server_format("JSON", json::server_layer);
        assert!(registry.contains("acme::Server::JSON"));
        assert!(registry.server("JSON", LayerOptions::new()).is_ok());
    }
}
