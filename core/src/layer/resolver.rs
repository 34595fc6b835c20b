//! Identifier to type reference resolution

use crate::error::LayerError;
use crate::role::Role;

/// Token that marks an identifier as fully qualified
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Namespace the built-in layers are registered under
pub const DEFAULT_BASE: &str = "rpc_layer::rpc";

/// Maps a layer identifier and a role to the type reference a registry is keyed by.
///
/// Plain format names follow the `<base>::<Role>::<format>` convention. Identifiers that
/// already contain [`NAMESPACE_SEPARATOR`] are taken verbatim, which is how third-party
/// layers are plugged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolver {
    base: String,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_BASE)
    }
}

impl Resolver {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Namespace prepended to plain format names
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn is_custom(identifier: &str) -> bool {
        identifier.contains(NAMESPACE_SEPARATOR)
    }

    /// Resolves `identifier` for `role`, failing with [`LayerError::InvalidRole`] before
    /// looking at the identifier if the role is not valid.
    pub fn resolve<R>(&self, identifier: &str, role: R) -> Result<String, LayerError>
    where
        R: TryInto<Role>,
        LayerError: From<R::Error>,
    {
        let role = role.try_into()?;
        Ok(self.target(identifier, role))
    }

    /// Type reference for an already validated role
    pub fn target(&self, identifier: &str, role: Role) -> String {
        if Self::is_custom(identifier) {
            identifier.to_string()
        } else {
            [self.base.as_str(), role.name(), identifier].join(NAMESPACE_SEPARATOR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_convention() {
        let resolver = Resolver::default();
        assert_eq!(resolver.base(), DEFAULT_BASE);
        assert_eq!(
            resolver.resolve("JSON", Role::Client).unwrap(),
            "rpc_layer::rpc::Client::JSON"
        );
        assert_eq!(
            resolver.resolve("JSON", Role::Server).unwrap(),
            "rpc_layer::rpc::Server::JSON"
        );
    }

    #[test]
    fn test_roles_differ_only_in_role_segment() {
        let resolver = Resolver::new("acme::transport");
        for format in ["JSON", "XML", "MsgPack", "json"] {
            let client = resolver.target(format, Role::Client);
            let server = resolver.target(format, Role::Server);
            assert_eq!(client.replacen("::Client::", "::Server::", 1), server);
            for role in Role::iter() {
                assert_eq!(
                    resolver.target(format, role),
                    format!("acme::transport::{}::{}", role, format)
                );
            }
        }
    }

    #[test]
    fn test_custom_identifier_verbatim() {
        let resolver = Resolver::default();
        for role in Role::iter() {
            assert_eq!(
                resolver.resolve("my_crate::rpc::Msgpack", role).unwrap(),
                "my_crate::rpc::Msgpack"
            );
        }
        assert!(Resolver::is_custom("::Rooted"));
        assert!(!Resolver::is_custom("JSON"));
    }

    #[test]
    fn test_invalid_role() {
        let resolver = Resolver::default();
        assert!(matches!(
            resolver.resolve("JSON", 0u8),
            Err(LayerError::InvalidRole(_))
        ));
        assert!(matches!(
            resolver.resolve("my::Custom", "peer"),
            Err(LayerError::InvalidRole(_))
        ));
        assert_eq!(
            resolver.resolve("JSON", 2u8).unwrap(),
            "rpc_layer::rpc::Server::JSON"
        );
    }
}
