//! Layer roles

use std::convert::Infallible;
use std::str::FromStr;

use strum::{Display, EnumIter, IntoStaticStr};

use crate::error::LayerError;

/// Numeric code of the client role
pub const TYPE_CLIENT: u8 = 1;
/// Numeric code of the server role
pub const TYPE_SERVER: u8 = 2;

/// Side of the conversation a layer is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Canonical name, as used in resolved type references
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Name of the capability interface a layer of this role must implement
    pub fn interface(self) -> &'static str {
        match self {
            Self::Client => "ClientLayer",
            Self::Server => "ServerLayer",
        }
    }

    /// Numeric code, [`TYPE_CLIENT`] or [`TYPE_SERVER`]
    pub fn code(self) -> u8 {
        match self {
            Self::Client => TYPE_CLIENT,
            Self::Server => TYPE_SERVER,
        }
    }
}

impl TryFrom<u8> for Role {
    type Error = LayerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            TYPE_CLIENT => Ok(Self::Client),
            TYPE_SERVER => Ok(Self::Server),
            _ => Err(LayerError::InvalidRole(value.to_string())),
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = LayerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case("client") {
            Ok(Self::Client)
        } else if value.eq_ignore_ascii_case("server") {
            Ok(Self::Server)
        } else {
            Err(LayerError::InvalidRole(value.to_string()))
        }
    }
}

impl FromStr for Role {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

// Lets `Role` itself be passed wherever a fallible role conversion is accepted.
impl From<Infallible> for LayerError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_role_codes() {
        assert_eq!(Role::try_from(1u8).unwrap(), Role::Client);
        assert_eq!(Role::try_from(2u8).unwrap(), Role::Server);
        for code in Role::iter().map(Role::code) {
            assert_eq!(Role::try_from(code).unwrap().code(), code);
        }
    }

    #[test]
    fn test_invalid_role_codes() {
        for code in [0u8, 3, 42, u8::MAX] {
            assert!(matches!(
                Role::try_from(code),
                Err(LayerError::InvalidRole(ref v)) if *v == code.to_string()
            ));
        }
    }

    #[test]
    fn test_role_names() {
        assert_eq!(Role::Client.name(), "Client");
        assert_eq!(Role::Server.to_string(), "Server");
        assert_eq!("SERVER".parse::<Role>().unwrap(), Role::Server);
        assert_eq!(Role::try_from("client").unwrap(), Role::Client);
        assert!("peer".parse::<Role>().is_err());
        assert_eq!(Role::Server.interface(), "ServerLayer");
    }
}
