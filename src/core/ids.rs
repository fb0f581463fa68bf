//! Identifiers
//!
//! String identifier newtypes and the sequential id supply that mints them.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create from anything string-like.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow as str.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Entity identifier (generator-assigned or externally supplied).
    EntityId
);

string_id!(
    /// Connected client identifier, assigned by the transport.
    ClientId
);

string_id!(
    /// Room (session) identifier, assigned by the directory.
    RoomId
);

/// Strictly increasing string id generator.
///
/// Yields "1", "2", ... and starts over at "1" after [`IdSupply::reset`].
/// Owners reset only once no id from the previous epoch is referenced.
#[derive(Debug, Default, Clone)]
pub struct IdSupply {
    current: u64,
}

impl IdSupply {
    /// Create a fresh supply.
    pub const fn new() -> Self {
        Self { current: 0 }
    }

    /// Produce the next identifier.
    pub fn next_id(&mut self) -> String {
        self.current += 1;
        self.current.to_string()
    }

    /// Last identifier handed out (0 if none in this epoch).
    pub fn current(&self) -> u64 {
        self.current
    }

    /// Start a new epoch.
    pub fn reset(&mut self) {
        self.current = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase() {
        let mut ids = IdSupply::new();
        assert_eq!(ids.next_id(), "1");
        assert_eq!(ids.next_id(), "2");
        assert_eq!(ids.next_id(), "3");
        assert_eq!(ids.current(), 3);
    }

    #[test]
    fn test_reset_restarts_at_one() {
        let mut ids = IdSupply::new();
        ids.next_id();
        ids.next_id();
        ids.reset();
        assert_eq!(ids.next_id(), "1");
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = EntityId::new("42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"42\"");
        let back: EntityId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(back, id);
    }
}
