//! Identifier types.
//!
//! [`NodeId`] names one of the two paired peers. It is supplied by the
//! identity provider (typically an auth uid), so it is an opaque string
//! rather than a UUID. It only ever serves as the final tie-break in
//! timestamp ordering and as the `origin` of events.
//!
//! Relay-side identifiers that the system generates itself are type-safe
//! UUID v7 wrappers.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Error returned when a node identifier is empty.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("node id must not be empty")]
pub struct EmptyNodeId;

/// Stable identifier of one peer in a paired session.
///
/// Always non-empty. Ordering is lexicographic on the underlying string,
/// which is what the hybrid clock uses as its last-resort tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(try_from = "String", into = "String")]
#[ts(export, export_to = "bindings/")]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id, rejecting the empty string.
    pub fn new(id: impl Into<String>) -> Result<Self, EmptyNodeId> {
        let id = id.into();
        if id.is_empty() {
            return Err(EmptyNodeId);
        }
        Ok(Self(id))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for NodeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NodeId {
    type Error = EmptyNodeId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Identifier of a single WebSocket connection held by the relay.
    ConnectionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_node_id_is_rejected() {
        assert_eq!(NodeId::new(""), Err(EmptyNodeId));
    }

    #[test]
    fn node_id_serializes_as_plain_string() {
        let id = NodeId::new("uid-alice").ok();
        let json = id.as_ref().and_then(|id| serde_json::to_string(id).ok());
        assert_eq!(json.as_deref(), Some("\"uid-alice\""));
    }

    #[test]
    fn node_id_deserialize_rejects_empty() {
        let restored: Result<NodeId, _> = serde_json::from_str("\"\"");
        assert!(restored.is_err());
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }
}
