//! Who this node is.

use serde::{Deserialize, Serialize};
use tandem_types::NodeId;

/// Display information about a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Human readable name.
    pub display_name: String,
    /// Avatar image reference, if any.
    pub avatar: Option<String>,
}

/// Source of the local node's identity, typically an auth session.
pub trait IdentityProvider: Send + Sync {
    /// The authenticated node id.
    fn node_id(&self) -> &NodeId;

    /// The local profile.
    fn profile(&self) -> Profile;
}

/// A fixed identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity {
    node: NodeId,
    profile: Profile,
}

impl StaticIdentity {
    /// An identity with the node id doubling as the display name.
    pub fn new(node: NodeId) -> Self {
        let profile = Profile {
            display_name: node.to_string(),
            avatar: None,
        };
        Self { node, profile }
    }

    /// Replace the profile.
    #[must_use]
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }
}

impl IdentityProvider for StaticIdentity {
    fn node_id(&self) -> &NodeId {
        &self.node
    }

    fn profile(&self) -> Profile {
        self.profile.clone()
    }
}
