//! Resource descriptors.
//!
//! A descriptor is a plain record of typed fields. Relationships between
//! descriptors are expressed as [`ResourceId`] values, never as pointers, so
//! the graph can be resolved and checked in one lookup pass.

pub mod access;
pub mod balancing;
pub mod compute;
pub mod connectivity;
pub mod identity;
pub mod network;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DeclarationError;

pub use access::{AccessControlGroup, AccessRule, Direction, Peer, Protocol};
pub use balancing::{
    DefaultAction, ForwardingRule, HealthCheck, HealthCheckProtocol, LoadBalancer,
    PrivateLinkTraffic, TargetPool, TargetType,
};
pub use compute::{ComputeNode, MachineImage, StartupScript};
pub use connectivity::{Approval, ConsumerEndpoint, EndpointAttachment, EndpointService};
pub use identity::IdentityGrant;
pub use network::{NetworkSpace, Subnet, Visibility};

/// Stack-unique name of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Create an id. Format is checked when the descriptor enters a graph.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is non-empty and limited to `[A-Za-z0-9_-]`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Kind of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    NetworkSpace,
    AccessControlGroup,
    IdentityGrant,
    ComputeNode,
    LoadBalancer,
    TargetPool,
    ForwardingRule,
    EndpointService,
    ConsumerEndpoint,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkSpace => write!(f, "network_space"),
            Self::AccessControlGroup => write!(f, "access_control_group"),
            Self::IdentityGrant => write!(f, "identity_grant"),
            Self::ComputeNode => write!(f, "compute_node"),
            Self::LoadBalancer => write!(f, "load_balancer"),
            Self::TargetPool => write!(f, "target_pool"),
            Self::ForwardingRule => write!(f, "forwarding_rule"),
            Self::EndpointService => write!(f, "endpoint_service"),
            Self::ConsumerEndpoint => write!(f, "consumer_endpoint"),
        }
    }
}

/// A named reference from one descriptor field to another descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Field path on the referencing descriptor, e.g. `rules[1].peer`.
    pub field: String,
    /// Referenced descriptor.
    pub target: ResourceId,
    /// Kind the target must have.
    pub expected: ResourceKind,
    /// Whether the target must be applied before the referencing descriptor.
    pub ordering: bool,
    /// Whether the target must live in the referencing descriptor's network.
    pub same_network: bool,
}

impl Reference {
    /// An ordering dependency.
    pub(crate) fn dependency(
        field: impl Into<String>,
        target: &ResourceId,
        expected: ResourceKind,
    ) -> Self {
        Self {
            field: field.into(),
            target: target.clone(),
            expected,
            ordering: true,
            same_network: false,
        }
    }

    /// An ordering dependency that must also share the owner's network.
    pub(crate) fn local(
        field: impl Into<String>,
        target: &ResourceId,
        expected: ResourceKind,
    ) -> Self {
        Self {
            same_network: true,
            ..Self::dependency(field, target, expected)
        }
    }

    /// A same-network association that does not constrain apply order.
    pub(crate) fn peer(field: impl Into<String>, target: &ResourceId, expected: ResourceKind) -> Self {
        Self {
            ordering: false,
            ..Self::local(field, target, expected)
        }
    }
}

/// Any descriptor in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
    NetworkSpace(NetworkSpace),
    AccessControlGroup(AccessControlGroup),
    IdentityGrant(IdentityGrant),
    ComputeNode(ComputeNode),
    LoadBalancer(LoadBalancer),
    TargetPool(TargetPool),
    ForwardingRule(ForwardingRule),
    EndpointService(EndpointService),
    ConsumerEndpoint(ConsumerEndpoint),
}

macro_rules! resource_variants {
    ($($variant:ident => $accessor:ident),* $(,)?) => {
        impl Resource {
            /// Descriptor id.
            #[must_use]
            pub fn id(&self) -> &ResourceId {
                match self {
                    $(Self::$variant(r) => &r.id,)*
                }
            }

            /// Descriptor kind.
            #[must_use]
            pub fn kind(&self) -> ResourceKind {
                match self {
                    $(Self::$variant(_) => ResourceKind::$variant,)*
                }
            }

            /// References to other descriptors, in field order.
            #[must_use]
            pub fn references(&self) -> Vec<Reference> {
                match self {
                    $(Self::$variant(r) => r.references(),)*
                }
            }

            /// Check the descriptor's own fields, without looking at the graph.
            ///
            /// # Errors
            ///
            /// Returns the first field that fails validation.
            pub fn validate(&self) -> Result<(), DeclarationError> {
                match self {
                    $(Self::$variant(r) => r.validate(),)*
                }
            }

            $(
                #[must_use]
                pub fn $accessor(&self) -> Option<&$variant> {
                    match self {
                        Self::$variant(r) => Some(r),
                        _ => None,
                    }
                }
            )*
        }

        $(
            impl From<$variant> for Resource {
                fn from(value: $variant) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

resource_variants! {
    NetworkSpace => as_network_space,
    AccessControlGroup => as_access_control_group,
    IdentityGrant => as_identity_grant,
    ComputeNode => as_compute_node,
    LoadBalancer => as_load_balancer,
    TargetPool => as_target_pool,
    ForwardingRule => as_forwarding_rule,
    EndpointService => as_endpoint_service,
    ConsumerEndpoint => as_consumer_endpoint,
}

impl Resource {
    /// Network the descriptor lives in, if it is network-scoped.
    ///
    /// A network space is its own network.
    #[must_use]
    pub fn network(&self) -> Option<&ResourceId> {
        match self {
            Self::NetworkSpace(r) => Some(&r.id),
            Self::AccessControlGroup(r) => Some(&r.network),
            Self::ComputeNode(r) => Some(&r.network),
            Self::LoadBalancer(r) => Some(&r.network),
            Self::TargetPool(r) => Some(&r.network),
            Self::ConsumerEndpoint(r) => Some(&r.network),
            Self::IdentityGrant(_) | Self::ForwardingRule(_) | Self::EndpointService(_) => None,
        }
    }
}

/// Reject an empty list field.
pub(crate) fn require_non_empty<T>(
    id: &ResourceId,
    field: &str,
    items: &[T],
) -> Result<(), DeclarationError> {
    if items.is_empty() {
        return Err(DeclarationError::invalid_field(id, field, "must not be empty"));
    }
    Ok(())
}

/// Reject a zero port.
pub(crate) fn require_port(id: &ResourceId, field: &str, port: u16) -> Result<(), DeclarationError> {
    if port == 0 {
        return Err(DeclarationError::invalid_field(id, field, "port must be in 1..=65535"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_validity() {
        assert!(ResourceId::new("consumer-network").is_valid());
        assert!(ResourceId::new("sg_1").is_valid());
        assert!(!ResourceId::new("").is_valid());
        assert!(!ResourceId::new("has space").is_valid());
        assert!(!ResourceId::new("a/b").is_valid());
    }

    #[test]
    fn test_kind_display_matches_serde() {
        let kind = ResourceKind::AccessControlGroup;
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, format!("\"{kind}\""));
    }
}
