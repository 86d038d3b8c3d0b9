//! Authoring-time errors raised while the resource graph is constructed.

use thiserror::Error;

use crate::cidr::Ipv4Cidr;
use crate::resources::{ResourceId, ResourceKind};

/// Structural errors in a declaration.
///
/// Every variant names the offending descriptor and, where one applies, the
/// field that carries the bad value. These are raised synchronously while
/// the graph is built; nothing has been sent to a reconciler yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    /// Resource id is empty or uses characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid resource id '{id}'")]
    InvalidId { id: String },

    /// Two descriptors share one id.
    #[error("Duplicate resource: {resource}")]
    DuplicateResource { resource: ResourceId },

    /// A field holds a value the descriptor cannot accept.
    #[error("Invalid {resource}.{field}: {reason}")]
    InvalidField {
        resource: ResourceId,
        field: String,
        reason: String,
    },

    /// A subnet does not fit inside its network's range.
    #[error("{resource}.subnets: subnet '{subnet}' ({cidr}) lies outside {range}")]
    SubnetOutsideRange {
        resource: ResourceId,
        subnet: String,
        cidr: Ipv4Cidr,
        range: Ipv4Cidr,
    },

    /// Two subnets of one network share addresses.
    #[error("{resource}.subnets: '{first}' overlaps '{second}'")]
    SubnetOverlap {
        resource: ResourceId,
        first: String,
        second: String,
    },

    /// Two networks share addresses.
    #[error("{resource}.cidr: {cidr} overlaps {other} ({other_cidr})")]
    AddressOverlap {
        resource: ResourceId,
        cidr: Ipv4Cidr,
        other: ResourceId,
        other_cidr: Ipv4Cidr,
    },

    /// A reference names a resource that was never declared.
    #[error("{resource}.{field}: reference to undeclared resource '{target}'")]
    DanglingReference {
        resource: ResourceId,
        field: String,
        target: ResourceId,
    },

    /// A reference resolves, but to the wrong kind of resource.
    #[error("{resource}.{field}: '{target}' is a {found}, expected a {expected}")]
    WrongKind {
        resource: ResourceId,
        field: String,
        target: ResourceId,
        expected: ResourceKind,
        found: ResourceKind,
    },

    /// A reference crosses into a different network than the descriptor's own.
    #[error("{resource}.{field}: '{target}' belongs to a different network")]
    NetworkMismatch {
        resource: ResourceId,
        field: String,
        target: ResourceId,
    },

    /// The reference graph has a cycle through this resource.
    #[error("Cyclic reference through {resource}")]
    Cycle { resource: ResourceId },

    /// A configuration value failed validation.
    #[error("Invalid configuration {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// No machine image is mapped for the configured region.
    #[error("{resource}.image: no image mapped for region '{region}'")]
    MissingImage { resource: ResourceId, region: String },
}

impl DeclarationError {
    pub(crate) fn invalid_field(
        resource: &ResourceId,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            resource: resource.clone(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
