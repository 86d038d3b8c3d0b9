//! Identity grants attached to compute nodes.

use serde::{Deserialize, Serialize};

use super::{Reference, ResourceId};
use crate::error::DeclarationError;

/// A role: who may assume it and which managed permission bundles it carries.
///
/// Permission bundles are names in the provider's managed catalog; they are
/// not resources of this graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityGrant {
    /// Resource id.
    pub id: ResourceId,
    /// Service principal allowed to assume the grant.
    pub trust_principal: String,
    /// Managed permission bundle names.
    pub managed_policies: Vec<String>,
}

impl IdentityGrant {
    pub(crate) fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    pub(crate) fn validate(&self) -> Result<(), DeclarationError> {
        if self.trust_principal.trim().is_empty() {
            return Err(DeclarationError::invalid_field(
                &self.id,
                "trust_principal",
                "must not be empty",
            ));
        }
        for (i, policy) in self.managed_policies.iter().enumerate() {
            if policy.trim().is_empty() {
                return Err(DeclarationError::invalid_field(
                    &self.id,
                    format!("managed_policies[{i}]"),
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }
}
