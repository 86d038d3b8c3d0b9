//! Endpoint service and consumer endpoint: the private link itself.
//!
//! The pair brokers reachability from the consumer network to the provider
//! balancer on a single port, with no routing-table peering between the two
//! networks.

use serde::{Deserialize, Serialize};

use super::{Reference, ResourceId, ResourceKind};
use crate::error::DeclarationError;

/// Provider-side facade exposing balancers to other networks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointService {
    /// Resource id.
    pub id: ResourceId,
    /// Balancers fronted by the service.
    pub balancers: Vec<ResourceId>,
    /// Whether each consumer connection waits for manual approval.
    pub acceptance_required: bool,
    /// Whether per-connection metrics are published.
    pub contributor_insights: bool,
}

impl EndpointService {
    pub(crate) fn references(&self) -> Vec<Reference> {
        self.balancers
            .iter()
            .enumerate()
            .map(|(i, b)| {
                Reference::dependency(format!("balancers[{i}]"), b, ResourceKind::LoadBalancer)
            })
            .collect()
    }

    pub(crate) fn validate(&self) -> Result<(), DeclarationError> {
        super::require_non_empty(&self.id, "balancers", &self.balancers)
    }
}

/// Consumer-side attachment point for an endpoint service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerEndpoint {
    /// Resource id.
    pub id: ResourceId,
    /// Network the endpoint's interfaces are placed in.
    pub network: ResourceId,
    /// Service being consumed.
    pub service: ResourceId,
    /// Groups gating local access to the endpoint.
    pub groups: Vec<ResourceId>,
}

impl ConsumerEndpoint {
    pub(crate) fn references(&self) -> Vec<Reference> {
        let mut refs = vec![
            Reference::dependency("network", &self.network, ResourceKind::NetworkSpace),
            Reference::dependency("service", &self.service, ResourceKind::EndpointService),
        ];
        refs.extend(self.groups.iter().enumerate().map(|(i, g)| {
            Reference::local(format!("groups[{i}]"), g, ResourceKind::AccessControlGroup)
        }));
        refs
    }

    pub(crate) fn validate(&self) -> Result<(), DeclarationError> {
        super::require_non_empty(&self.id, "groups", &self.groups)
    }
}

/// Whether a connection request needs a human decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Approval {
    /// Accepted as soon as it is requested.
    Automatic,
    /// Pending until the service owner accepts it.
    Manual,
}

/// The connection a consumer endpoint requests from its service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAttachment {
    pub endpoint: ResourceId,
    pub service: ResourceId,
    pub approval: Approval,
}

impl EndpointAttachment {
    /// Derive the attachment between `endpoint` and the service it names.
    #[must_use]
    pub fn between(endpoint: &ConsumerEndpoint, service: &EndpointService) -> Self {
        Self {
            endpoint: endpoint.id.clone(),
            service: service.id.clone(),
            approval: if service.acceptance_required {
                Approval::Manual
            } else {
                Approval::Automatic
            },
        }
    }

    /// Whether an approval step sits between request and connection.
    #[must_use]
    pub fn requires_manual_approval(&self) -> bool {
        self.approval == Approval::Manual
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(acceptance_required: bool) -> EndpointService {
        EndpointService {
            id: "svc".into(),
            balancers: vec!["nlb".into()],
            acceptance_required,
            contributor_insights: false,
        }
    }

    fn endpoint() -> ConsumerEndpoint {
        ConsumerEndpoint {
            id: "vpce".into(),
            network: "net".into(),
            service: "svc".into(),
            groups: vec!["sg".into()],
        }
    }

    #[test]
    fn test_attachment_approval_follows_acceptance_flag() {
        let auto = EndpointAttachment::between(&endpoint(), &service(false));
        assert_eq!(auto.approval, Approval::Automatic);
        assert!(!auto.requires_manual_approval());

        let manual = EndpointAttachment::between(&endpoint(), &service(true));
        assert!(manual.requires_manual_approval());
    }

    #[test]
    fn test_service_requires_balancer() {
        let svc = EndpointService {
            balancers: Vec::new(),
            ..service(false)
        };
        assert!(svc.validate().is_err());
    }
}
