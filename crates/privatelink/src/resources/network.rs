//! Isolated virtual networks and their subnets.

use serde::{Deserialize, Serialize};

use super::{Reference, ResourceId};
use crate::cidr::Ipv4Cidr;
use crate::error::DeclarationError;

/// Subnet routing visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Routed to the internet gateway.
    Public,
    /// No route to the internet.
    Private,
}

/// A sub-range of a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    /// Subnet name, unique within its network.
    pub name: String,
    /// Address range, inside the network's range.
    pub cidr: Ipv4Cidr,
    /// Routing visibility.
    pub visibility: Visibility,
}

/// An isolated virtual network with its own address range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpace {
    /// Resource id.
    pub id: ResourceId,
    /// Address range. Must not overlap any other network in the graph.
    pub cidr: Ipv4Cidr,
    /// Subnets carved out of `cidr`.
    pub subnets: Vec<Subnet>,
    /// Whether an internet gateway is attached.
    pub internet_gateway: bool,
    /// Availability zones the network may span.
    pub max_azs: u8,
}

impl NetworkSpace {
    /// A network with a single public subnet: the first `subnet_prefix`
    /// block of `cidr`, with an internet gateway, spanning at most
    /// `max_azs` availability zones.
    ///
    /// # Errors
    ///
    /// Returns an error if `subnet_prefix` cannot be carved out of `cidr`.
    pub fn single_public_subnet(
        id: impl Into<ResourceId>,
        cidr: Ipv4Cidr,
        subnet_name: &str,
        subnet_prefix: u8,
        max_azs: u8,
    ) -> Result<Self, DeclarationError> {
        let id = id.into();
        let subnet_cidr = cidr.subnet(subnet_prefix, 0).ok_or_else(|| {
            DeclarationError::invalid_field(
                &id,
                "subnets",
                format!("cannot carve a /{subnet_prefix} out of {cidr}"),
            )
        })?;
        Ok(Self {
            id,
            cidr,
            subnets: vec![Subnet {
                name: subnet_name.to_string(),
                cidr: subnet_cidr,
                visibility: Visibility::Public,
            }],
            internet_gateway: true,
            max_azs,
        })
    }

    /// Subnets with public visibility.
    pub fn public_subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.subnets
            .iter()
            .filter(|s| s.visibility == Visibility::Public)
    }

    pub(crate) fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    pub(crate) fn validate(&self) -> Result<(), DeclarationError> {
        super::require_non_empty(&self.id, "subnets", &self.subnets)?;
        if self.max_azs == 0 {
            return Err(DeclarationError::invalid_field(
                &self.id,
                "max_azs",
                "at least one availability zone is required",
            ));
        }

        for (i, subnet) in self.subnets.iter().enumerate() {
            if subnet.name.trim().is_empty() {
                return Err(DeclarationError::invalid_field(
                    &self.id,
                    format!("subnets[{i}].name"),
                    "must not be empty",
                ));
            }
            if !self.cidr.contains(&subnet.cidr) {
                return Err(DeclarationError::SubnetOutsideRange {
                    resource: self.id.clone(),
                    subnet: subnet.name.clone(),
                    cidr: subnet.cidr,
                    range: self.cidr,
                });
            }
            if subnet.visibility == Visibility::Public && !self.internet_gateway {
                return Err(DeclarationError::invalid_field(
                    &self.id,
                    format!("subnets[{i}].visibility"),
                    "public subnet requires an internet gateway",
                ));
            }
            for other in &self.subnets[..i] {
                if other.name == subnet.name {
                    return Err(DeclarationError::invalid_field(
                        &self.id,
                        format!("subnets[{i}].name"),
                        format!("duplicate subnet name '{}'", subnet.name),
                    ));
                }
                if other.cidr.overlaps(&subnet.cidr) {
                    return Err(DeclarationError::SubnetOverlap {
                        resource: self.id.clone(),
                        first: other.name.clone(),
                        second: subnet.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(subnets: Vec<Subnet>, internet_gateway: bool) -> NetworkSpace {
        NetworkSpace {
            id: "net".into(),
            cidr: "10.0.0.0/24".parse().unwrap(),
            subnets,
            internet_gateway,
            max_azs: 1,
        }
    }

    fn subnet(name: &str, cidr: &str, visibility: Visibility) -> Subnet {
        Subnet {
            name: name.into(),
            cidr: cidr.parse().unwrap(),
            visibility,
        }
    }

    #[test]
    fn test_single_public_subnet() {
        let net = NetworkSpace::single_public_subnet(
            "net",
            "192.168.0.0/24".parse().unwrap(),
            "compute",
            28,
            1,
        )
        .unwrap();
        assert!(net.internet_gateway);
        assert_eq!(net.max_azs, 1);
        assert_eq!(net.subnets.len(), 1);
        assert_eq!(net.subnets[0].cidr.to_string(), "192.168.0.0/28");
        assert_eq!(net.public_subnets().count(), 1);
        assert!(net.validate().is_ok());
    }

    #[test]
    fn test_single_public_subnet_rejects_wider_prefix() {
        let err = NetworkSpace::single_public_subnet(
            "net",
            "10.0.0.0/24".parse().unwrap(),
            "compute",
            20,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidField { ref field, .. } if field == "subnets"));
    }

    #[test]
    fn test_zero_availability_zones_rejected() {
        let net = NetworkSpace {
            max_azs: 0,
            ..network(vec![subnet("a", "10.0.0.0/28", Visibility::Public)], true)
        };
        assert!(matches!(
            net.validate(),
            Err(DeclarationError::InvalidField { ref field, .. }) if field == "max_azs"
        ));
    }

    #[test]
    fn test_subnet_outside_range() {
        let net = network(vec![subnet("a", "10.0.1.0/28", Visibility::Public)], true);
        assert!(matches!(
            net.validate(),
            Err(DeclarationError::SubnetOutsideRange { .. })
        ));
    }

    #[test]
    fn test_overlapping_subnets() {
        let net = network(
            vec![
                subnet("a", "10.0.0.0/27", Visibility::Private),
                subnet("b", "10.0.0.16/28", Visibility::Private),
            ],
            false,
        );
        assert_eq!(
            net.validate(),
            Err(DeclarationError::SubnetOverlap {
                resource: "net".into(),
                first: "a".into(),
                second: "b".into(),
            })
        );
    }

    #[test]
    fn test_public_subnet_needs_gateway() {
        let net = network(vec![subnet("a", "10.0.0.0/28", Visibility::Public)], false);
        assert!(matches!(
            net.validate(),
            Err(DeclarationError::InvalidField { ref field, .. }) if field == "subnets[0].visibility"
        ));
    }
}
