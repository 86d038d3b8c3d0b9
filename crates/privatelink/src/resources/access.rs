//! Stateful allow-list groups.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Reference, ResourceId, ResourceKind};
use crate::cidr::Ipv4Cidr;
use crate::error::DeclarationError;

/// Traffic direction, seen from the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Transport protocol a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Udp => write!(f, "udp"),
        }
    }
}

/// The other side of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    /// Members of another group in the same network.
    Group(ResourceId),
    /// An explicit external address range.
    Range(Ipv4Cidr),
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group(id) => write!(f, "group:{id}"),
            Self::Range(cidr) => write!(f, "{cidr}"),
        }
    }
}

/// One explicit, unidirectional allow rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub direction: Direction,
    pub peer: Peer,
    pub protocol: Protocol,
    pub port: u16,
}

impl AccessRule {
    /// Allow inbound TCP on `port` from `peer`.
    #[must_use]
    pub fn inbound_tcp(peer: Peer, port: u16) -> Self {
        Self {
            direction: Direction::Inbound,
            peer,
            protocol: Protocol::Tcp,
            port,
        }
    }

    /// Allow outbound TCP on `port` to `peer`.
    #[must_use]
    pub fn outbound_tcp(peer: Peer, port: u16) -> Self {
        Self {
            direction: Direction::Outbound,
            peer,
            protocol: Protocol::Tcp,
            port,
        }
    }
}

impl fmt::Display for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (verb, prep) = match self.direction {
            Direction::Inbound => ("allow in", "from"),
            Direction::Outbound => ("allow out", "to"),
        };
        write!(f, "{verb} {}/{} {prep} {}", self.protocol, self.port, self.peer)
    }
}

/// A stateful, attachable allow-list of traffic rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlGroup {
    /// Resource id.
    pub id: ResourceId,
    /// Owning network.
    pub network: ResourceId,
    /// Whether all outbound traffic is allowed without explicit rules.
    pub allow_all_outbound: bool,
    /// Allow rules, in declaration order.
    pub rules: Vec<AccessRule>,
}

impl AccessControlGroup {
    /// An empty group.
    #[must_use]
    pub fn new(id: impl Into<ResourceId>, network: &ResourceId, allow_all_outbound: bool) -> Self {
        Self {
            id: id.into(),
            network: network.clone(),
            allow_all_outbound,
            rules: Vec::new(),
        }
    }

    /// Append an allow rule.
    #[must_use]
    pub fn with_rule(mut self, rule: AccessRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rules matching `direction`.
    pub fn rules_in(&self, direction: Direction) -> impl Iterator<Item = &AccessRule> {
        self.rules.iter().filter(move |r| r.direction == direction)
    }

    pub(crate) fn references(&self) -> Vec<Reference> {
        let mut refs = vec![Reference::dependency(
            "network",
            &self.network,
            ResourceKind::NetworkSpace,
        )];
        for (i, rule) in self.rules.iter().enumerate() {
            if let Peer::Group(peer) = &rule.peer {
                refs.push(Reference::peer(
                    format!("rules[{i}].peer"),
                    peer,
                    ResourceKind::AccessControlGroup,
                ));
            }
        }
        refs
    }

    pub(crate) fn validate(&self) -> Result<(), DeclarationError> {
        for (i, rule) in self.rules.iter().enumerate() {
            super::require_port(&self.id, &format!("rules[{i}].port"), rule.port)?;
            if rule.direction == Direction::Outbound && self.allow_all_outbound {
                return Err(DeclarationError::invalid_field(
                    &self.id,
                    format!("rules[{i}]"),
                    "outbound rule is redundant when all outbound traffic is allowed",
                ));
            }
            if rule.peer == Peer::Group(self.id.clone()) {
                return Err(DeclarationError::invalid_field(
                    &self.id,
                    format!("rules[{i}].peer"),
                    "group cannot name itself as peer",
                ));
            }
            if self.rules[..i].contains(rule) {
                return Err(DeclarationError::invalid_field(
                    &self.id,
                    format!("rules[{i}]"),
                    format!("duplicate rule '{rule}'"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(allow_all_outbound: bool) -> AccessControlGroup {
        AccessControlGroup::new("sg", &"net".into(), allow_all_outbound)
    }

    #[test]
    fn test_rule_display() {
        let rule = AccessRule::inbound_tcp(Peer::Range("10.0.0.0/24".parse().unwrap()), 80);
        assert_eq!(rule.to_string(), "allow in tcp/80 from 10.0.0.0/24");
        let rule = AccessRule::outbound_tcp(Peer::Group("web".into()), 80);
        assert_eq!(rule.to_string(), "allow out tcp/80 to group:web");
    }

    #[test]
    fn test_group_peers_are_non_ordering_references() {
        let sg = group(false)
            .with_rule(AccessRule::inbound_tcp(Peer::Group("client".into()), 80))
            .with_rule(AccessRule::inbound_tcp(
                Peer::Range("10.0.0.0/24".parse().unwrap()),
                443,
            ));
        let refs = sg.references();
        assert_eq!(refs.len(), 2);
        assert!(refs[0].ordering);
        assert_eq!(refs[1].field, "rules[0].peer");
        assert!(!refs[1].ordering);
        assert!(refs[1].same_network);
    }

    #[test]
    fn test_validate_rejects_redundant_outbound() {
        let sg = group(true).with_rule(AccessRule::outbound_tcp(Peer::Group("web".into()), 80));
        assert!(sg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_self_peer() {
        let rule = AccessRule::inbound_tcp(Peer::Group("client".into()), 80);
        let sg = group(false).with_rule(rule.clone()).with_rule(rule);
        assert!(matches!(
            sg.validate(),
            Err(DeclarationError::InvalidField { ref field, .. }) if field == "rules[1]"
        ));

        let sg = group(false).with_rule(AccessRule::inbound_tcp(Peer::Group("sg".into()), 80));
        assert!(sg.validate().is_err());
    }

    #[test]
    fn test_rules_in_direction() {
        let sg = group(false)
            .with_rule(AccessRule::inbound_tcp(Peer::Group("a".into()), 80))
            .with_rule(AccessRule::outbound_tcp(Peer::Group("b".into()), 80));
        assert_eq!(sg.rules_in(Direction::Inbound).count(), 1);
        assert_eq!(sg.rules_in(Direction::Outbound).count(), 1);
    }
}
