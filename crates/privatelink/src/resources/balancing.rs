//! Network load balancer, target pool and forwarding rule.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Protocol, Reference, ResourceId, ResourceKind};
use crate::error::DeclarationError;

/// Whether group rules apply to traffic that arrives over a private link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivateLinkTraffic {
    /// Inbound rules are evaluated for private-link traffic too.
    #[default]
    Enforce,
    /// Private-link traffic skips inbound rule evaluation.
    Bypass,
}

impl fmt::Display for PrivateLinkTraffic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enforce => write!(f, "enforce"),
            Self::Bypass => write!(f, "bypass"),
        }
    }
}

/// A network load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    /// Resource id.
    pub id: ResourceId,
    /// Owning network.
    pub network: ResourceId,
    /// Attached groups, all in `network`.
    pub groups: Vec<ResourceId>,
    /// Rule evaluation for private-link traffic.
    pub private_link_traffic: PrivateLinkTraffic,
    /// Whether the balancer gets a public address.
    pub internet_facing: bool,
}

impl LoadBalancer {
    pub(crate) fn references(&self) -> Vec<Reference> {
        let mut refs = vec![Reference::dependency(
            "network",
            &self.network,
            ResourceKind::NetworkSpace,
        )];
        refs.extend(self.groups.iter().enumerate().map(|(i, g)| {
            Reference::local(format!("groups[{i}]"), g, ResourceKind::AccessControlGroup)
        }));
        refs
    }

    pub(crate) fn validate(&self) -> Result<(), DeclarationError> {
        super::require_non_empty(&self.id, "groups", &self.groups)
    }
}

/// Protocol used to probe targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthCheckProtocol {
    Http,
    Https,
    Tcp,
}

impl fmt::Display for HealthCheckProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "HTTP"),
            Self::Https => write!(f, "HTTPS"),
            Self::Tcp => write!(f, "TCP"),
        }
    }
}

/// Target health-check policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheck {
    pub enabled: bool,
    pub protocol: HealthCheckProtocol,
    /// Request path, for HTTP(S) probes.
    pub path: String,
    /// Healthy status codes: `200`, `200,202` or `200-299`.
    pub healthy_codes: String,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            enabled: true,
            protocol: HealthCheckProtocol::Http,
            path: "/".to_string(),
            healthy_codes: "200".to_string(),
        }
    }
}

impl HealthCheck {
    /// Check path and status-code syntax.
    ///
    /// # Errors
    ///
    /// Returns `(field, reason)` for the first invalid field.
    pub fn check(&self) -> Result<(), (&'static str, String)> {
        if self.protocol != HealthCheckProtocol::Tcp && !self.path.starts_with('/') {
            return Err(("path", format!("'{}' must start with '/'", self.path)));
        }
        if self.protocol != HealthCheckProtocol::Tcp {
            parse_status_codes(&self.healthy_codes).map_err(|e| ("healthy_codes", e))?;
        }
        Ok(())
    }
}

fn parse_code(s: &str) -> Result<u16, String> {
    let code: u16 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{s}' is not a status code"))?;
    if !(200..=599).contains(&code) {
        return Err(format!("{code} is outside 200..=599"));
    }
    Ok(code)
}

/// Parse a healthy-code expression into inclusive ranges.
///
/// # Errors
///
/// Returns a reason string for malformed input.
pub fn parse_status_codes(expr: &str) -> Result<Vec<(u16, u16)>, String> {
    if expr.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    expr.split(',')
        .map(|part| match part.split_once('-') {
            Some((lo, hi)) => {
                let (lo, hi) = (parse_code(lo)?, parse_code(hi)?);
                if lo > hi {
                    return Err(format!("range '{part}' is reversed"));
                }
                Ok((lo, hi))
            }
            None => parse_code(part).map(|c| (c, c)),
        })
        .collect()
}

/// How targets are addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// By compute instance id.
    Instance,
}

/// A named, health-checked set of destinations behind a balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPool {
    /// Resource id.
    pub id: ResourceId,
    /// Network the targets live in.
    pub network: ResourceId,
    pub protocol: Protocol,
    pub port: u16,
    pub target_type: TargetType,
    pub health_check: HealthCheck,
    /// Compute nodes, in registration order.
    pub targets: Vec<ResourceId>,
}

impl TargetPool {
    pub(crate) fn references(&self) -> Vec<Reference> {
        let mut refs = vec![Reference::dependency(
            "network",
            &self.network,
            ResourceKind::NetworkSpace,
        )];
        refs.extend(self.targets.iter().enumerate().map(|(i, t)| {
            Reference::local(format!("targets[{i}]"), t, ResourceKind::ComputeNode)
        }));
        refs
    }

    pub(crate) fn validate(&self) -> Result<(), DeclarationError> {
        super::require_port(&self.id, "port", self.port)?;
        super::require_non_empty(&self.id, "targets", &self.targets)?;
        self.health_check.check().map_err(|(field, reason)| {
            DeclarationError::invalid_field(&self.id, format!("health_check.{field}"), reason)
        })?;
        if let Some(i) = self
            .targets
            .iter()
            .enumerate()
            .position(|(i, t)| self.targets[..i].contains(t))
        {
            return Err(DeclarationError::invalid_field(
                &self.id,
                format!("targets[{i}]"),
                "target registered twice",
            ));
        }
        Ok(())
    }
}

/// What a forwarding rule does with matching traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultAction {
    /// Send everything to one pool; no path or header matching.
    Forward { target_pool: ResourceId },
}

/// A listener on the balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingRule {
    /// Resource id.
    pub id: ResourceId,
    /// Balancer the rule listens on.
    pub balancer: ResourceId,
    pub protocol: Protocol,
    pub port: u16,
    pub default_action: DefaultAction,
}

impl ForwardingRule {
    pub(crate) fn references(&self) -> Vec<Reference> {
        let DefaultAction::Forward { target_pool } = &self.default_action;
        vec![
            Reference::dependency("balancer", &self.balancer, ResourceKind::LoadBalancer),
            Reference::local(
                "default_action.target_pool",
                target_pool,
                ResourceKind::TargetPool,
            ),
        ]
    }

    pub(crate) fn validate(&self) -> Result<(), DeclarationError> {
        super::require_port(&self.id, "port", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_check_defaults() {
        let hc = HealthCheck::default();
        assert!(hc.enabled);
        assert_eq!(hc.protocol, HealthCheckProtocol::Http);
        assert_eq!(hc.path, "/");
        assert_eq!(hc.healthy_codes, "200");
        assert!(hc.check().is_ok());
    }

    #[test]
    fn test_parse_status_codes() {
        assert_eq!(parse_status_codes("200"), Ok(vec![(200, 200)]));
        assert_eq!(
            parse_status_codes("200,202"),
            Ok(vec![(200, 200), (202, 202)])
        );
        assert_eq!(parse_status_codes("200-299"), Ok(vec![(200, 299)]));
        assert!(parse_status_codes("").is_err());
        assert!(parse_status_codes("ok").is_err());
        assert!(parse_status_codes("299-200").is_err());
        assert!(parse_status_codes("100").is_err());
    }

    #[test]
    fn test_health_check_path_must_be_absolute() {
        let hc = HealthCheck {
            path: "health".into(),
            ..HealthCheck::default()
        };
        assert_eq!(hc.check().unwrap_err().0, "path");

        let tcp = HealthCheck {
            protocol: HealthCheckProtocol::Tcp,
            path: String::new(),
            ..HealthCheck::default()
        };
        assert!(tcp.check().is_ok());
    }

    #[test]
    fn test_private_link_traffic_defaults_to_enforce() {
        assert_eq!(PrivateLinkTraffic::default(), PrivateLinkTraffic::Enforce);
        assert_eq!(
            serde_json::to_string(&PrivateLinkTraffic::Bypass).unwrap(),
            "\"bypass\""
        );
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let pool = TargetPool {
            id: "pool".into(),
            network: "net".into(),
            protocol: Protocol::Tcp,
            port: 80,
            target_type: TargetType::Instance,
            health_check: HealthCheck::default(),
            targets: vec!["vm".into(), "vm".into()],
        };
        assert!(matches!(
            pool.validate(),
            Err(DeclarationError::InvalidField { ref field, .. }) if field == "targets[1]"
        ));
    }
}
