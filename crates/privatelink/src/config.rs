//! Stack configuration.
//!
//! Every parameter of the topology is an input with a default; the defaults
//! reproduce the reference deployment (a `10.0.0.0/24` consumer network, a
//! `192.168.0.0/24` provider network, one web server on port 80).

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;

use anyhow::{Context, Result};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cidr::Ipv4Cidr;
use crate::error::DeclarationError;
use crate::resources::{HealthCheck, PrivateLinkTraffic};

/// Options passed straight through to the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalOptions {
    /// Deployment region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Deployment account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Default tags for every resource.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Web server installed on the provider node at first boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebServerConfig {
    /// Package manager binary, e.g. `dnf`.
    pub package_manager: String,
    /// Web server package.
    pub package: String,
    /// Service unit name.
    pub service: String,
    /// Document root.
    pub web_root: String,
    /// Body written to `index.html`.
    pub response_body: String,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            package_manager: "dnf".to_string(),
            package: "httpd".to_string(),
            service: "httpd".to_string(),
            web_root: "/var/www/html".to_string(),
            response_body: "hello private link".to_string(),
        }
    }
}

/// Consumer network range: 10.0.0.0/24
pub const DEFAULT_CONSUMER_CIDR: Ipv4Cidr =
    Ipv4Cidr::from_net(Ipv4Net::new_assert(Ipv4Addr::new(10, 0, 0, 0), 24));

/// Provider network range: 192.168.0.0/24
pub const DEFAULT_PROVIDER_CIDR: Ipv4Cidr =
    Ipv4Cidr::from_net(Ipv4Net::new_assert(Ipv4Addr::new(192, 168, 0, 0), 24));

/// Full stack configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Consumer network range.
    pub consumer_cidr: Ipv4Cidr,
    /// Provider network range.
    pub provider_cidr: Ipv4Cidr,
    /// Availability zones each network may span.
    pub max_azs: u8,
    /// Prefix length of each network's public subnet.
    pub subnet_prefix: u8,
    /// Name given to each network's public subnet.
    pub subnet_name: String,
    /// Compute size class.
    pub instance_type: String,
    /// Region to machine image id.
    pub images: BTreeMap<String, String>,
    /// Service principal trusted by the instance role.
    pub trust_principal: String,
    /// Managed permission bundles attached to the instance role.
    pub managed_policies: Vec<String>,
    /// Port served end to end through the link.
    pub web_port: u16,
    /// Provider node bootstrap.
    pub web_server: WebServerConfig,
    /// Target pool health check.
    pub health_check: HealthCheck,
    /// Group rule evaluation for private-link traffic at the balancer.
    pub private_link_traffic: PrivateLinkTraffic,
    /// Whether consumer connections need manual approval.
    pub acceptance_required: bool,
    /// Whether the endpoint service publishes per-connection metrics.
    pub contributor_insights: bool,
    /// Pass-through reconciler options.
    #[serde(flatten)]
    pub options: GlobalOptions,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            consumer_cidr: DEFAULT_CONSUMER_CIDR,
            provider_cidr: DEFAULT_PROVIDER_CIDR,
            max_azs: 1,
            subnet_prefix: 28,
            subnet_name: "compute".to_string(),
            instance_type: "t2.small".to_string(),
            images: BTreeMap::from([(
                "ap-northeast-1".to_string(),
                "ami-02a405b3302affc24".to_string(),
            )]),
            trust_principal: "ec2.amazonaws.com".to_string(),
            managed_policies: vec!["AmazonSSMManagedInstanceCore".to_string()],
            web_port: 80,
            web_server: WebServerConfig::default(),
            health_check: HealthCheck::default(),
            private_link_traffic: PrivateLinkTraffic::Enforce,
            acceptance_required: false,
            contributor_insights: false,
            options: GlobalOptions::default(),
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), DeclarationError> {
    if value.trim().is_empty() {
        return Err(DeclarationError::invalid_config(field, "must not be empty"));
    }
    Ok(())
}

fn require_single_token(field: &str, value: &str) -> Result<(), DeclarationError> {
    require(field, value)?;
    if value.chars().any(|c| c.is_whitespace() || "'\"`$;&|<>".contains(c)) {
        return Err(DeclarationError::invalid_config(
            field,
            format!("'{value}' must be a single shell word"),
        ));
    }
    Ok(())
}

impl StackConfig {
    /// Load configuration from a YAML or JSON file.
    ///
    /// Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!(path = %path.display(), "Loaded stack configuration");
        Ok(config)
    }

    /// Set the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.options.region = Some(region.into());
        self
    }

    /// Set the account.
    #[must_use]
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.options.account = Some(account.into());
        self
    }

    /// Add a default tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.tags.insert(key.into(), value.into());
        self
    }

    /// Check every value that does not depend on the graph.
    ///
    /// Address overlap between the two networks is left to graph
    /// construction, which reports it against the network descriptor.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), DeclarationError> {
        let longest = self.consumer_cidr.prefix().max(self.provider_cidr.prefix());
        if !(longest..=28).contains(&self.subnet_prefix) {
            return Err(DeclarationError::invalid_config(
                "subnet_prefix",
                format!("/{} must be between /{longest} and /28", self.subnet_prefix),
            ));
        }
        if self.max_azs == 0 {
            return Err(DeclarationError::invalid_config(
                "max_azs",
                "at least one availability zone is required",
            ));
        }
        require("subnet_name", &self.subnet_name)?;
        require("instance_type", &self.instance_type)?;
        if self.images.is_empty() {
            return Err(DeclarationError::invalid_config(
                "images",
                "at least one region must map to an image",
            ));
        }
        for (region, image) in &self.images {
            require(&format!("images.{region}"), image)?;
        }
        require("trust_principal", &self.trust_principal)?;
        if self.web_port == 0 {
            return Err(DeclarationError::invalid_config(
                "web_port",
                "port must be in 1..=65535",
            ));
        }

        let web = &self.web_server;
        require_single_token("web_server.package_manager", &web.package_manager)?;
        require_single_token("web_server.package", &web.package)?;
        require_single_token("web_server.service", &web.service)?;
        require_single_token("web_server.web_root", &web.web_root)?;
        if !web.web_root.starts_with('/') {
            return Err(DeclarationError::invalid_config(
                "web_server.web_root",
                "must be an absolute path",
            ));
        }
        if web.response_body.contains('\n') {
            return Err(DeclarationError::invalid_config(
                "web_server.response_body",
                "must be a single line",
            ));
        }

        self.health_check
            .check()
            .map_err(|(field, reason)| {
                DeclarationError::invalid_config(format!("health_check.{field}"), reason)
            })?;

        if let Some(region) = &self.options.region {
            require("region", region)?;
        }
        Ok(())
    }
}
