//! The private-link stack.
//!
//! [`build_stack`] assembles the whole topology from a [`StackConfig`]. Each
//! step is also exposed on its own so that a layer can be declared and
//! inspected in isolation. The steps run in dependency order, but only
//! [`GraphBuilder::build`] resolves references, so each step just records
//! names.
//!
//! Traffic path: consumer instance -> consumer endpoint -> (private link) ->
//! balancer -> provider instance. Every hop is admitted by its own explicit
//! group rule.

use tracing::info;

use crate::config::StackConfig;
use crate::error::DeclarationError;
use crate::graph::{GraphBuilder, ResourceGraph};
use crate::resources::{
    AccessControlGroup, AccessRule, ComputeNode, ConsumerEndpoint, DefaultAction,
    EndpointService, ForwardingRule, IdentityGrant, LoadBalancer, MachineImage, NetworkSpace,
    Peer, Protocol, ResourceId, StartupScript, TargetPool, TargetType,
};

pub const CONSUMER_NETWORK: &str = "consumer-network";
pub const PROVIDER_NETWORK: &str = "provider-network";
pub const INSTANCE_ROLE: &str = "instance-role";
pub const CONSUMER_INSTANCE_GROUP: &str = "consumer-instance-sg";
pub const ENDPOINT_GROUP: &str = "endpoint-sg";
pub const BALANCER_GROUP: &str = "balancer-sg";
pub const PROVIDER_INSTANCE_GROUP: &str = "provider-instance-sg";
pub const CONSUMER_INSTANCE: &str = "consumer-instance";
pub const PROVIDER_INSTANCE: &str = "provider-instance";
pub const BALANCER: &str = "balancer";
pub const TARGET_POOL: &str = "target-pool";
pub const LISTENER: &str = "listener";
pub const ENDPOINT_SERVICE: &str = "endpoint-service";
pub const CONSUMER_ENDPOINT: &str = "consumer-endpoint";

/// Ids of the two networks.
#[derive(Debug, Clone)]
pub struct Networks {
    pub consumer: ResourceId,
    pub provider: ResourceId,
}

/// Ids of the four access-control groups.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    pub consumer_instance: ResourceId,
    pub endpoint: ResourceId,
    pub balancer: ResourceId,
    pub provider_instance: ResourceId,
}

/// Ids of the two compute nodes.
#[derive(Debug, Clone)]
pub struct ComputeNodes {
    pub consumer: ResourceId,
    pub provider: ResourceId,
}

/// Ids of the load-balancing layer.
#[derive(Debug, Clone)]
pub struct LoadBalancing {
    pub balancer: ResourceId,
    pub target_pool: ResourceId,
    pub listener: ResourceId,
}

/// Ids of the private link.
#[derive(Debug, Clone)]
pub struct PrivateConnectivity {
    pub service: ResourceId,
    pub endpoint: ResourceId,
}

/// Two disjoint networks, each with one public subnet and an internet gateway.
///
/// # Errors
///
/// Returns an error if a subnet cannot be carved out of its range or the
/// ranges overlap.
pub fn build_networks(
    builder: &mut GraphBuilder,
    config: &StackConfig,
) -> Result<Networks, DeclarationError> {
    let consumer = builder.add(NetworkSpace::single_public_subnet(
        CONSUMER_NETWORK,
        config.consumer_cidr,
        &config.subnet_name,
        config.subnet_prefix,
        config.max_azs,
    )?)?;
    let provider = builder.add(NetworkSpace::single_public_subnet(
        PROVIDER_NETWORK,
        config.provider_cidr,
        &config.subnet_name,
        config.subnet_prefix,
        config.max_azs,
    )?)?;
    Ok(Networks { consumer, provider })
}

/// The role both instances run as.
///
/// # Errors
///
/// Returns an error if the principal or a policy name is empty.
pub fn build_identity(
    builder: &mut GraphBuilder,
    config: &StackConfig,
) -> Result<ResourceId, DeclarationError> {
    builder.add(IdentityGrant {
        id: INSTANCE_ROLE.into(),
        trust_principal: config.trust_principal.clone(),
        managed_policies: config.managed_policies.clone(),
    })
}

/// The four groups gating each hop of the traffic path.
///
/// # Errors
///
/// Returns an error if a group fails validation.
pub fn build_access_policy(
    builder: &mut GraphBuilder,
    config: &StackConfig,
    networks: &Networks,
) -> Result<AccessPolicy, DeclarationError> {
    let port = config.web_port;
    let consumer_instance = ResourceId::from(CONSUMER_INSTANCE_GROUP);
    let provider_instance = ResourceId::from(PROVIDER_INSTANCE_GROUP);
    let balancer = ResourceId::from(BALANCER_GROUP);

    // Inbound reachability for the consumer instance is never needed; it
    // only opens connections.
    let consumer_instance = builder.add(AccessControlGroup::new(
        consumer_instance,
        &networks.consumer,
        true,
    ))?;

    let endpoint = builder.add(
        AccessControlGroup::new(ENDPOINT_GROUP, &networks.consumer, false).with_rule(
            AccessRule::inbound_tcp(Peer::Group(consumer_instance.clone()), port),
        ),
    )?;

    let balancer = builder.add(
        AccessControlGroup::new(balancer, &networks.provider, false)
            .with_rule(AccessRule::inbound_tcp(
                Peer::Range(config.consumer_cidr),
                port,
            ))
            .with_rule(AccessRule::outbound_tcp(
                Peer::Group(provider_instance.clone()),
                port,
            )),
    )?;

    let provider_instance = builder.add(
        AccessControlGroup::new(provider_instance, &networks.provider, true)
            .with_rule(AccessRule::inbound_tcp(Peer::Group(balancer.clone()), port)),
    )?;

    Ok(AccessPolicy {
        consumer_instance,
        endpoint,
        balancer,
        provider_instance,
    })
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// The provider node's first-boot script: update, install, publish, start, enable.
#[must_use]
pub fn web_server_script(config: &StackConfig) -> StartupScript {
    let web = &config.web_server;
    StartupScript::bash().with_commands([
        format!("{} update -y", web.package_manager),
        format!("{} install {} -y", web.package_manager, web.package),
        format!(
            "echo {} > {}/index.html",
            shell_quote(&web.response_body),
            web.web_root.trim_end_matches('/')
        ),
        format!("systemctl start {}", web.service),
        format!("systemctl enable {}", web.service),
    ])
}

/// One instance per network; only the provider instance runs a web server.
///
/// # Errors
///
/// Returns [`DeclarationError::MissingImage`] if a region is configured and
/// the image map has no entry for it.
pub fn build_compute(
    builder: &mut GraphBuilder,
    config: &StackConfig,
    networks: &Networks,
    identity: &ResourceId,
    policy: &AccessPolicy,
) -> Result<ComputeNodes, DeclarationError> {
    let image = MachineImage {
        by_region: config.images.clone(),
    };
    if let Some(region) = &config.options.region {
        if image.resolve(region).is_none() {
            return Err(DeclarationError::MissingImage {
                resource: CONSUMER_INSTANCE.into(),
                region: region.clone(),
            });
        }
    }

    let node = |id: &str, network: &ResourceId, group: &ResourceId| ComputeNode {
        id: id.into(),
        network: network.clone(),
        instance_type: config.instance_type.clone(),
        image: image.clone(),
        identity: identity.clone(),
        groups: vec![group.clone()],
        startup_script: None,
    };

    let consumer = builder.add(node(
        CONSUMER_INSTANCE,
        &networks.consumer,
        &policy.consumer_instance,
    ))?;
    let provider = builder.add(ComputeNode {
        startup_script: Some(web_server_script(config)),
        ..node(
            PROVIDER_INSTANCE,
            &networks.provider,
            &policy.provider_instance,
        )
    })?;
    Ok(ComputeNodes { consumer, provider })
}

/// Balancer, target pool holding the provider instance, and a listener that
/// forwards everything to the pool.
///
/// # Errors
///
/// Returns an error if a descriptor fails validation.
pub fn build_load_balancing(
    builder: &mut GraphBuilder,
    config: &StackConfig,
    networks: &Networks,
    policy: &AccessPolicy,
    compute: &ComputeNodes,
) -> Result<LoadBalancing, DeclarationError> {
    let balancer = builder.add(LoadBalancer {
        id: BALANCER.into(),
        network: networks.provider.clone(),
        groups: vec![policy.balancer.clone()],
        private_link_traffic: config.private_link_traffic,
        internet_facing: false,
    })?;
    let target_pool = builder.add(TargetPool {
        id: TARGET_POOL.into(),
        network: networks.provider.clone(),
        protocol: Protocol::Tcp,
        port: config.web_port,
        target_type: TargetType::Instance,
        health_check: config.health_check.clone(),
        targets: vec![compute.provider.clone()],
    })?;
    let listener = builder.add(ForwardingRule {
        id: LISTENER.into(),
        balancer: balancer.clone(),
        protocol: Protocol::Tcp,
        port: config.web_port,
        default_action: DefaultAction::Forward {
            target_pool: target_pool.clone(),
        },
    })?;
    Ok(LoadBalancing {
        balancer,
        target_pool,
        listener,
    })
}

/// Endpoint service fronting the balancer, and the consumer endpoint
/// attached to it from the consumer network.
///
/// # Errors
///
/// Returns an error if a descriptor fails validation.
pub fn build_private_connectivity(
    builder: &mut GraphBuilder,
    config: &StackConfig,
    networks: &Networks,
    policy: &AccessPolicy,
    balancing: &LoadBalancing,
) -> Result<PrivateConnectivity, DeclarationError> {
    let service = builder.add(EndpointService {
        id: ENDPOINT_SERVICE.into(),
        balancers: vec![balancing.balancer.clone()],
        acceptance_required: config.acceptance_required,
        contributor_insights: config.contributor_insights,
    })?;
    let endpoint = builder.add(ConsumerEndpoint {
        id: CONSUMER_ENDPOINT.into(),
        network: networks.consumer.clone(),
        service: service.clone(),
        groups: vec![policy.endpoint.clone()],
    })?;
    Ok(PrivateConnectivity { service, endpoint })
}

/// Build and resolve the full topology.
///
/// Pure: identical inputs give identical graphs, and nothing outside the
/// returned value is touched.
///
/// # Errors
///
/// Returns the first configuration or structural error.
pub fn build_stack(stack_id: &str, config: &StackConfig) -> Result<ResourceGraph, DeclarationError> {
    config.validate()?;

    let mut builder = GraphBuilder::new(stack_id, config.options.clone());
    let networks = build_networks(&mut builder, config)?;
    let identity = build_identity(&mut builder, config)?;
    let policy = build_access_policy(&mut builder, config, &networks)?;
    let compute = build_compute(&mut builder, config, &networks, &identity, &policy)?;
    let balancing = build_load_balancing(&mut builder, config, &networks, &policy, &compute)?;
    build_private_connectivity(&mut builder, config, &networks, &policy, &balancing)?;

    let graph = builder.build()?;
    info!(
        stack = stack_id,
        resources = graph.resources().len(),
        private_link_traffic = %config.private_link_traffic,
        "Built private-link stack"
    );
    Ok(graph)
}
