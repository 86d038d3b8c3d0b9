//! Resource graph construction and validation.
//!
//! Descriptors are collected by a [`GraphBuilder`], which checks each one's
//! own fields and network address overlap as it arrives. [`GraphBuilder::build`]
//! then runs the lookup pass: every reference must name a declared descriptor
//! of the expected kind, network-local references must stay inside one
//! network, and the ordering edges must form a DAG. Only a graph that passes
//! all of this is handed out as a [`ResourceGraph`].

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use crate::config::GlobalOptions;
use crate::error::DeclarationError;
use crate::resources::{EndpointAttachment, Resource, ResourceId, ResourceKind};

/// Collects descriptors for one stack.
#[derive(Debug)]
pub struct GraphBuilder {
    stack_id: String,
    options: GlobalOptions,
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
}

impl GraphBuilder {
    /// Start an empty graph.
    #[must_use]
    pub fn new(stack_id: impl Into<String>, options: GlobalOptions) -> Self {
        Self {
            stack_id: stack_id.into(),
            options,
            resources: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Declare a descriptor.
    ///
    /// References are not resolved here, so descriptors may be added in any
    /// order; [`build`](Self::build) resolves them.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is malformed or taken, a field is invalid,
    /// or a network's range overlaps one already declared.
    pub fn add(&mut self, resource: impl Into<Resource>) -> Result<ResourceId, DeclarationError> {
        let resource = resource.into();
        let id = resource.id().clone();

        if !id.is_valid() {
            return Err(DeclarationError::InvalidId {
                id: id.as_str().to_string(),
            });
        }
        if self.index.contains_key(&id) {
            return Err(DeclarationError::DuplicateResource { resource: id });
        }
        resource.validate()?;

        if let Resource::NetworkSpace(network) = &resource {
            let clash = self
                .resources
                .iter()
                .filter_map(Resource::as_network_space)
                .find(|other| other.cidr.overlaps(&network.cidr));
            if let Some(other) = clash {
                return Err(DeclarationError::AddressOverlap {
                    resource: id,
                    cidr: network.cidr,
                    other: other.id.clone(),
                    other_cidr: other.cidr,
                });
            }
        }

        debug!(resource = %id, kind = %resource.kind(), "Declared resource");
        self.index.insert(id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(id)
    }

    /// Resolve references and fix the apply order.
    ///
    /// # Errors
    ///
    /// Returns the first dangling, mistyped or cross-network reference found
    /// in declaration order, or a cycle among ordering references.
    pub fn build(self) -> Result<ResourceGraph, DeclarationError> {
        if !ResourceId::new(self.stack_id.as_str()).is_valid() {
            return Err(DeclarationError::InvalidId { id: self.stack_id });
        }

        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); self.resources.len()];
        for (i, resource) in self.resources.iter().enumerate() {
            for reference in resource.references() {
                let Some(&j) = self.index.get(&reference.target) else {
                    return Err(DeclarationError::DanglingReference {
                        resource: resource.id().clone(),
                        field: reference.field,
                        target: reference.target,
                    });
                };
                let target = &self.resources[j];
                if target.kind() != reference.expected {
                    return Err(DeclarationError::WrongKind {
                        resource: resource.id().clone(),
                        field: reference.field,
                        target: reference.target,
                        expected: reference.expected,
                        found: target.kind(),
                    });
                }
                if reference.same_network
                    && home_network(&self.resources, &self.index, target)
                        != home_network(&self.resources, &self.index, resource)
                {
                    return Err(DeclarationError::NetworkMismatch {
                        resource: resource.id().clone(),
                        field: reference.field,
                        target: reference.target,
                    });
                }
                if reference.ordering && !deps[i].contains(&j) {
                    deps[i].push(j);
                }
            }
        }

        let order = topological_order(&deps).map_err(|i| DeclarationError::Cycle {
            resource: self.resources[i].id().clone(),
        })?;

        let ids = |indices: &[usize]| -> Vec<ResourceId> {
            indices
                .iter()
                .map(|&k| self.resources[k].id().clone())
                .collect()
        };
        let apply_order = ids(order.as_slice());
        let dependencies = deps.iter().map(|d| ids(d.as_slice())).collect();

        info!(
            stack = %self.stack_id,
            resources = self.resources.len(),
            "Resource graph resolved"
        );

        Ok(ResourceGraph {
            stack_id: self.stack_id,
            options: self.options,
            resources: self.resources,
            index: self.index,
            dependencies,
            apply_order,
        })
    }
}

/// Network a descriptor's traffic stays in.
///
/// A listener has no network of its own and lives in its balancer's.
fn home_network<'a>(
    resources: &'a [Resource],
    index: &HashMap<ResourceId, usize>,
    resource: &'a Resource,
) -> Option<&'a ResourceId> {
    match resource {
        Resource::ForwardingRule(rule) => index
            .get(&rule.balancer)
            .and_then(|&i| resources[i].network()),
        other => other.network(),
    }
}

/// A fully resolved, acyclic set of descriptors.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    stack_id: String,
    options: GlobalOptions,
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
    dependencies: Vec<Vec<ResourceId>>,
    apply_order: Vec<ResourceId>,
}

impl ResourceGraph {
    /// Stack identifier.
    #[must_use]
    pub fn stack_id(&self) -> &str {
        &self.stack_id
    }

    /// Pass-through options for the reconciler.
    #[must_use]
    pub fn options(&self) -> &GlobalOptions {
        &self.options
    }

    /// Descriptors in declaration order.
    #[must_use]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Look up a descriptor.
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    /// Descriptors of one kind, in declaration order.
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(move |r| r.kind() == kind)
    }

    /// Descriptors that must exist before `id` is applied.
    #[must_use]
    pub fn dependencies(&self, id: &ResourceId) -> Option<&[ResourceId]> {
        self.index.get(id).map(|&i| self.dependencies[i].as_slice())
    }

    /// A topological order: each descriptor after everything it depends on.
    ///
    /// Ties are broken by declaration order, so the order is stable.
    #[must_use]
    pub fn apply_order(&self) -> &[ResourceId] {
        &self.apply_order
    }

    /// The connection `endpoint` requests from its service.
    ///
    /// Returns `None` if `endpoint` is not a consumer endpoint.
    #[must_use]
    pub fn endpoint_attachment(&self, endpoint: &ResourceId) -> Option<EndpointAttachment> {
        let endpoint = self.get(endpoint)?.as_consumer_endpoint()?;
        let service = self.get(&endpoint.service)?.as_endpoint_service()?;
        Some(EndpointAttachment::between(endpoint, service))
    }
}

/// Kahn's algorithm over `deps[i]` = nodes that must precede `i`.
///
/// Ready nodes are taken lowest index first. On failure, returns a node that
/// sits on a cycle.
pub(crate) fn topological_order(deps: &[Vec<usize>]) -> Result<Vec<usize>, usize> {
    let n = deps.len();
    let mut indegree: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, ds) in deps.iter().enumerate() {
        for &d in ds {
            dependents[d].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.insert(d);
            }
        }
    }
    if order.len() == n {
        return Ok(order);
    }

    // Every unprocessed node still waits on another unprocessed node, so
    // walking those edges must revisit a node; that node is on a cycle.
    let mut node = (0..n).find(|&i| indegree[i] > 0).unwrap_or_default();
    let mut seen = vec![false; n];
    while !seen[node] {
        seen[node] = true;
        node = deps[node]
            .iter()
            .copied()
            .find(|&d| indegree[d] > 0)
            .unwrap_or(node);
    }
    Err(node)
}
