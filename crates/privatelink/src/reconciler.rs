//! Seam to the external provisioning engine.
//!
//! The engine owns everything that happens at apply time: ordering creates
//! against the control plane, retries, rollback of partial failures. This
//! crate only hands it a validated [`Plan`] and passes its errors back
//! unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::StackConfig;
use crate::error::DeclarationError;
use crate::plan::{Plan, PlanDiff};
use crate::resources::ResourceId;
use crate::stack::build_stack;

/// Errors reported by a reconciler at apply time.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Account quota would be exceeded.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Caller lacks a permission.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Live state conflicts with the plan.
    #[error("Resource conflict on {resource}: {message}")]
    Conflict {
        resource: ResourceId,
        message: String,
    },

    /// Stack has no live state.
    #[error("Stack not found: {0}")]
    NotFound(String),

    /// Any other engine failure.
    #[error("Reconciler error: {0}")]
    Other(String),
}

/// Outcome of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Stack identifier.
    pub stack_id: String,
    /// Descriptors created or updated, in the order applied.
    pub applied: Vec<ResourceId>,
}

/// A provisioning engine that drives live state toward a plan.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Compare live state with `plan`.
    async fn diff(&self, plan: &Plan) -> Result<PlanDiff, ReconcileError>;

    /// Create, update and delete until live state matches `plan`.
    async fn apply(&self, plan: &Plan) -> Result<ApplyReport, ReconcileError>;

    /// Delete every resource of the stack.
    async fn destroy(&self, stack_id: &str) -> Result<(), ReconcileError>;
}

/// Errors from [`deploy`].
#[derive(Error, Debug)]
pub enum DeployError {
    /// The declaration is invalid; the reconciler was not called.
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    /// The reconciler failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Build the stack and hand it to `reconciler`.
///
/// The reconciler is called exactly once, and only for a valid graph. Its
/// error, if any, is returned as is: no retry, no suppression.
///
/// # Errors
///
/// Returns [`DeployError::Declaration`] before any reconciler call if the
/// declaration is invalid, otherwise whatever the reconciler reports.
pub async fn deploy<R>(
    reconciler: &R,
    stack_id: &str,
    config: &StackConfig,
) -> Result<ApplyReport, DeployError>
where
    R: Reconciler + ?Sized,
{
    let graph = build_stack(stack_id, config)?;
    let plan = Plan::from_graph(&graph);

    info!(
        stack = stack_id,
        resources = plan.resources.len(),
        "Handing plan to reconciler"
    );
    let report = reconciler.apply(&plan).await?;
    info!(stack = stack_id, applied = report.applied.len(), "Reconciler applied plan");
    Ok(report)
}
