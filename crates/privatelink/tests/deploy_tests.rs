//! Integration tests for handing plans to a reconciler.
//!
//! A recording reconciler stands in for the provisioning engine so the tests
//! can observe exactly which calls were made and with what plan.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use privatelink::{
    deploy, ApplyReport, DeclarationError, DeployError, Plan, PlanDiff, ReconcileError,
    Reconciler, StackConfig,
};

// =============================================================================
// Recording Reconciler
// =============================================================================

/// Failure the recording reconciler returns from `apply`.
#[derive(Clone, Copy)]
enum Failure {
    None,
    Quota,
}

struct RecordingReconciler {
    failure: Failure,
    apply_calls: AtomicUsize,
    last_plan: Mutex<Option<Plan>>,
}

impl RecordingReconciler {
    fn new(failure: Failure) -> Self {
        Self {
            failure,
            apply_calls: AtomicUsize::new(0),
            last_plan: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Reconciler for RecordingReconciler {
    async fn diff(&self, plan: &Plan) -> Result<PlanDiff, ReconcileError> {
        let last = self.last_plan.lock().unwrap().clone();
        Ok(match last {
            Some(previous) => PlanDiff::between(&previous, plan),
            None => PlanDiff {
                added: plan.apply_order.clone(),
                ..PlanDiff::default()
            },
        })
    }

    async fn apply(&self, plan: &Plan) -> Result<ApplyReport, ReconcileError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_plan.lock().unwrap() = Some(plan.clone());
        match self.failure {
            Failure::None => Ok(ApplyReport {
                stack_id: plan.stack_id.clone(),
                applied: plan.apply_order.clone(),
            }),
            Failure::Quota => Err(ReconcileError::QuotaExceeded(
                "network load balancers per region".to_string(),
            )),
        }
    }

    async fn destroy(&self, stack_id: &str) -> Result<(), ReconcileError> {
        let mut last = self.last_plan.lock().unwrap();
        match last.as_ref() {
            Some(plan) if plan.stack_id == stack_id => {
                *last = None;
                Ok(())
            }
            _ => Err(ReconcileError::NotFound(stack_id.to_string())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_deploy_applies_plan_once() {
    let reconciler = RecordingReconciler::new(Failure::None);
    let report = deploy(&reconciler, "private-link", &StackConfig::default())
        .await
        .unwrap();

    assert_eq!(reconciler.apply_calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.stack_id, "private-link");
    assert_eq!(report.applied.len(), 14);

    let plan = reconciler.last_plan.lock().unwrap().clone().unwrap();
    assert_eq!(plan.apply_order, report.applied);
}

#[tokio::test]
async fn test_invalid_declaration_never_reaches_reconciler() {
    let reconciler = RecordingReconciler::new(Failure::None);
    let config = StackConfig {
        provider_cidr: "10.0.0.0/8".parse().unwrap(),
        ..StackConfig::default()
    };

    let err = deploy(&reconciler, "private-link", &config)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeployError::Declaration(DeclarationError::AddressOverlap { .. })
    ));
    assert_eq!(reconciler.apply_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_apply_error_is_propagated_without_retry() {
    let reconciler = RecordingReconciler::new(Failure::Quota);
    let err = deploy(&reconciler, "private-link", &StackConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeployError::Reconcile(ReconcileError::QuotaExceeded(_))
    ));
    assert_eq!(
        err.to_string(),
        "Quota exceeded: network load balancers per region"
    );
    assert_eq!(reconciler.apply_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_redeploy_with_same_config_reports_no_changes() {
    let reconciler = RecordingReconciler::new(Failure::None);
    let config = StackConfig::default();
    deploy(&reconciler, "private-link", &config).await.unwrap();

    let graph = privatelink::build_stack("private-link", &config).unwrap();
    let diff = reconciler.diff(&Plan::from_graph(&graph)).await.unwrap();
    assert!(diff.is_empty());
}

#[tokio::test]
async fn test_destroy_through_trait_object() {
    let reconciler: Box<dyn Reconciler> = Box::new(RecordingReconciler::new(Failure::None));
    deploy(reconciler.as_ref(), "private-link", &StackConfig::default())
        .await
        .unwrap();

    reconciler.destroy("private-link").await.unwrap();
    assert!(matches!(
        reconciler.destroy("private-link").await,
        Err(ReconcileError::NotFound(_))
    ));
}
