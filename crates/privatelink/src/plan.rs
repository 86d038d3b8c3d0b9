//! Target-state documents.
//!
//! A [`Plan`] is the serialisable form of a resolved graph: what the
//! reconciler receives. It holds only ordered collections, so the same graph
//! always serialises to the same bytes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::GlobalOptions;
use crate::graph::ResourceGraph;
use crate::resources::{Resource, ResourceId};

/// Desired state of one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Stack identifier.
    pub stack_id: String,
    /// Pass-through reconciler options.
    #[serde(default)]
    pub options: GlobalOptions,
    /// Descriptors in declaration order.
    pub resources: Vec<Resource>,
    /// Ordering dependencies per descriptor.
    pub dependencies: BTreeMap<ResourceId, Vec<ResourceId>>,
    /// A valid creation order.
    pub apply_order: Vec<ResourceId>,
}

impl Plan {
    /// Snapshot a resolved graph.
    #[must_use]
    pub fn from_graph(graph: &ResourceGraph) -> Self {
        let dependencies = graph
            .resources()
            .iter()
            .map(|r| {
                let deps = graph.dependencies(r.id()).unwrap_or_default().to_vec();
                (r.id().clone(), deps)
            })
            .collect();
        Self {
            stack_id: graph.stack_id().to_string(),
            options: graph.options().clone(),
            resources: graph.resources().to_vec(),
            dependencies,
            apply_order: graph.apply_order().to_vec(),
        }
    }

    /// Pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Plan file path for `stack_id` under `out_dir`.
    #[must_use]
    pub fn plan_file(out_dir: &Path, stack_id: &str) -> PathBuf {
        out_dir.join(format!("{stack_id}.plan.json"))
    }

    /// Write the plan as JSON under `out_dir`, returning the file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, out_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(out_dir).context("Failed to create output directory")?;

        let path = Self::plan_file(out_dir, &self.stack_id);
        let content = self.to_json().context("Failed to serialize plan")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write plan file {}", path.display()))?;

        info!(path = %path.display(), resources = self.resources.len(), "Wrote plan");
        Ok(path)
    }

    /// Read a plan written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read plan file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse plan file {}", path.display()))
    }
}

/// Descriptor-level difference between two plans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDiff {
    /// In the new plan only, in new declaration order.
    pub added: Vec<ResourceId>,
    /// In the old plan only, in old declaration order.
    pub removed: Vec<ResourceId>,
    /// In both, with different fields, in new declaration order.
    pub changed: Vec<ResourceId>,
    /// Whether the pass-through options (region, account, tags) differ.
    #[serde(default)]
    pub options_changed: bool,
}

impl PlanDiff {
    /// Compare `old` against `new`.
    #[must_use]
    pub fn between(old: &Plan, new: &Plan) -> Self {
        let old_by_id: HashMap<&ResourceId, &Resource> =
            old.resources.iter().map(|r| (r.id(), r)).collect();
        let new_by_id: HashMap<&ResourceId, &Resource> =
            new.resources.iter().map(|r| (r.id(), r)).collect();

        let mut diff = Self {
            options_changed: old.options != new.options,
            ..Self::default()
        };
        for resource in &new.resources {
            match old_by_id.get(resource.id()) {
                None => diff.added.push(resource.id().clone()),
                Some(previous) if *previous != resource => {
                    diff.changed.push(resource.id().clone());
                }
                Some(_) => {}
            }
        }
        diff.removed = old
            .resources
            .iter()
            .filter(|r| !new_by_id.contains_key(r.id()))
            .map(|r| r.id().clone())
            .collect();
        diff
    }

    /// Whether the plans describe the same descriptors and options.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.options_changed
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
    }
}

impl fmt::Display for PlanDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "no changes");
        }
        if self.options_changed {
            writeln!(f, "~ options")?;
        }
        for id in &self.added {
            writeln!(f, "+ {id}")?;
        }
        for id in &self.changed {
            writeln!(f, "~ {id}")?;
        }
        for id in &self.removed {
            writeln!(f, "- {id}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::stack::build_stack;

    fn plan(config: &StackConfig) -> Plan {
        Plan::from_graph(&build_stack("stack", config).unwrap())
    }

    #[test]
    fn test_identical_plans_have_empty_diff() {
        let config = StackConfig::default();
        let diff = PlanDiff::between(&plan(&config), &plan(&config));
        assert!(diff.is_empty());
        assert_eq!(diff.to_string(), "no changes\n");
    }

    #[test]
    fn test_diff_reports_changed_descriptors() {
        let old = plan(&StackConfig::default());
        let new = plan(&StackConfig {
            acceptance_required: true,
            ..StackConfig::default()
        });
        let diff = PlanDiff::between(&old, &new);
        assert_eq!(diff.changed, vec![ResourceId::from("endpoint-service")]);
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(diff.to_string(), "~ endpoint-service\n");
    }

    #[test]
    fn test_diff_ignores_reordering_and_reports_removed() {
        let old = plan(&StackConfig::default());
        let mut new = old.clone();
        let last = new.resources.pop().unwrap();
        new.resources.insert(0, last);
        new.resources.remove(1);
        let diff = PlanDiff::between(&old, &new);
        assert_eq!(diff.removed, vec![old.resources[0].id().clone()]);
        assert!(diff.added.is_empty());
    }

    #[test]
    fn test_diff_reports_option_changes() {
        let old = plan(&StackConfig::default());
        let new = plan(&StackConfig::default().with_tag("env", "prod").with_account("1"));
        let diff = PlanDiff::between(&old, &new);
        assert!(diff.options_changed);
        assert!(diff.changed.is_empty());
        assert!(!diff.is_empty());
        assert_eq!(diff.to_string(), "~ options\n");
    }

    #[test]
    fn test_plan_records_dependencies() {
        let p = plan(&StackConfig::default());
        assert_eq!(
            p.dependencies[&ResourceId::from("listener")],
            vec![ResourceId::from("balancer"), ResourceId::from("target-pool")]
        );
        assert!(p.dependencies[&ResourceId::from("consumer-network")].is_empty());
    }
}
