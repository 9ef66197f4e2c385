//! Reconciler for maintaining desired state.
//!
//! This module implements the reconciliation run that compares the declared
//! configuration with the controller's state and applies the differences.
//! Runs that write (apply, destroy) hold the state lock for their duration.

use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::api::{ControlPlane, ObservedState, StateObserver};
use crate::config::{BowtieConfig, ConfigHasher};
use crate::error::{BowtieError, ReconcileError, Result};
use crate::planner::{
    DeploymentPlan, DiffEngine, DiffResult, DiffType, IdGenerator, PlanExecutor, UuidV4,
};
use crate::state::{DeploymentOperation, DeploymentState, StateStore, generate_holder_id};

/// Reconciler for maintaining desired state.
pub struct Reconciler<'a, S: StateStore> {
    /// Configuration.
    config: &'a BowtieConfig,
    /// State store.
    state_store: &'a S,
    /// Remote control plane.
    api: &'a dyn ControlPlane,
    /// Configuration hasher.
    hasher: ConfigHasher,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Source of fresh ids.
    ids: Mutex<Box<dyn IdGenerator + Send>>,
    /// Lock holder name.
    holder: String,
    /// Whether to keep applying after a failed action.
    continue_on_error: bool,
}

/// Result of a reconciliation run.
#[derive(Debug, serde::Serialize)]
pub struct ReconciliationResult {
    /// Whether reconciliation succeeded.
    pub success: bool,
    /// Number of entities created.
    pub created: usize,
    /// Number of entities updated.
    pub updated: usize,
    /// Number of entities deleted.
    pub deleted: usize,
    /// Number of entities unchanged.
    pub unchanged: usize,
    /// Errors encountered.
    pub errors: Vec<String>,
    /// Final state after reconciliation.
    #[serde(skip)]
    pub final_state: Option<DeploymentState>,
}

/// A computed plan, not yet applied.
#[derive(Debug)]
pub struct PlanPreview {
    /// Entity-level differences.
    pub diff: DiffResult,
    /// Ordered actions.
    pub plan: DeploymentPlan,
}

impl<S: StateStore> std::fmt::Debug for Reconciler<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("state", &self.state_store.location())
            .field("holder", &self.holder)
            .field("continue_on_error", &self.continue_on_error)
            .finish_non_exhaustive()
    }
}

impl<'a, S: StateStore> Reconciler<'a, S> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(config: &'a BowtieConfig, state_store: &'a S, api: &'a dyn ControlPlane) -> Self {
        Self {
            config,
            state_store,
            api,
            hasher: ConfigHasher::new(),
            diff_engine: DiffEngine::new(),
            ids: Mutex::new(Box::new(UuidV4)),
            holder: generate_holder_id(),
            continue_on_error: false,
        }
    }

    /// Sets whether to keep applying after a failed action.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Replaces the id generator.
    #[must_use]
    pub fn with_ids(mut self, ids: impl IdGenerator + Send + 'static) -> Self {
        self.ids = Mutex::new(Box::new(ids));
        self
    }

    /// Computes the plan without applying it.
    ///
    /// # Errors
    ///
    /// Returns an error if state cannot be loaded, the controller cannot be
    /// observed, or the diff fails.
    pub async fn plan(&self) -> Result<PlanPreview> {
        let state = self.state_store.load().await?;
        let observed = self.observe(self.config, state.as_ref()).await?;
        let diff = self.compute_diff(self.config, state.as_ref(), &observed)?;
        let plan = DeploymentPlan::from_diff(&diff, &self.hasher.hash_config(self.config));
        Ok(PlanPreview { diff, plan })
    }

    /// Performs a full reconciliation.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock cannot be taken, or if loading,
    /// observing, diffing or saving fails. Failed actions are reported in the
    /// result.
    pub async fn reconcile(&self) -> Result<ReconciliationResult> {
        info!("Starting reconciliation of {} entities", self.config.entity_count());

        let lock = self.state_store.acquire_lock(&self.holder, "apply").await?;
        let outcome = self.reconcile_locked().await;
        self.release(&lock.lock_id).await;
        outcome
    }

    async fn reconcile_locked(&self) -> Result<ReconciliationResult> {
        let config_hash = self.hasher.hash_config(self.config);
        let mut state = self.state_store.load().await?.unwrap_or_default();

        let observed = self.observe(self.config, Some(&state)).await?;
        let diff = self.compute_diff(self.config, Some(&state), &observed)?;

        info!(
            "Diff: {} creates, {} updates, {} deletes, {} unchanged",
            diff.creates, diff.updates, diff.deletes, diff.unchanged
        );

        // Unchanged entities are recorded as found, so explicit ids are adopted.
        for resource_diff in &diff.diffs {
            if resource_diff.diff_type == DiffType::NoChange
                && let Some(record) = &resource_diff.record
                && state.get(record.kind, &record.name).is_none_or(|known| {
                    known.id != record.id
                        || known.payload_hash != record.payload_hash
                        || known.items != record.items
                })
            {
                state.set(record.clone());
            }
        }

        if !diff.has_changes() {
            info!("No changes required, state is converged");
            state.config_hash.clone_from(&config_hash);
            self.state_store.save(&state).await?;
            return Ok(ReconciliationResult {
                success: true,
                created: 0,
                updated: 0,
                deleted: 0,
                unchanged: diff.unchanged,
                errors: vec![],
                final_state: Some(state),
            });
        }

        let plan = DeploymentPlan::from_diff(&diff, &config_hash);
        let execution_result = PlanExecutor::new(self.api)
            .with_continue_on_error(self.continue_on_error)
            .execute(&plan, &mut state)
            .await?;

        self.state_store.save(&state).await?;

        let mut errors = execution_result.errors();
        if !execution_result.success {
            errors.insert(
                0,
                format!(
                    "{} of {} actions failed ({} skipped)",
                    execution_result.failed,
                    plan.action_count(),
                    execution_result.skipped
                ),
            );
        }

        Ok(ReconciliationResult {
            success: execution_result.success,
            created: diff.creates,
            updated: diff.updates,
            deleted: diff.deletes,
            unchanged: diff.unchanged,
            errors,
            final_state: Some(state),
        })
    }

    /// Checks for drift without applying changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the drift check fails.
    pub async fn check_drift(&self) -> Result<DriftReport> {
        info!("Checking for drift");

        let preview = self.plan().await?;
        let drifted_resources: Vec<String> = preview
            .diff
            .actionable_diffs()
            .into_iter()
            .map(ToString::to_string)
            .collect();

        Ok(DriftReport {
            has_drift: preview.diff.has_changes(),
            drifted_resources,
            total_resources: self.config.entity_count(),
            unchanged: preview.diff.unchanged,
        })
    }

    /// Deletes every recorded entity.
    ///
    /// Deletion is best-effort: failures are collected and the remaining
    /// entities are still attempted. Records of failed deletes stay in state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state lock cannot be taken, or if loading,
    /// observing or saving fails.
    pub async fn destroy(&self) -> Result<ReconciliationResult> {
        let lock = self.state_store.acquire_lock(&self.holder, "destroy").await?;
        let outcome = self.destroy_locked().await;
        self.release(&lock.lock_id).await;
        outcome
    }

    async fn destroy_locked(&self) -> Result<ReconciliationResult> {
        let Some(mut state) = self.state_store.load().await? else {
            info!("No state found, nothing to destroy");
            return Ok(ReconciliationResult {
                success: true,
                created: 0,
                updated: 0,
                deleted: 0,
                unchanged: 0,
                errors: vec![],
                final_state: None,
            });
        };

        info!("Destroying {} managed entities", state.entity_count());

        let nothing = BowtieConfig::default();
        let observed = self.observe(&nothing, Some(&state)).await?;
        let diff = self.compute_diff(&nothing, Some(&state), &observed)?;
        let plan = DeploymentPlan::from_diff(&diff, "");

        let execution_result = PlanExecutor::new(self.api)
            .with_continue_on_error(true)
            .with_operation(DeploymentOperation::Destroy)
            .execute(&plan, &mut state)
            .await?;

        self.state_store.save(&state).await?;

        Ok(ReconciliationResult {
            success: execution_result.success,
            created: 0,
            updated: 0,
            deleted: execution_result.successful,
            unchanged: 0,
            errors: execution_result.errors(),
            final_state: Some(state),
        })
    }

    async fn observe(
        &self,
        config: &BowtieConfig,
        state: Option<&DeploymentState>,
    ) -> Result<ObservedState> {
        let member_groups = DiffEngine::member_groups(config, state);
        debug!("Reading membership of {} groups", member_groups.len());
        StateObserver::new(self.api).observe(&member_groups).await
    }

    fn compute_diff(
        &self,
        config: &BowtieConfig,
        state: Option<&DeploymentState>,
        observed: &ObservedState,
    ) -> Result<DiffResult> {
        let mut ids = self.ids.lock().map_err(|_| {
            BowtieError::Reconcile(ReconcileError::Aborted {
                reason: String::from("id generator poisoned"),
            })
        })?;
        self.diff_engine
            .compute_diff(config, state, observed, &mut **ids)
    }

    async fn release(&self, lock_id: &str) {
        if let Err(e) = self.state_store.release_lock(lock_id).await {
            warn!("Failed to release state lock {lock_id}: {e}");
        }
    }
}

/// Report of drift detection.
#[derive(Debug, serde::Serialize)]
pub struct DriftReport {
    /// Whether drift was detected.
    pub has_drift: bool,
    /// Entities that differ from the configuration.
    pub drifted_resources: Vec<String>,
    /// Total number of entities in config.
    pub total_resources: usize,
    /// Number of entities matching the configuration.
    pub unchanged: usize,
}

impl DriftReport {
    /// Returns true if the state is converged (no drift).
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_drift
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_drift {
            writeln!(f, "Drift detected:")?;
            for resource in &self.drifted_resources {
                writeln!(f, "  - {resource}")?;
            }
        } else {
            write!(f, "No drift detected, state is converged")?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.success { "successful" } else { "failed" };
        writeln!(f, "Reconciliation {status}:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        writeln!(f, "  Unchanged: {}", self.unchanged)?;

        if !self.errors.is_empty() {
            writeln!(f, "  Errors:")?;
            for error in &self.errors {
                writeln!(f, "    - {error}")?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::MemoryControlPlane;
    use crate::config::ConfigParser;
    use crate::error::StateError;
    use crate::planner::SequentialIds;
    use crate::state::{EntityKind, LocalStateStore};
    use tempfile::TempDir;

    const CONFIG: &str = r"
sites:
  - name: office
    ranges:
      - name: lan
        ipv4_range: 10.0.0.0/16
dns:
  - name: example.com
    servers: [1.1.1.1, 4.4.4.4]
groups:
  - name: eng
    users: [u-1, u-2]
resources:
  - name: web
    protocol: https
    location: { dns: web.local }
    ports: { collection: [443] }
resource_groups:
  - name: all
    resources: [web]
";

    fn parse(yaml: &str) -> BowtieConfig {
        ConfigParser::new().parse_yaml(yaml, None).unwrap()
    }

    fn store() -> (LocalStateStore, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = LocalStateStore::relative_to(temp.path(), ".bowtie/state.json");
        (store, temp)
    }

    #[tokio::test]
    async fn test_apply_then_converged() {
        let api = MemoryControlPlane::new();
        let (store, _temp) = store();
        let config = parse(CONFIG);

        let reconciler = Reconciler::new(&config, &store, &api).with_ids(SequentialIds::new("id"));
        let first = reconciler.reconcile().await.unwrap();
        assert!(first.success, "{:?}", first.errors);
        assert_eq!(first.created, 6);

        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.entity_count(), 6);
        assert!(!store.is_locked().await.unwrap());

        api.clear_calls();
        let second = reconciler.reconcile().await.unwrap();
        assert!(second.success);
        assert_eq!(second.unchanged, 6);
        assert!(api.calls().is_empty(), "{:?}", api.calls());

        let after = store.load().await.unwrap().unwrap();
        assert_eq!(after.entities.len(), state.entities.len());
        for (key, record) in &state.entities {
            assert_eq!(after.entities[key].id, record.id);
        }
    }

    #[tokio::test]
    async fn test_removed_entities_are_deleted() {
        let api = MemoryControlPlane::new();
        let (store, _temp) = store();
        let config = parse(CONFIG);
        Reconciler::new(&config, &store, &api).reconcile().await.unwrap();

        let smaller = parse("groups:\n  - name: eng\n    users: [u-1, u-2]\n");
        let result = Reconciler::new(&smaller, &store, &api).reconcile().await.unwrap();

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.deleted, 5);
        let memory = api.state();
        assert!(memory.sites.is_empty());
        assert!(memory.dns.is_empty());
        assert!(memory.resources.is_empty());
        assert!(memory.resource_groups.is_empty());
        assert_eq!(memory.groups.len(), 1);
    }

    #[tokio::test]
    async fn test_vanished_group_is_recreated() {
        let api = MemoryControlPlane::new();
        let (store, _temp) = store();
        let config = parse("groups:\n  - name: eng\n    users: [u-1]\n");
        let reconciler = Reconciler::new(&config, &store, &api).with_ids(SequentialIds::new("g"));
        reconciler.reconcile().await.unwrap();

        api.drop_group("g-1");
        let result = reconciler.reconcile().await.unwrap();

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.created, 1);
        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.id_of(EntityKind::Group, "eng"), Some("g-2"));
        assert_eq!(api.state().members["g-2"].len(), 1);
    }

    #[tokio::test]
    async fn test_drift_detection() {
        let api = MemoryControlPlane::new();
        let (store, _temp) = store();
        let config = parse(CONFIG);
        let reconciler = Reconciler::new(&config, &store, &api);
        reconciler.reconcile().await.unwrap();
        assert!(reconciler.check_drift().await.unwrap().is_converged());

        let group_id = store
            .load()
            .await
            .unwrap()
            .unwrap()
            .id_of(EntityKind::Group, "eng")
            .unwrap()
            .to_string();
        api.state().members.get_mut(&group_id).unwrap().insert(String::from("intruder"));

        let report = reconciler.check_drift().await.unwrap();
        assert!(report.has_drift);
        assert_eq!(report.drifted_resources.len(), 1);
        assert!(report.drifted_resources[0].contains("eng"));
    }

    #[tokio::test]
    async fn test_destroy_removes_everything() {
        let api = MemoryControlPlane::new();
        let (store, _temp) = store();
        let config = parse(CONFIG);
        let reconciler = Reconciler::new(&config, &store, &api);
        reconciler.reconcile().await.unwrap();

        let result = reconciler.destroy().await.unwrap();
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.deleted, 6);

        let state = store.load().await.unwrap().unwrap();
        assert_eq!(state.entity_count(), 0);
        assert_eq!(
            state.history.last().map(|h| h.operation),
            Some(DeploymentOperation::Destroy)
        );
        assert_eq!(api.state().groups.len(), 0);
    }

    #[tokio::test]
    async fn test_locked_state_blocks_apply() {
        let api = MemoryControlPlane::new();
        let (store, _temp) = store();
        let config = parse(CONFIG);
        store.acquire_lock("someone-else", "apply").await.unwrap();

        let err = Reconciler::new(&config, &store, &api)
            .reconcile()
            .await
            .unwrap_err();
        assert!(matches!(err, BowtieError::State(StateError::LockedByOther { .. })));
        assert!(api.calls().is_empty());
    }
}
