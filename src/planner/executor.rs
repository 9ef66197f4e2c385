//! Plan executor for applying deployment plans.
//!
//! Actions run one at a time in plan order. State is updated after each
//! successful action so a partial run still records what was applied.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, error, info, warn};

use crate::api::{ControlPlane, GroupPayload};
use crate::error::{BowtieError, Result};
use crate::state::{
    DeploymentHistoryEntry, DeploymentOperation, DeploymentState, EntityKind, record_key,
};

use super::diff::EntityPayload;
use super::membership::MembershipSync;
use super::plan::{ActionType, DeploymentPlan, PlannedAction};

/// Executor for deployment plans.
pub struct PlanExecutor<'a> {
    /// Remote control plane.
    api: &'a dyn ControlPlane,
    /// Operation recorded in history.
    operation: DeploymentOperation,
    /// Whether to continue on errors.
    continue_on_error: bool,
}

/// Result of executing a single action.
#[derive(Debug)]
pub struct ActionResult {
    /// Action index.
    pub index: usize,
    /// Action that was executed.
    pub action: PlannedAction,
    /// Whether the action succeeded.
    pub success: bool,
    /// Whether the action was skipped because a dependency failed.
    pub skipped: bool,
    /// Error message (if failed).
    pub error: Option<String>,
}

/// Result of executing the entire plan.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Individual action results.
    pub results: Vec<ActionResult>,
    /// Total actions executed.
    pub total_executed: usize,
    /// Number of successful actions.
    pub successful: usize,
    /// Number of failed actions.
    pub failed: usize,
    /// Number of skipped actions (due to dependency failures).
    pub skipped: usize,
    /// Whether the entire plan succeeded.
    pub success: bool,
}

impl std::fmt::Debug for PlanExecutor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("operation", &self.operation)
            .field("continue_on_error", &self.continue_on_error)
            .finish_non_exhaustive()
    }
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(api: &'a dyn ControlPlane) -> Self {
        Self {
            api,
            operation: DeploymentOperation::Apply,
            continue_on_error: false,
        }
    }

    /// Sets whether to continue on errors.
    #[must_use]
    pub const fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Sets the operation recorded in history.
    #[must_use]
    pub const fn with_operation(mut self, operation: DeploymentOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Executes a deployment plan.
    ///
    /// Individual action failures are reported in the result, not as errors.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures outside individual actions.
    pub async fn execute(
        &self,
        plan: &DeploymentPlan,
        state: &mut DeploymentState,
    ) -> Result<ExecutionResult> {
        info!("Executing plan with {} actions", plan.actions.len());

        if plan.actions.is_empty() {
            return Ok(ExecutionResult {
                results: vec![],
                total_executed: 0,
                successful: 0,
                failed: 0,
                skipped: 0,
                success: true,
            });
        }

        let mut results = Vec::new();
        let mut failed_indices: HashSet<usize> = HashSet::new();

        for (idx, action) in plan.actions.iter().enumerate() {
            if action.dependencies.iter().any(|dep| failed_indices.contains(dep)) {
                warn!("Skipping {} due to failed dependencies", action.description());
                results.push(ActionResult {
                    index: idx,
                    action: action.clone(),
                    success: false,
                    skipped: true,
                    error: Some(String::from("Skipped due to dependency failure")),
                });
                failed_indices.insert(idx);
                continue;
            }

            let result = self.execute_action(idx, action, state).await;

            if !result.success {
                failed_indices.insert(idx);
                if !self.continue_on_error {
                    results.push(result);
                    break;
                }
            }

            results.push(result);
        }

        let successful = results.iter().filter(|r| r.success).count();
        let skipped = results.iter().filter(|r| r.skipped).count();
        let failed = results.len() - successful - skipped;

        let execution_result = ExecutionResult {
            total_executed: results.len(),
            successful,
            failed,
            skipped,
            success: failed == 0 && skipped == 0,
            results,
        };

        let entities = plan
            .actions
            .iter()
            .map(|a| record_key(a.kind, &a.name))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let history_entry = if execution_result.success {
            DeploymentHistoryEntry::new(self.operation, &plan.config_hash, entities)
        } else {
            DeploymentHistoryEntry::failed(
                self.operation,
                &plan.config_hash,
                entities,
                &format!("{} actions failed", execution_result.failed),
            )
        };
        state.add_history(history_entry);
        state.config_hash.clone_from(&plan.config_hash);

        Ok(execution_result)
    }

    /// Executes a single action.
    async fn execute_action(
        &self,
        index: usize,
        action: &PlannedAction,
        state: &mut DeploymentState,
    ) -> ActionResult {
        info!("Executing action {}: {}", index, action.description());

        let outcome = match action.action_type {
            ActionType::Create | ActionType::Update => self.execute_upsert(action, state).await,
            ActionType::Delete => self.execute_delete(action, state).await,
            ActionType::SyncMembership => self.execute_membership(action, state).await,
        };

        match outcome {
            Ok(()) => ActionResult {
                index,
                action: action.clone(),
                success: true,
                skipped: false,
                error: None,
            },
            Err(e) => {
                error!("Failed to {} {} {}: {}", action.action_type, action.kind, action.name, e);
                ActionResult {
                    index,
                    action: action.clone(),
                    success: false,
                    skipped: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Sends the full payload and records the entity.
    async fn execute_upsert(&self, action: &PlannedAction, state: &mut DeploymentState) -> Result<()> {
        let Some(payload) = &action.payload else {
            return Err(BowtieError::internal(format!(
                "{} has no payload",
                action.description()
            )));
        };

        let mut assigned_id = None;
        match payload {
            EntityPayload::Site(site) => self.api.upsert_site(site).await?,
            EntityPayload::SiteRange(range) => self.api.upsert_site_range(range).await?,
            EntityPayload::Dns(policy) => self.api.upsert_dns(policy).await?,
            EntityPayload::DnsBlockList(list) => self.api.upsert_dns_block_list(list).await?,
            EntityPayload::Group(group) => {
                let id = self.api.upsert_group(group).await?;
                if !id.is_empty() && id != group.id {
                    warn!("Controller assigned id {id} to group {} (sent {})", group.name, group.id);
                    assigned_id = Some(id);
                }
            }
            EntityPayload::Resource(resource) => {
                self.api.upsert_resource(resource).await?;
            }
            EntityPayload::ResourceGroup(group) => self.api.upsert_resource_group(group).await?,
        }

        if let Some(record) = &action.record {
            let mut record = record.clone();
            if let Some(id) = assigned_id {
                record.id = id;
            }
            info!("{} {} {} ({})", action.action_type, action.kind, action.name, record.id);
            state.set(record);
        }
        Ok(())
    }

    /// Deletes an entity; one that is already gone counts as deleted.
    async fn execute_delete(&self, action: &PlannedAction, state: &mut DeploymentState) -> Result<()> {
        let id = action.id.as_str();
        let outcome = match action.kind {
            EntityKind::Site => self.api.delete_site(id).await,
            EntityKind::SiteRange => match &action.parent_id {
                Some(site_id) => self.api.delete_site_range(site_id, id).await,
                None => {
                    debug!("Site range {} has no recorded site, dropping record", action.name);
                    Ok(())
                }
            },
            EntityKind::Dns => self.api.delete_dns(id).await,
            EntityKind::DnsBlockList => self.api.delete_dns_block_list(id).await,
            EntityKind::Group => self.api.delete_group(id).await,
            EntityKind::Resource => self.api.delete_resource(id).await,
            EntityKind::ResourceGroup => self.api.delete_resource_group(id).await,
        };

        match outcome {
            Ok(()) => info!("Deleted {} {} ({id})", action.kind, action.name),
            Err(e) if e.is_entity_gone() => {
                info!("{} {} was already deleted", action.kind, action.name);
            }
            Err(e) => return Err(e),
        }

        state.remove(action.kind, &action.name);
        Ok(())
    }

    /// Applies a membership change, recreating the group if it vanished.
    ///
    /// The group id is read from state, so an id the controller assigned
    /// during the group's own upsert is the one used.
    async fn execute_membership(
        &self,
        action: &PlannedAction,
        state: &mut DeploymentState,
    ) -> Result<()> {
        let Some(sync) = &action.membership else {
            return Ok(());
        };
        let group_id = state
            .id_of(EntityKind::Group, &action.name)
            .unwrap_or(&action.id)
            .to_string();

        match self.sync_members(&group_id, sync).await {
            Err(e) if e.is_entity_gone() => {
                warn!("Group {} vanished during apply, recreating", action.name);
                let members = action.members.clone().unwrap_or_default();
                let returned = self
                    .api
                    .upsert_group(&GroupPayload {
                        id: group_id.clone(),
                        name: action.name.clone(),
                    })
                    .await?;
                let group_id = if returned.is_empty() { group_id } else { returned };
                self.api.set_group_membership(&group_id, &members).await?;
                if let Some(record) = state.get(EntityKind::Group, &action.name)
                    && record.id != group_id
                {
                    let mut record = record.clone();
                    record.id = group_id;
                    state.set(record);
                }
                Ok(())
            }
            other => other,
        }
    }

    async fn sync_members(&self, group_id: &str, sync: &MembershipSync) -> Result<()> {
        match sync {
            MembershipSync::Incremental(delta) => {
                if !delta.to_add.is_empty() {
                    self.api.add_group_members(group_id, &delta.to_add).await?;
                }
                if !delta.to_remove.is_empty() {
                    self.api.remove_group_members(group_id, &delta.to_remove).await?;
                }
                Ok(())
            }
            MembershipSync::Replace(users) => self.api.set_group_membership(group_id, users).await,
        }
    }
}

impl ExecutionResult {
    /// Returns true if all actions succeeded.
    #[must_use]
    pub const fn all_successful(&self) -> bool {
        self.success && self.failed == 0 && self.skipped == 0
    }

    /// Error messages of failed actions.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.success && !r.skipped)
            .filter_map(|r| {
                r.error
                    .as_ref()
                    .map(|e| format!("{}: {e}", r.action.description()))
            })
            .collect()
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Executed {} actions: {} successful, {} failed, {} skipped",
            self.total_executed, self.successful, self.failed, self.skipped
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::MemoryControlPlane;
    use crate::api::{ObservedState, SiteRangePayload};
    use crate::config::ConfigParser;
    use crate::planner::diff::DiffEngine;
    use crate::planner::identity::SequentialIds;
    use crate::planner::membership::MembershipDelta;
    use crate::state::EntityRecord;

    fn plan_for(yaml: &str, state: Option<&DeploymentState>) -> DeploymentPlan {
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let mut ids = SequentialIds::new("id");
        let diff = DiffEngine::new()
            .compute_diff(&config, state, &ObservedState::default(), &mut ids)
            .unwrap();
        DeploymentPlan::from_diff(&diff, "cfg")
    }

    fn action(action_type: ActionType, kind: EntityKind, name: &str, id: &str) -> PlannedAction {
        PlannedAction {
            action_type,
            kind,
            name: name.to_string(),
            id: id.to_string(),
            parent_id: None,
            payload: None,
            membership: None,
            members: None,
            record: None,
            reason: String::new(),
            new_hash: None,
            dependencies: vec![],
        }
    }

    fn orphan_range() -> PlannedAction {
        PlannedAction {
            payload: Some(EntityPayload::SiteRange(SiteRangePayload {
                id: String::from("r-1"),
                site_id: String::from("missing-site"),
                name: String::from("lan"),
                description: String::new(),
                range: String::from("10.0.0.0/8"),
                is_v4: true,
                is_v6: false,
                weight: 0,
                metric: 0,
            })),
            ..action(ActionType::Create, EntityKind::SiteRange, "office/lan", "r-1")
        }
    }

    fn plan_of(actions: Vec<PlannedAction>) -> DeploymentPlan {
        DeploymentPlan {
            actions,
            ..DeploymentPlan::empty("cfg")
        }
    }

    #[tokio::test]
    async fn test_apply_records_entities() {
        let api = MemoryControlPlane::new();
        let plan = plan_for(
            "sites:\n  - name: office\n    ranges:\n      - name: lan\n        ipv4_range: 10.0.0.0/8\ngroups:\n  - name: eng\n    users: [u-1, u-2]\n",
            None,
        );
        let mut state = DeploymentState::new();

        let result = PlanExecutor::new(&api).execute(&plan, &mut state).await.unwrap();

        assert!(result.all_successful(), "{:?}", result.errors());
        assert_eq!(state.entity_count(), 3);
        assert_eq!(state.config_hash, "cfg");
        assert!(state.history[0].success);

        let group_id = state.id_of(EntityKind::Group, "eng").unwrap().to_string();
        assert_eq!(api.state().members[&group_id].len(), 2);
        assert_eq!(api.state().sites.values().next().unwrap().ranges_v4.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_gone_entity_succeeds() {
        let api = MemoryControlPlane::new();
        let mut state = DeploymentState::new();
        state.set(EntityRecord::new(EntityKind::Dns, "old", "d-1", "h"));
        let plan = plan_for("{}", Some(&state));

        let result = PlanExecutor::new(&api).execute(&plan, &mut state).await.unwrap();

        assert!(result.all_successful());
        assert_eq!(api.calls(), vec!["delete_dns d-1"]);
        assert_eq!(state.entity_count(), 0);
    }

    #[tokio::test]
    async fn test_dns_block_list_upsert_then_delete() {
        let api = MemoryControlPlane::new();
        let plan = plan_for(
            "dns_block_lists:\n  - name: ads\n    upstream: https://lists.example.com/ads.txt\n    override_to_allow: [a.example.com]\n",
            None,
        );
        let mut state = DeploymentState::new();

        let result = PlanExecutor::new(&api).execute(&plan, &mut state).await.unwrap();
        assert!(result.all_successful(), "{:?}", result.errors());
        assert_eq!(state.id_of(EntityKind::DnsBlockList, "ads"), Some("id-1"));
        assert_eq!(
            api.state().dns_block_lists["id-1"].override_to_allow,
            vec!["a.example.com"]
        );

        api.clear_calls();
        let plan = plan_for("{}", Some(&state));
        let result = PlanExecutor::new(&api).execute(&plan, &mut state).await.unwrap();
        assert!(result.all_successful(), "{:?}", result.errors());
        assert_eq!(api.calls(), vec!["delete_dns_block_list id-1"]);
        assert!(api.state().dns_block_lists.is_empty());
        assert_eq!(state.entity_count(), 0);
    }

    #[tokio::test]
    async fn test_vanished_group_is_recreated_for_membership() {
        let api = MemoryControlPlane::new();
        let users: BTreeSet<String> = ["u-1", "u-2"].iter().map(|s| (*s).to_string()).collect();
        let sync = PlannedAction {
            membership: Some(MembershipSync::Incremental(MembershipDelta {
                to_add: ["u-2"].iter().map(|s| (*s).to_string()).collect(),
                to_remove: BTreeSet::new(),
            })),
            members: Some(users),
            ..action(ActionType::SyncMembership, EntityKind::Group, "eng", "g-1")
        };
        let mut state = DeploymentState::new();

        let result = PlanExecutor::new(&api)
            .execute(&plan_of(vec![sync]), &mut state)
            .await
            .unwrap();

        assert!(result.all_successful(), "{:?}", result.errors());
        assert_eq!(
            api.calls(),
            vec![
                "add_group_members g-1 1",
                "upsert_group g-1",
                "set_group_membership g-1 2",
            ]
        );
    }

    #[tokio::test]
    async fn test_membership_uses_id_assigned_by_controller() {
        let api = MemoryControlPlane::new();
        api.assign_group_ids("srv-");
        let plan = plan_for("groups:\n  - name: eng\n    users: [u-1, u-2]\n", None);
        let mut state = DeploymentState::new();

        let result = PlanExecutor::new(&api).execute(&plan, &mut state).await.unwrap();

        assert!(result.all_successful(), "{:?}", result.errors());
        assert_eq!(
            api.calls(),
            vec!["upsert_group id-1", "set_group_membership srv-id-1 2"]
        );
        assert_eq!(state.id_of(EntityKind::Group, "eng"), Some("srv-id-1"));
        assert_eq!(api.state().members["srv-id-1"].len(), 2);
        assert!(!api.state().groups.contains_key("id-1"));
    }

    #[tokio::test]
    async fn test_failure_stops_execution() {
        let api = MemoryControlPlane::new();
        let group = PlannedAction {
            payload: Some(EntityPayload::Group(GroupPayload {
                id: String::from("g-1"),
                name: String::from("eng"),
            })),
            ..action(ActionType::Create, EntityKind::Group, "eng", "g-1")
        };
        let plan = plan_of(vec![orphan_range(), group]);
        let mut state = DeploymentState::new();

        let result = PlanExecutor::new(&api).execute(&plan, &mut state).await.unwrap();
        assert_eq!(result.total_executed, 1);
        assert_eq!(result.failed, 1);
        assert!(api.state().groups.is_empty());
        assert!(!state.history[0].success);

        let result = PlanExecutor::new(&api)
            .with_continue_on_error(true)
            .execute(&plan, &mut state)
            .await
            .unwrap();
        assert_eq!(result.total_executed, 2);
        assert_eq!(result.successful, 1);
        assert_eq!(result.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_dependents_of_failed_actions_are_skipped() {
        let api = MemoryControlPlane::new();
        let sync = PlannedAction {
            membership: Some(MembershipSync::Replace(BTreeSet::new())),
            dependencies: vec![0],
            ..action(ActionType::SyncMembership, EntityKind::Group, "eng", "g-1")
        };
        let plan = plan_of(vec![orphan_range(), sync]);
        let mut state = DeploymentState::new();

        let result = PlanExecutor::new(&api)
            .with_continue_on_error(true)
            .execute(&plan, &mut state)
            .await
            .unwrap();

        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 1);
        assert!(result.results[1].skipped);
    }
}
