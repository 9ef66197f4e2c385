//! Deployment plan types and construction.
//!
//! This module turns a diff into an ordered list of controller calls.
//! Deletes run first, dependents before what they depend on. Upserts follow
//! in dependency order: sites and their ranges, DNS policies and block
//! lists, groups and their membership, resources, then resource groups.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::state::{EntityKind, EntityRecord};

use super::diff::{DiffResult, DiffType, EntityPayload, ResourceDiff};
use super::membership::MembershipSync;

/// A complete deployment plan.
#[derive(Debug)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Configuration hash this plan is based on.
    pub config_hash: String,
    /// Planned actions in execution order.
    pub actions: Vec<PlannedAction>,
}

/// A single planned action.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    /// Action type.
    pub action_type: ActionType,
    /// Entity kind.
    pub kind: EntityKind,
    /// Declared name.
    pub name: String,
    /// Remote id.
    pub id: String,
    /// Owning entity id (site ranges).
    pub parent_id: Option<String>,
    /// Payload to upsert.
    pub payload: Option<EntityPayload>,
    /// Membership change (`SyncMembership` only).
    pub membership: Option<MembershipSync>,
    /// Declared members (`SyncMembership` only).
    pub members: Option<BTreeSet<String>>,
    /// Record to persist once the action succeeds.
    pub record: Option<EntityRecord>,
    /// Reason for this action.
    pub reason: String,
    /// New payload hash (if applicable).
    pub new_hash: Option<String>,
    /// Dependencies (action indices that must complete first).
    pub dependencies: Vec<usize>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    /// Create an entity.
    Create,
    /// Send the full payload of an existing entity.
    Update,
    /// Delete an entity.
    Delete,
    /// Bring group membership to the declared set.
    SyncMembership,
}

/// Position of a kind among deletes: dependents go first.
const fn delete_rank(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::ResourceGroup => 0,
        EntityKind::Resource => 1,
        EntityKind::Dns => 2,
        EntityKind::DnsBlockList => 3,
        EntityKind::SiteRange => 4,
        EntityKind::Site => 5,
        EntityKind::Group => 6,
    }
}

impl DeploymentPlan {
    /// Creates a new plan from a diff result.
    #[must_use]
    pub fn from_diff(diff: &DiffResult, config_hash: &str) -> Self {
        let mut actions = Vec::new();

        let mut deletes: Vec<&ResourceDiff> = diff
            .diffs
            .iter()
            .filter(|d| d.diff_type == DiffType::Delete)
            .collect();
        deletes.sort_by_key(|d| delete_rank(d.kind));
        for resource_diff in deletes {
            actions.push(PlannedAction {
                action_type: ActionType::Delete,
                kind: resource_diff.kind,
                name: resource_diff.name.clone(),
                id: resource_diff.id.clone(),
                parent_id: resource_diff.parent_id.clone(),
                payload: None,
                membership: None,
                members: None,
                record: None,
                reason: String::from("removed from configuration"),
                new_hash: None,
                dependencies: vec![],
            });
        }

        // Remote id -> index of the action that upserts it.
        let mut upserted: HashMap<String, usize> = HashMap::new();

        for kind in EntityKind::ALL {
            let mut of_kind: Vec<&ResourceDiff> = diff
                .diffs
                .iter()
                .filter(|d| d.kind == kind && d.is_actionable() && d.diff_type != DiffType::Delete)
                .collect();
            if kind == EntityKind::ResourceGroup {
                of_kind = order_by_inheritance(of_kind);
            }

            for resource_diff in of_kind {
                let group_index = Self::push_upsert(&mut actions, &mut upserted, resource_diff);

                if let Some(sync) = &resource_diff.membership {
                    actions.push(PlannedAction {
                        action_type: ActionType::SyncMembership,
                        kind,
                        name: resource_diff.name.clone(),
                        id: resource_diff.id.clone(),
                        parent_id: None,
                        payload: None,
                        membership: Some(sync.clone()),
                        members: resource_diff.members.clone(),
                        record: None,
                        reason: sync.describe(),
                        new_hash: None,
                        dependencies: group_index.into_iter().collect(),
                    });
                }
            }
        }

        Self {
            created_at: Utc::now(),
            config_hash: config_hash.to_string(),
            actions,
        }
    }

    /// Adds the create/update action of a diff, if its payload changed.
    fn push_upsert(
        actions: &mut Vec<PlannedAction>,
        upserted: &mut HashMap<String, usize>,
        resource_diff: &ResourceDiff,
    ) -> Option<usize> {
        let action_type = match resource_diff.diff_type {
            DiffType::Create => ActionType::Create,
            DiffType::Update => ActionType::Update,
            DiffType::Delete | DiffType::NoChange => return None,
        };

        let dependencies: BTreeSet<usize> = resource_diff
            .payload
            .as_ref()
            .map(references)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| upserted.get(id).copied())
            .collect();

        let index = actions.len();
        upserted.insert(resource_diff.id.clone(), index);
        actions.push(PlannedAction {
            action_type,
            kind: resource_diff.kind,
            name: resource_diff.name.clone(),
            id: resource_diff.id.clone(),
            parent_id: resource_diff.parent_id.clone(),
            payload: resource_diff.payload.clone(),
            membership: None,
            members: None,
            record: resource_diff.record.clone(),
            reason: reason(resource_diff),
            new_hash: resource_diff.new_hash.clone(),
            dependencies: dependencies.into_iter().collect(),
        });
        Some(index)
    }

    /// Creates an empty plan (no changes needed).
    #[must_use]
    pub fn empty(config_hash: &str) -> Self {
        Self {
            created_at: Utc::now(),
            config_hash: config_hash.to_string(),
            actions: vec![],
        }
    }

    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of actions of a type.
    #[must_use]
    pub fn count_of(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }
}

/// Ids a payload points at.
fn references(payload: &EntityPayload) -> Vec<String> {
    match payload {
        EntityPayload::SiteRange(range) => vec![range.site_id.clone()],
        EntityPayload::Dns(policy) => policy.include_only_sites.clone(),
        EntityPayload::ResourceGroup(group) => group
            .resources
            .iter()
            .chain(&group.inherited)
            .cloned()
            .collect(),
        EntityPayload::Site(_)
        | EntityPayload::DnsBlockList(_)
        | EntityPayload::Group(_)
        | EntityPayload::Resource(_) => vec![],
    }
}

/// Orders resource groups so inherited groups are upserted first.
///
/// Cycles are left in declaration order.
fn order_by_inheritance(groups: Vec<&ResourceDiff>) -> Vec<&ResourceDiff> {
    let pending_ids: BTreeSet<&str> = groups.iter().map(|d| d.id.as_str()).collect();
    let mut emitted: BTreeSet<&str> = BTreeSet::new();
    let mut remaining = groups;
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = remaining.into_iter().partition(|d| {
            let Some(EntityPayload::ResourceGroup(group)) = &d.payload else {
                return true;
            };
            group
                .inherited
                .iter()
                .all(|id| id == &d.id || !pending_ids.contains(id.as_str()) || emitted.contains(id.as_str()))
        });

        if ready.is_empty() {
            ordered.extend(blocked);
            break;
        }
        emitted.extend(ready.iter().map(|d| d.id.as_str()));
        ordered.extend(ready);
        remaining = blocked;
    }

    ordered
}

fn reason(resource_diff: &ResourceDiff) -> String {
    match resource_diff.diff_type {
        DiffType::Create => resource_diff
            .details
            .iter()
            .find(|d| d.field == "id")
            .and_then(|d| d.old_value.as_ref())
            .map_or_else(
                || String::from("declared in configuration"),
                |old| format!("recreating, {old}"),
            ),
        DiffType::Update => {
            let fields: Vec<&str> = resource_diff
                .details
                .iter()
                .map(|d| d.field.as_str())
                .filter(|f| *f != "users")
                .collect();
            if fields.is_empty() {
                String::from("payload changed")
            } else {
                format!("changed: {}", fields.join(", "))
            }
        }
        DiffType::Delete => String::from("removed from configuration"),
        DiffType::NoChange => String::new(),
    }
}

impl PlannedAction {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => format!("Create {} '{}'", self.kind, self.name),
            ActionType::Update => format!("Update {} '{}'", self.kind, self.name),
            ActionType::Delete => format!("Delete {} '{}' ({})", self.kind, self.name, self.id),
            ActionType::SyncMembership => format!("Sync members of group '{}'", self.name),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::SyncMembership => "sync",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.action_type, self.kind, self.name)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Plan ({} actions):", self.actions.len())?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }
        Ok(())
    }
}
