//! Planning module for reconciliation runs.
//!
//! This module settles remote identities, compares desired and observed
//! state, and turns the differences into an executable plan:
//! - Identity allocation for entities and ordered sub-items
//! - Positional reconciliation of ordered collections
//! - Membership set operations
//! - Diffing, plan construction and execution

mod diff;
mod executor;
mod identity;
mod membership;
mod ordered;
mod plan;

pub use diff::{
    DiffDetail, DiffEngine, DiffResult, DiffType, EXCLUDES, EntityPayload, EntityPlan,
    ResourceDiff, SERVERS, plan,
};
pub use executor::{ActionResult, ExecutionResult, PlanExecutor};
pub use identity::{IdGenerator, PriorId, SequentialIds, UuidV4, reconcile_identities};
pub use membership::{MembershipDelta, MembershipMode, MembershipSync, diff_membership};
pub use ordered::{OrderedItem, prior_slots, reconcile};
pub use plan::{ActionType, DeploymentPlan, PlannedAction};
