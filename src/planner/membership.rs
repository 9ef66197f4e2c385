//! Unordered membership relations.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Members to add and remove to turn an observed set into a desired one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipDelta {
    /// `desired - observed`.
    pub to_add: BTreeSet<String>,
    /// `observed - desired`.
    pub to_remove: BTreeSet<String>,
}

impl MembershipDelta {
    /// Returns true if no member changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Number of individual membership changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }
}

impl fmt::Display for MembershipDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{} -{}", self.to_add.len(), self.to_remove.len())
    }
}

/// Computes the set difference in both directions.
#[must_use]
pub fn diff_membership(desired: &BTreeSet<String>, observed: &BTreeSet<String>) -> MembershipDelta {
    MembershipDelta {
        to_add: desired.difference(observed).cloned().collect(),
        to_remove: observed.difference(desired).cloned().collect(),
    }
}

/// How a group's membership is pushed to the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipMode {
    /// Add and remove endpoints.
    Incremental,
    /// Set-membership endpoint with the full desired set.
    Wholesale,
    /// Incremental when the delta is smaller than the desired set.
    #[default]
    Auto,
}

/// A membership change ready to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipSync {
    /// Apply a delta.
    Incremental(MembershipDelta),
    /// Replace membership with this set.
    Replace(BTreeSet<String>),
}

impl MembershipSync {
    /// Chooses how to bring `observed` to `desired`, or `None` if they match.
    ///
    /// With no observed membership (new group) the desired set is sent whole.
    #[must_use]
    pub fn plan(
        mode: MembershipMode,
        desired: &BTreeSet<String>,
        observed: Option<&BTreeSet<String>>,
    ) -> Option<Self> {
        let Some(observed) = observed else {
            return (!desired.is_empty()).then(|| Self::Replace(desired.clone()));
        };

        let delta = diff_membership(desired, observed);
        if delta.is_empty() {
            return None;
        }

        let incremental = match mode {
            MembershipMode::Incremental => true,
            MembershipMode::Wholesale => false,
            MembershipMode::Auto => delta.len() < desired.len(),
        };

        Some(if incremental {
            Self::Incremental(delta)
        } else {
            Self::Replace(desired.clone())
        })
    }

    /// Short description for plan output.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Incremental(delta) => format!("members {delta}"),
            Self::Replace(set) => format!("members = {}", set.len()),
        }
    }
}
