//! State types for tracking managed entities.
//!
//! The state records which remote identifier each declared entity was
//! assigned, so later runs update the same entity instead of creating a new
//! one, and so entities removed from the configuration can be deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::planner::OrderedItem;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
const MAX_HISTORY: usize = 100;

/// Kind of a managed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Site.
    Site,
    /// Routable range of a site.
    SiteRange,
    /// DNS policy.
    Dns,
    /// DNS block list.
    DnsBlockList,
    /// User group.
    Group,
    /// Access resource.
    Resource,
    /// Resource group.
    ResourceGroup,
}

impl EntityKind {
    /// All kinds in dependency order (dependencies first).
    pub const ALL: [Self; 7] = [
        Self::Site,
        Self::SiteRange,
        Self::Dns,
        Self::DnsBlockList,
        Self::Group,
        Self::Resource,
        Self::ResourceGroup,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::SiteRange => "site_range",
            Self::Dns => "dns",
            Self::DnsBlockList => "dns_block_list",
            Self::Group => "group",
            Self::Resource => "resource",
            Self::ResourceGroup => "resource_group",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The complete local state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentState {
    /// State format version.
    pub version: String,
    /// Hash of the last applied configuration.
    pub config_hash: String,
    /// Managed entities keyed by `<kind>/<name>`.
    #[serde(default)]
    pub entities: BTreeMap<String, EntityRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Apply history (recent entries).
    #[serde(default)]
    pub history: Vec<DeploymentHistoryEntry>,
}

/// A managed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity kind.
    pub kind: EntityKind,
    /// Declared name. Site ranges use `<site>/<range>`.
    pub name: String,
    /// Remote identifier.
    pub id: String,
    /// Owning entity id (site ranges).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Hash of the last payload sent.
    pub payload_hash: String,
    /// Ordered sub-collections as last sent, by collection name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub items: BTreeMap<String, Vec<OrderedItem>>,
    /// When the entity was last written.
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(kind: EntityKind, name: &str, id: &str, payload_hash: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            id: id.to_string(),
            parent_id: None,
            payload_hash: payload_hash.to_string(),
            items: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Sets the owning entity.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Records an ordered sub-collection.
    #[must_use]
    pub fn with_items(mut self, collection: &str, items: Vec<OrderedItem>) -> Self {
        self.items.insert(collection.to_string(), items);
        self
    }

    /// State key of this record.
    #[must_use]
    pub fn key(&self) -> String {
        record_key(self.kind, &self.name)
    }
}

/// Builds the state key of an entity.
#[must_use]
pub fn record_key(kind: EntityKind, name: &str) -> String {
    format!("{kind}/{name}")
}

/// A single entry in the apply history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentHistoryEntry {
    /// When the run occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: DeploymentOperation,
    /// Configuration hash at time of the run.
    pub config_hash: String,
    /// Entities affected.
    pub entities: Vec<String>,
    /// Whether the run succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of runs recorded in history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentOperation {
    /// Reconciliation towards the declared configuration.
    Apply,
    /// Removal of every managed entity.
    Destroy,
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeploymentState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            config_hash: String::new(),
            entities: BTreeMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a record by kind and name.
    #[must_use]
    pub fn get(&self, kind: EntityKind, name: &str) -> Option<&EntityRecord> {
        self.entities.get(&record_key(kind, name))
    }

    /// Gets the recorded id of an entity.
    #[must_use]
    pub fn id_of(&self, kind: EntityKind, name: &str) -> Option<&str> {
        self.get(kind, name).map(|r| r.id.as_str())
    }

    /// Adds or replaces a record.
    pub fn set(&mut self, record: EntityRecord) {
        self.entities.insert(record.key(), record);
        self.last_updated = Utc::now();
    }

    /// Removes a record.
    pub fn remove(&mut self, kind: EntityKind, name: &str) -> Option<EntityRecord> {
        let result = self.entities.remove(&record_key(kind, name));
        if result.is_some() {
            self.last_updated = Utc::now();
        }
        result
    }

    /// Records of one kind.
    pub fn records_of(&self, kind: EntityKind) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values().filter(move |r| r.kind == kind)
    }

    /// Number of managed entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Adds a history entry, dropping the oldest beyond the limit.
    pub fn add_history(&mut self, entry: DeploymentHistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }
}

impl DeploymentHistoryEntry {
    /// Creates a successful history entry.
    #[must_use]
    pub fn new(operation: DeploymentOperation, config_hash: &str, entities: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            entities,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(
        operation: DeploymentOperation,
        config_hash: &str,
        entities: Vec<String>,
        error: &str,
    ) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::new(operation, config_hash, entities)
        }
    }
}

impl fmt::Display for DeploymentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}
