//! Diff engine for comparing desired vs observed state.
//!
//! For every declared entity the engine settles on a remote id, builds the
//! full upsert payload and compares it with what the controller currently
//! holds. Entities recorded in state but no longer declared become deletes.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::api::codec::ResourceLocation;
use crate::api::{
    DnsBlockList, DnsExclude, DnsPolicy, DnsServer, GroupPayload, ObservedState, Resource, ResourceGroup,
    SitePayload, SiteRangePayload,
};
use crate::config::{
    BowtieConfig, ConfigHasher, DnsBlockListConfig, DnsConfig, GroupConfig, ResourceConfig, ResourceGroupConfig,
    SiteConfig,
};
use crate::error::{ConfigError, PlanError, Result};
use crate::state::{DeploymentState, EntityKind, EntityRecord, record_key};

use super::identity::IdGenerator;
use super::membership::{MembershipSync, diff_membership};
use super::ordered::{OrderedItem, reconcile};

/// Collection name of DNS servers in state records.
pub const SERVERS: &str = "servers";
/// Collection name of DNS64 exclusions in state records.
pub const EXCLUDES: &str = "excludes";

/// Longest value shown in a diff detail.
const MAX_DETAIL_LEN: usize = 60;

/// Decision for one entity given its desired and observed payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityPlan<P> {
    /// Not present remotely; send the full payload.
    Create(P),
    /// Present but different; send the full payload.
    Update(P),
    /// Present and identical.
    NoOp,
}

/// Compares a desired payload with the observed one.
///
/// An absent observation always yields `Create`, whatever the content.
#[must_use]
pub fn plan<P: PartialEq + Clone>(desired: &P, observed: Option<&P>) -> EntityPlan<P> {
    match observed {
        None => EntityPlan::Create(desired.clone()),
        Some(current) if current == desired => EntityPlan::NoOp,
        Some(_) => EntityPlan::Update(desired.clone()),
    }
}

impl<P> EntityPlan<P> {
    /// The diff type this decision maps to.
    #[must_use]
    pub const fn diff_type(&self) -> DiffType {
        match self {
            Self::Create(_) => DiffType::Create,
            Self::Update(_) => DiffType::Update,
            Self::NoOp => DiffType::NoChange,
        }
    }
}

/// Upsert payload of any managed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EntityPayload {
    /// Site.
    Site(SitePayload),
    /// Site range.
    SiteRange(SiteRangePayload),
    /// DNS policy.
    Dns(DnsPolicy),
    /// DNS block list.
    DnsBlockList(DnsBlockList),
    /// Group (membership is handled separately).
    Group(GroupPayload),
    /// Resource.
    Resource(Resource),
    /// Resource group.
    ResourceGroup(ResourceGroup),
}

impl EntityPayload {
    /// Kind of the entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Site(_) => EntityKind::Site,
            Self::SiteRange(_) => EntityKind::SiteRange,
            Self::Dns(_) => EntityKind::Dns,
            Self::DnsBlockList(_) => EntityKind::DnsBlockList,
            Self::Group(_) => EntityKind::Group,
            Self::Resource(_) => EntityKind::Resource,
            Self::ResourceGroup(_) => EntityKind::ResourceGroup,
        }
    }

    /// Remote id carried by the payload.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Site(p) => &p.id,
            Self::SiteRange(p) => &p.id,
            Self::Dns(p) => &p.id,
            Self::DnsBlockList(p) => &p.id,
            Self::Group(p) => &p.id,
            Self::Resource(p) => &p.id,
            Self::ResourceGroup(p) => &p.id,
        }
    }
}

/// Engine for computing diffs between desired and observed states.
#[derive(Debug, Default)]
pub struct DiffEngine {
    /// Payload hasher.
    hasher: ConfigHasher,
}

/// Difference for a single entity.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Entity kind.
    pub kind: EntityKind,
    /// Declared name (`<site>/<range>` for site ranges).
    pub name: String,
    /// Remote id.
    pub id: String,
    /// Type of difference.
    pub diff_type: DiffType,
    /// Desired payload (absent for deletes).
    pub payload: Option<EntityPayload>,
    /// Pending membership change (groups).
    pub membership: Option<MembershipSync>,
    /// Declared members, when membership is managed and out of sync.
    pub members: Option<BTreeSet<String>>,
    /// Record to persist once the entity is applied.
    pub record: Option<EntityRecord>,
    /// Owning entity id (site ranges).
    pub parent_id: Option<String>,
    /// Field-level details, for display.
    pub details: Vec<DiffDetail>,
    /// Previous payload hash (if applicable).
    pub old_hash: Option<String>,
    /// New payload hash (if applicable).
    pub new_hash: Option<String>,
}

/// Type of difference detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    /// Entity needs to be created.
    Create,
    /// Entity needs to be updated.
    Update,
    /// Entity needs to be deleted.
    Delete,
    /// Entity payload is unchanged.
    NoChange,
}

/// Detail about a specific difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffDetail {
    /// Field that differs.
    pub field: String,
    /// Old value.
    pub old_value: Option<String>,
    /// New value.
    pub new_value: Option<String>,
}

/// Complete diff result.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// All entity diffs.
    pub diffs: Vec<ResourceDiff>,
    /// Number of entities to create.
    pub creates: usize,
    /// Number of entities to update (membership-only changes included).
    pub updates: usize,
    /// Number of entities to delete.
    pub deletes: usize,
    /// Number of unchanged entities.
    pub unchanged: usize,
}

/// Id settled on for a declared entity.
#[derive(Debug, Clone)]
struct Assigned {
    id: String,
    /// Recorded id that no longer exists remotely.
    gone: Option<String>,
}

/// A computed entity, before it is turned into a [`ResourceDiff`].
struct Entry {
    kind: EntityKind,
    name: String,
    assigned: Assigned,
    desired: EntityPayload,
    diff_type: DiffType,
    details: Vec<DiffDetail>,
    parent_id: Option<String>,
    items: BTreeMap<String, Vec<OrderedItem>>,
    membership: Option<MembershipSync>,
    members: Option<BTreeSet<String>>,
}

/// Working set of one diff computation.
struct DiffContext<'a, 'g> {
    hasher: &'a ConfigHasher,
    state: Option<&'a DeploymentState>,
    observed: &'a ObservedState,
    ids: &'g mut dyn IdGenerator,
    /// Id -> owner, to catch two entities claiming one id.
    claimed: HashMap<String, String>,
    declared: HashSet<String>,
    diffs: Vec<ResourceDiff>,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
        }
    }

    /// Computes the diff between the declared config and observed state.
    ///
    /// # Errors
    ///
    /// Returns an error if two entities resolve to the same id, a site
    /// range has no CIDR, or a resource location cannot be encoded.
    pub fn compute_diff(
        &self,
        config: &BowtieConfig,
        state: Option<&DeploymentState>,
        observed: &ObservedState,
        ids: &mut dyn IdGenerator,
    ) -> Result<DiffResult> {
        let mut ctx = DiffContext {
            hasher: &self.hasher,
            state,
            observed,
            ids,
            claimed: HashMap::new(),
            declared: HashSet::new(),
            diffs: Vec::new(),
        };

        let site_ids = ctx.diff_sites(&config.sites)?;
        ctx.diff_dns(&config.dns, &site_ids)?;
        ctx.diff_dns_block_lists(&config.dns_block_lists)?;
        ctx.diff_groups(&config.groups)?;
        let resource_ids = ctx.diff_resources(&config.resources)?;
        ctx.diff_resource_groups(&config.resource_groups, &resource_ids)?;
        ctx.diff_deletes();

        Ok(DiffResult::from_diffs(ctx.diffs))
    }

    /// Group ids whose membership must be observed before diffing.
    #[must_use]
    pub fn member_groups(config: &BowtieConfig, state: Option<&DeploymentState>) -> BTreeSet<String> {
        config
            .groups
            .iter()
            .filter(|group| group.users.is_some())
            .filter_map(|group| {
                group.id.clone().or_else(|| {
                    state
                        .and_then(|s| s.id_of(EntityKind::Group, &group.name))
                        .map(String::from)
                })
            })
            .collect()
    }
}

impl DiffContext<'_, '_> {
    /// Settles the id of a declared entity: explicit id, else the recorded id
    /// while it still exists remotely, else a fresh one.
    fn assign_id(
        &mut self,
        kind: EntityKind,
        name: &str,
        explicit: Option<&String>,
        exists: impl Fn(&str) -> bool,
    ) -> Result<Assigned> {
        let recorded = self.state.and_then(|s| s.id_of(kind, name));

        let assigned = match (explicit, recorded) {
            (Some(id), _) => Assigned {
                id: id.clone(),
                gone: None,
            },
            (None, Some(id)) if exists(id) => Assigned {
                id: id.to_string(),
                gone: None,
            },
            (None, Some(id)) => {
                debug!("{kind} {name}: recorded id {id} no longer exists");
                Assigned {
                    id: self.ids.generate(),
                    gone: Some(id.to_string()),
                }
            }
            (None, None) => Assigned {
                id: self.ids.generate(),
                gone: None,
            },
        };

        let owner = record_key(kind, name);
        if let Some(first) = self.claimed.get(&assigned.id) {
            return Err(PlanError::ConflictingIds {
                id: assigned.id,
                first: first.clone(),
                second: owner,
            }
            .into());
        }
        self.claimed.insert(assigned.id.clone(), owner.clone());
        self.declared.insert(owner);

        Ok(assigned)
    }

    fn push(&mut self, entry: Entry) {
        let new_hash = self.hasher.hash_payload(&entry.desired);
        let old_hash = self
            .state
            .and_then(|s| s.get(entry.kind, &entry.name))
            .map(|r| r.payload_hash.clone());

        let mut details = entry.details;
        if let Some(old_id) = &entry.assigned.gone {
            details.insert(
                0,
                DiffDetail {
                    field: String::from("id"),
                    old_value: Some(format!("{old_id} (gone)")),
                    new_value: Some(entry.assigned.id.clone()),
                },
            );
        }

        let mut record = EntityRecord::new(entry.kind, &entry.name, &entry.assigned.id, &new_hash);
        record.parent_id.clone_from(&entry.parent_id);
        record.items = entry.items;

        self.diffs.push(ResourceDiff {
            kind: entry.kind,
            name: entry.name,
            id: entry.assigned.id,
            diff_type: entry.diff_type,
            payload: Some(entry.desired),
            membership: entry.membership,
            members: entry.members,
            record: Some(record),
            parent_id: entry.parent_id,
            details,
            old_hash,
            new_hash: Some(new_hash),
        });
    }

    fn diff_sites(&mut self, sites: &[SiteConfig]) -> Result<HashMap<String, String>> {
        let observed = self.observed;
        let mut site_ids = HashMap::new();

        for site in sites {
            let assigned = self.assign_id(EntityKind::Site, &site.name, site.id.as_ref(), |id| {
                observed.sites.contains_key(id)
            })?;
            let site_id = assigned.id.clone();

            let desired = SitePayload {
                id: site_id.clone(),
                name: site.name.clone(),
            };
            let current = observed.sites.get(&site_id).map(|s| SitePayload {
                id: s.id.clone(),
                name: s.name.clone(),
            });

            self.push(Entry {
                kind: EntityKind::Site,
                name: site.name.clone(),
                assigned,
                diff_type: plan(&desired, current.as_ref()).diff_type(),
                details: field_details(current.as_ref(), &desired),
                desired: EntityPayload::Site(desired),
                parent_id: None,
                items: BTreeMap::new(),
                membership: None,
                members: None,
            });

            for range in &site.ranges {
                let name = format!("{}/{}", site.name, range.name);
                let assigned = self.assign_id(EntityKind::SiteRange, &name, range.id.as_ref(), |id| {
                    observed.site_range(&site_id, id).is_some()
                })?;
                let Some((cidr, is_v4)) = range.cidr() else {
                    return Err(ConfigError::validation(
                        format!("Site range '{name}' has no ipv4_range or ipv6_range"),
                        format!("sites.{}.ranges.{}", site.name, range.name),
                    )
                    .into());
                };

                let desired = SiteRangePayload {
                    id: assigned.id.clone(),
                    site_id: site_id.clone(),
                    name: range.name.clone(),
                    description: range.description.clone(),
                    range: cidr.to_string(),
                    is_v4,
                    is_v6: !is_v4,
                    weight: range.weight,
                    metric: range.metric,
                };
                let current = observed.site_range(&site_id, &assigned.id);

                self.push(Entry {
                    kind: EntityKind::SiteRange,
                    name,
                    assigned,
                    diff_type: plan(&desired, current.as_ref()).diff_type(),
                    details: field_details(current.as_ref(), &desired),
                    desired: EntityPayload::SiteRange(desired),
                    parent_id: Some(site_id.clone()),
                    items: BTreeMap::new(),
                    membership: None,
                    members: None,
                });
            }

            site_ids.insert(site.name.clone(), site_id);
        }

        Ok(site_ids)
    }

    fn diff_dns(&mut self, policies: &[DnsConfig], site_ids: &HashMap<String, String>) -> Result<()> {
        let observed = self.observed;

        for dns in policies {
            let assigned = self.assign_id(EntityKind::Dns, &dns.name, dns.id.as_ref(), |id| {
                observed.dns.contains_key(id)
            })?;
            let current = observed.dns.get(&assigned.id).map(normalize_dns);

            let prior_servers: Vec<OrderedItem> = current
                .iter()
                .flat_map(|p| &p.servers)
                .map(|s| OrderedItem::new(&s.id, &s.addr, s.order))
                .collect();
            let prior_excludes: Vec<OrderedItem> = current
                .iter()
                .flat_map(|p| &p.dns64_exclude)
                .map(|e| OrderedItem::new(&e.id, &e.name, e.order))
                .collect();

            let servers = reconcile(&dns.servers, &prior_servers, &mut *self.ids);
            let excludes = reconcile(&dns.excludes, &prior_excludes, &mut *self.ids);

            let desired = DnsPolicy {
                id: assigned.id.clone(),
                name: dns.name.clone(),
                servers: servers
                    .iter()
                    .map(|item| DnsServer {
                        id: item.id.clone(),
                        addr: item.value.clone(),
                        order: item.order,
                    })
                    .collect(),
                include_only_sites: dns
                    .include_only_sites
                    .iter()
                    .map(|site| resolve(site_ids, site))
                    .collect(),
                is_dns64: dns.is_dns64,
                is_counted: dns.is_counted,
                is_log: dns.is_log,
                is_drop_a: dns.is_drop_a,
                is_drop_all: dns.is_drop_all,
                is_search_domain: dns.is_search_domain,
                dns64_exclude: excludes
                    .iter()
                    .map(|item| DnsExclude {
                        id: item.id.clone(),
                        name: item.value.clone(),
                        order: item.order,
                    })
                    .collect(),
            };

            let mut items = BTreeMap::new();
            items.insert(SERVERS.to_string(), servers);
            items.insert(EXCLUDES.to_string(), excludes);

            self.push(Entry {
                kind: EntityKind::Dns,
                name: dns.name.clone(),
                assigned,
                diff_type: plan(&desired, current.as_ref()).diff_type(),
                details: field_details(current.as_ref(), &desired),
                desired: EntityPayload::Dns(desired),
                parent_id: None,
                items,
                membership: None,
                members: None,
            });
        }

        Ok(())
    }

    fn diff_dns_block_lists(&mut self, lists: &[DnsBlockListConfig]) -> Result<()> {
        let observed = self.observed;

        for list in lists {
            let assigned =
                self.assign_id(EntityKind::DnsBlockList, &list.name, list.id.as_ref(), |id| {
                    observed.dns_block_lists.contains_key(id)
                })?;

            let desired = DnsBlockList {
                id: assigned.id.clone(),
                name: list.name.clone(),
                upstream: list.upstream.clone(),
                override_to_allow: list.override_to_allow.clone(),
            };
            let current = observed.dns_block_lists.get(&assigned.id);

            self.push(Entry {
                kind: EntityKind::DnsBlockList,
                name: list.name.clone(),
                assigned,
                diff_type: plan(&desired, current).diff_type(),
                details: field_details(current, &desired),
                desired: EntityPayload::DnsBlockList(desired),
                parent_id: None,
                items: BTreeMap::new(),
                membership: None,
                members: None,
            });
        }

        Ok(())
    }

    fn diff_groups(&mut self, groups: &[GroupConfig]) -> Result<()> {
        let observed = self.observed;

        for group in groups {
            let assigned = self.assign_id(EntityKind::Group, &group.name, group.id.as_ref(), |id| {
                observed.groups.contains_key(id)
            })?;

            let desired = GroupPayload {
                id: assigned.id.clone(),
                name: group.name.clone(),
            };
            let current = observed.groups.get(&assigned.id).map(|g| GroupPayload {
                id: g.id.clone(),
                name: g.name.clone(),
            });

            let membership = group.users.as_ref().and_then(|users| {
                let members = current
                    .as_ref()
                    .map(|_| observed.group_members.get(&assigned.id).cloned().unwrap_or_default());
                MembershipSync::plan(group.membership_mode, users, members.as_ref())
            });

            let mut details = field_details(current.as_ref(), &desired);
            if let Some(sync) = &membership {
                details.push(DiffDetail {
                    field: String::from("users"),
                    old_value: None,
                    new_value: Some(sync.describe()),
                });
            }

            self.push(Entry {
                kind: EntityKind::Group,
                name: group.name.clone(),
                assigned,
                diff_type: plan(&desired, current.as_ref()).diff_type(),
                details,
                desired: EntityPayload::Group(desired),
                parent_id: None,
                items: BTreeMap::new(),
                members: membership.as_ref().and(group.users.clone()),
                membership,
            });
        }

        Ok(())
    }

    fn diff_resources(&mut self, resources: &[ResourceConfig]) -> Result<HashMap<String, String>> {
        let observed = self.observed;
        let mut resource_ids = HashMap::new();

        for resource in resources {
            let assigned = self.assign_id(
                EntityKind::Resource,
                &resource.name,
                resource.id.as_ref(),
                |id| observed.resources.contains_key(id),
            )?;

            let desired = Resource {
                id: assigned.id.clone(),
                name: resource.name.clone(),
                protocol: resource.protocol.clone(),
                location: ResourceLocation::try_from(&resource.location)?,
                ports: resource.ports.to_ports(),
            };
            let current = observed.resources.get(&assigned.id);

            resource_ids.insert(resource.name.clone(), assigned.id.clone());
            self.push(Entry {
                kind: EntityKind::Resource,
                name: resource.name.clone(),
                assigned,
                diff_type: plan(&desired, current).diff_type(),
                details: field_details(current, &desired),
                desired: EntityPayload::Resource(desired),
                parent_id: None,
                items: BTreeMap::new(),
                membership: None,
                members: None,
            });
        }

        Ok(resource_ids)
    }

    fn diff_resource_groups(
        &mut self,
        groups: &[ResourceGroupConfig],
        resource_ids: &HashMap<String, String>,
    ) -> Result<()> {
        let observed = self.observed;

        // Ids first: groups may inherit groups declared after them.
        let mut assigned_groups = Vec::with_capacity(groups.len());
        let mut group_ids = HashMap::new();
        for group in groups {
            let assigned = self.assign_id(
                EntityKind::ResourceGroup,
                &group.name,
                group.id.as_ref(),
                |id| observed.resource_groups.contains_key(id),
            )?;
            group_ids.insert(group.name.clone(), assigned.id.clone());
            assigned_groups.push((group, assigned));
        }

        for (group, assigned) in assigned_groups {
            let desired = ResourceGroup {
                id: assigned.id.clone(),
                name: group.name.clone(),
                inherited: resolve_set(&group_ids, &group.inherited),
                resources: resolve_set(resource_ids, &group.resources),
            };
            let current = observed
                .resource_groups
                .get(&assigned.id)
                .map(normalize_resource_group);

            let mut details = Vec::new();
            if let Some(current) = &current {
                if current.name != desired.name {
                    details.push(detail("name", &current.name, &desired.name));
                }
                for (field, delta) in [
                    (
                        "resources",
                        diff_membership(&desired.resource_set(), &current.resource_set()),
                    ),
                    (
                        "inherited",
                        diff_membership(&desired.inherited_set(), &current.inherited_set()),
                    ),
                ] {
                    if !delta.is_empty() {
                        details.push(DiffDetail {
                            field: field.to_string(),
                            old_value: Some(join(&delta.to_remove)),
                            new_value: Some(join(&delta.to_add)),
                        });
                    }
                }
            }

            self.push(Entry {
                kind: EntityKind::ResourceGroup,
                name: group.name.clone(),
                assigned,
                diff_type: plan(&desired, current.as_ref()).diff_type(),
                details,
                desired: EntityPayload::ResourceGroup(desired),
                parent_id: None,
                items: BTreeMap::new(),
                membership: None,
                members: None,
            });
        }

        Ok(())
    }

    /// Recorded entities that are no longer declared.
    fn diff_deletes(&mut self) {
        let Some(state) = self.state else { return };

        for record in state.entities.values() {
            if self.declared.contains(&record.key()) {
                continue;
            }

            let exists = self.remote_exists(record);
            debug!(
                "{} {} removed from configuration (remote: {})",
                record.kind,
                record.name,
                if exists { "present" } else { "gone" }
            );

            self.diffs.push(ResourceDiff {
                kind: record.kind,
                name: record.name.clone(),
                id: record.id.clone(),
                diff_type: DiffType::Delete,
                payload: None,
                membership: None,
                members: None,
                record: None,
                parent_id: record.parent_id.clone(),
                details: vec![DiffDetail {
                    field: record.kind.to_string(),
                    old_value: Some(if exists {
                        record.id.clone()
                    } else {
                        format!("{} (already gone)", record.id)
                    }),
                    new_value: None,
                }],
                old_hash: Some(record.payload_hash.clone()),
                new_hash: None,
            });
        }
    }

    fn remote_exists(&self, record: &EntityRecord) -> bool {
        let observed = self.observed;
        let id = record.id.as_str();
        match record.kind {
            EntityKind::Site => observed.sites.contains_key(id),
            EntityKind::SiteRange => record
                .parent_id
                .as_deref()
                .map_or_else(|| observed.range_owner(id).is_some(), |site| {
                    observed.site_range(site, id).is_some()
                }),
            EntityKind::Dns => observed.dns.contains_key(id),
            EntityKind::DnsBlockList => observed.dns_block_lists.contains_key(id),
            EntityKind::Group => observed.groups.contains_key(id),
            EntityKind::Resource => observed.resources.contains_key(id),
            EntityKind::ResourceGroup => observed.resource_groups.contains_key(id),
        }
    }
}

/// Resolves a reference by declared name; unknown names are literal ids.
fn resolve(ids: &HashMap<String, String>, reference: &str) -> String {
    ids.get(reference)
        .cloned()
        .unwrap_or_else(|| reference.to_string())
}

/// Resolves references into a sorted, de-duplicated list.
fn resolve_set(ids: &HashMap<String, String>, references: &[String]) -> Vec<String> {
    references
        .iter()
        .map(|r| resolve(ids, r))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Sorts sub-collections by `order` so positional comparison is meaningful.
fn normalize_dns(policy: &DnsPolicy) -> DnsPolicy {
    let mut policy = policy.clone();
    policy.servers.sort_by_key(|s| s.order);
    policy.dns64_exclude.sort_by_key(|e| e.order);
    policy
}

/// Membership lists are unordered on the controller.
fn normalize_resource_group(group: &ResourceGroup) -> ResourceGroup {
    ResourceGroup {
        id: group.id.clone(),
        name: group.name.clone(),
        inherited: group.inherited_set().into_iter().collect(),
        resources: group.resource_set().into_iter().collect(),
    }
}

fn join(values: &BTreeSet<String>) -> String {
    values.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn truncate(value: String) -> String {
    if value.chars().count() <= MAX_DETAIL_LEN {
        value
    } else {
        let head: String = value.chars().take(MAX_DETAIL_LEN - 3).collect();
        format!("{head}...")
    }
}

fn detail(field: &str, old: &str, new: &str) -> DiffDetail {
    DiffDetail {
        field: field.to_string(),
        old_value: Some(truncate(old.to_string())),
        new_value: Some(truncate(new.to_string())),
    }
}

/// Top-level fields whose JSON differs between two payloads.
fn field_details<T: Serialize>(current: Option<&T>, desired: &T) -> Vec<DiffDetail> {
    let Some(current) = current else {
        return Vec::new();
    };
    let (Ok(Value::Object(old)), Ok(Value::Object(new))) =
        (serde_json::to_value(current), serde_json::to_value(desired))
    else {
        return Vec::new();
    };

    new.iter()
        .filter(|(field, value)| old.get(*field) != Some(*value))
        .map(|(field, value)| DiffDetail {
            field: field.clone(),
            old_value: old.get(field).map(|v| truncate(v.to_string())),
            new_value: Some(truncate(value.to_string())),
        })
        .collect()
}

impl ResourceDiff {
    /// Returns true if applying this diff calls the controller.
    #[must_use]
    pub const fn is_actionable(&self) -> bool {
        !matches!(self.diff_type, DiffType::NoChange) || self.membership.is_some()
    }
}

impl DiffResult {
    fn from_diffs(diffs: Vec<ResourceDiff>) -> Self {
        let count = |t: DiffType| diffs.iter().filter(|d| d.diff_type == t).count();
        let membership_only = diffs
            .iter()
            .filter(|d| d.diff_type == DiffType::NoChange && d.membership.is_some())
            .count();

        Self {
            creates: count(DiffType::Create),
            updates: count(DiffType::Update) + membership_only,
            deletes: count(DiffType::Delete),
            unchanged: count(DiffType::NoChange) - membership_only,
            diffs,
        }
    }

    /// Returns true if there are any changes.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.creates > 0 || self.updates > 0 || self.deletes > 0
    }

    /// Returns the total number of changes.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    /// Filters to only diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ResourceDiff> {
        self.diffs.iter().filter(|d| d.is_actionable()).collect()
    }
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::NoChange => "no change",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.name, self.diff_type)?;
        if !self.details.is_empty() {
            let fields: Vec<&str> = self.details.iter().map(|d| d.field.as_str()).collect();
            write!(f, " ({})", fields.join(", "))?;
        }
        Ok(())
    }
}
