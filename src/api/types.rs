//! Bowtie API types and data structures.
//!
//! This module defines the JSON shapes exchanged with the control-plane API.
//! Polymorphic fields (`location`, `ports`) live in [`super::codec`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::codec::{ResourceLocation, ResourcePorts};

/// A site (physical or logical network location).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    /// Site identifier.
    pub id: String,
    /// Site name.
    pub name: String,
    /// IPv4 ranges routable through this site.
    #[serde(default, rename = "routable_ranges_v4")]
    pub ranges_v4: Vec<RoutableRange>,
    /// IPv6 ranges routable through this site.
    #[serde(default, rename = "routable_ranges_v6")]
    pub ranges_v6: Vec<RoutableRange>,
}

/// Organization listing; the only place sites are enumerated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Organization {
    /// Sites of the organization.
    #[serde(default)]
    pub sites: Vec<Site>,
}

/// Site upsert payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitePayload {
    /// Site identifier.
    pub id: String,
    /// Site name.
    pub name: String,
}

/// A routable IP range as reported inside a [`Site`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutableRange {
    /// Range identifier.
    pub id: String,
    /// Range name.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// CIDR notation.
    #[serde(default)]
    pub range: String,
    /// Routing weight.
    #[serde(default)]
    pub weight: i64,
    /// Routing metric.
    #[serde(default)]
    pub metric: i64,
}

/// Site range upsert payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRangePayload {
    /// Range identifier.
    pub id: String,
    /// Owning site.
    pub site_id: String,
    /// Range name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// CIDR notation.
    pub range: String,
    /// Whether `range` is IPv4.
    pub is_v4: bool,
    /// Whether `range` is IPv6.
    pub is_v6: bool,
    /// Routing weight.
    pub weight: i64,
    /// Routing metric.
    pub metric: i64,
}

impl SiteRangePayload {
    /// Rebuilds the upsert payload from an observed range of a site.
    #[must_use]
    pub fn from_observed(site_id: &str, range: &RoutableRange, is_v4: bool) -> Self {
        Self {
            id: range.id.clone(),
            site_id: site_id.to_string(),
            name: range.name.clone(),
            description: range.description.clone(),
            range: range.range.clone(),
            is_v4,
            is_v6: !is_v4,
            weight: range.weight,
            metric: range.metric,
        }
    }
}

/// Upstream DNS server of a DNS policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsServer {
    /// Server identifier.
    pub id: String,
    /// Server address.
    pub addr: String,
    /// Priority position.
    pub order: usize,
}

/// Name excluded from DNS64 resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsExclude {
    /// Exclusion identifier.
    pub id: String,
    /// Excluded name.
    pub name: String,
    /// Display position.
    pub order: usize,
}

/// DNS policy for a zone. Also used as the upsert payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsPolicy {
    /// Policy identifier.
    pub id: String,
    /// DNS zone name.
    pub name: String,
    /// Upstream servers, ordered by priority.
    #[serde(default)]
    pub servers: Vec<DnsServer>,
    /// Sites resolution is limited to.
    #[serde(default)]
    pub include_only_sites: Vec<String>,
    /// Resolve names using DNS64.
    #[serde(default)]
    pub is_dns64: bool,
    /// Only count metrics for this domain.
    #[serde(default)]
    pub is_counted: bool,
    /// Log all requests for this domain.
    #[serde(default)]
    pub is_log: bool,
    /// Drop A record responses.
    #[serde(default)]
    pub is_drop_a: bool,
    /// Drop every response.
    #[serde(default)]
    pub is_drop_all: bool,
    /// Treat as a search domain.
    #[serde(default)]
    pub is_search_domain: bool,
    /// Names excluded from DNS64, ordered.
    #[serde(default)]
    pub dns64_exclude: Vec<DnsExclude>,
}

/// Remote block list feeding DNS filtering. Also used as the upsert payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsBlockList {
    /// Block list identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// URL the list is fetched from.
    pub upstream: String,
    /// Names allowed even when the upstream list blocks them, ordered.
    #[serde(default)]
    pub override_to_allow: Vec<String>,
}

/// A user group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier.
    pub id: String,
    /// Group name.
    pub name: String,
    /// Member user ids, when the endpoint includes them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<String>,
}

/// Group upsert payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPayload {
    /// Group identifier.
    pub id: String,
    /// Group name.
    pub name: String,
}

/// Reference to a user inside membership payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User identifier.
    pub id: String,
}

/// Incremental membership change payload.
#[derive(Debug, Clone, Serialize)]
pub struct ModifyGroupUsersPayload {
    /// Target group.
    pub group_id: String,
    /// Users to add or remove.
    pub users: Vec<UserRef>,
}

/// Incremental membership change response (user id -> applied).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModifyGroupUsersResponse {
    /// Per-user outcome.
    #[serde(default)]
    pub users: HashMap<String, bool>,
}

/// Wholesale membership replacement payload.
#[derive(Debug, Clone, Serialize)]
pub struct SetMembershipPayload {
    /// Complete member list.
    pub users: Vec<UserRef>,
}

/// Converts a set of user ids into membership references.
#[must_use]
pub fn user_refs<'a>(ids: impl IntoIterator<Item = &'a String>) -> Vec<UserRef> {
    ids.into_iter().map(|id| UserRef { id: id.clone() }).collect()
}

/// An access resource. Also used as the upsert payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier.
    pub id: String,
    /// Resource name.
    pub name: String,
    /// Protocol (`http`, `https`, `tcp`, ...).
    pub protocol: String,
    /// Network location.
    pub location: ResourceLocation,
    /// Port specification.
    #[serde(default)]
    pub ports: ResourcePorts,
}

/// A group of resources. Also used as the upsert payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    /// Resource group identifier.
    pub id: String,
    /// Resource group name.
    pub name: String,
    /// Inherited resource groups.
    #[serde(default)]
    pub inherited: Vec<String>,
    /// Member resources.
    #[serde(default)]
    pub resources: Vec<String>,
}

impl ResourceGroup {
    /// Member resources as a set.
    #[must_use]
    pub fn resource_set(&self) -> BTreeSet<String> {
        self.resources.iter().cloned().collect()
    }

    /// Inherited groups as a set.
    #[must_use]
    pub fn inherited_set(&self) -> BTreeSet<String> {
        self.inherited.iter().cloned().collect()
    }
}

/// An access policy. Only its identity is managed here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy identifier.
    pub id: String,
}

/// Combined response of the policy endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicySnapshot {
    /// Policies by id.
    #[serde(default)]
    pub policies: HashMap<String, Policy>,
    /// Resource groups by id.
    #[serde(default)]
    pub resource_groups: HashMap<String, ResourceGroup>,
    /// Resources by id.
    #[serde(default)]
    pub resources: HashMap<String, Resource>,
}

/// Login request body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginPayload {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_ranges_field_names() {
        let site: Site = serde_json::from_str(
            r#"{
                "id": "s1",
                "name": "Office",
                "routable_ranges_v4": [{"id": "r1", "range": "10.0.0.0/16", "weight": 1, "metric": 255}]
            }"#,
        )
        .unwrap();

        assert_eq!(site.ranges_v4.len(), 1);
        assert_eq!(site.ranges_v4[0].metric, 255);
        assert!(site.ranges_v6.is_empty());
    }

    #[test]
    fn test_policy_snapshot_decodes_polymorphic_resources() {
        let snapshot: PolicySnapshot = serde_json::from_str(
            r#"{
                "policies": {"p1": {"id": "p1"}},
                "resource_groups": {},
                "resources": {
                    "r1": {"id": "r1", "name": "a", "protocol": "http",
                           "location": {"dns": "a.local"}, "ports": {"range": [80, 80]}},
                    "r2": {"id": "r2", "name": "b", "protocol": "tcp",
                           "location": {"type": "cidr", "value": "10.0.0.0/8"},
                           "ports": {"collection": {"ports": [22]}}}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(snapshot.resources["r1"].location, ResourceLocation::dns("a.local"));
        assert_eq!(
            snapshot.resources["r2"].location,
            ResourceLocation::tagged("cidr", "10.0.0.0/8")
        );
        assert_eq!(snapshot.resources["r2"].ports, ResourcePorts::Collection(vec![22]));
    }

    #[test]
    fn test_group_users_omitted_when_empty() {
        let group = Group {
            id: String::from("g1"),
            name: String::from("eng"),
            users: vec![],
        };
        let value = serde_json::to_value(&group).unwrap();
        assert!(value.get("users").is_none());
    }
}
