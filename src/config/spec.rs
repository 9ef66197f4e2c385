//! Declared configuration types.
//!
//! This module defines the structs that map to the `bowtie.yaml` file. Every
//! entity is identified by its `name`; an optional `id` pins the remote
//! identifier explicitly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::api::codec::{LocationSpec, ResourcePorts};
use crate::planner::MembershipMode;

/// Default state file location, relative to the config file.
pub const DEFAULT_STATE_PATH: &str = ".bowtie/state.json";

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BowtieConfig {
    /// Controller base URL (overridden by `BOWTIE_HOST`).
    #[serde(default)]
    pub host: Option<String>,
    /// Local state settings.
    #[serde(default)]
    pub state: StateConfig,
    /// Sites and their routable ranges.
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
    /// DNS policies.
    #[serde(default)]
    pub dns: Vec<DnsConfig>,
    /// DNS block lists.
    #[serde(default)]
    pub dns_block_lists: Vec<DnsBlockListConfig>,
    /// User groups.
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    /// Access resources.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    /// Resource groups.
    #[serde(default)]
    pub resource_groups: Vec<ResourceGroupConfig>,
}

impl BowtieConfig {
    /// Number of declared entities, site ranges included.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.sites.len()
            + self.sites.iter().map(|s| s.ranges.len()).sum::<usize>()
            + self.dns.len()
            + self.dns_block_lists.len()
            + self.groups.len()
            + self.resources.len()
            + self.resource_groups.len()
    }

    /// Returns the state file path.
    #[must_use]
    pub fn state_path(&self) -> &str {
        self.state.path.as_deref().unwrap_or(DEFAULT_STATE_PATH)
    }
}

/// Local state settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// State file path.
    #[serde(default)]
    pub path: Option<String>,
}

/// A declared site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteConfig {
    /// Explicit remote id.
    #[serde(default)]
    pub id: Option<String>,
    /// Site name.
    pub name: String,
    /// Routable ranges of the site.
    #[serde(default)]
    pub ranges: Vec<SiteRangeConfig>,
}

/// A declared routable range. Exactly one of `ipv4_range` and `ipv6_range`
/// must be set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteRangeConfig {
    /// Explicit remote id.
    #[serde(default)]
    pub id: Option<String>,
    /// Range name, unique within its site.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// IPv4 CIDR.
    #[serde(default)]
    pub ipv4_range: Option<String>,
    /// IPv6 CIDR.
    #[serde(default)]
    pub ipv6_range: Option<String>,
    /// Routing weight.
    #[serde(default)]
    pub weight: i64,
    /// Routing metric.
    #[serde(default)]
    pub metric: i64,
}

impl SiteRangeConfig {
    /// Returns the CIDR and whether it is IPv4.
    #[must_use]
    pub fn cidr(&self) -> Option<(&str, bool)> {
        match (&self.ipv4_range, &self.ipv6_range) {
            (Some(v4), _) if !v4.is_empty() => Some((v4, true)),
            (_, Some(v6)) if !v6.is_empty() => Some((v6, false)),
            _ => None,
        }
    }
}

/// A declared DNS policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsConfig {
    /// Explicit remote id.
    #[serde(default)]
    pub id: Option<String>,
    /// DNS zone name.
    pub name: String,
    /// Upstream server addresses, in priority order.
    #[serde(default)]
    pub servers: Vec<String>,
    /// Names excluded from DNS64, in order.
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Sites (by name or id) resolution is limited to.
    #[serde(default)]
    pub include_only_sites: Vec<String>,
    /// Resolve using DNS64.
    #[serde(default = "default_true")]
    pub is_dns64: bool,
    /// Only count metrics for this domain.
    #[serde(default = "default_true")]
    pub is_counted: bool,
    /// Log all requests.
    #[serde(default)]
    pub is_log: bool,
    /// Drop A record responses.
    #[serde(default = "default_true")]
    pub is_drop_a: bool,
    /// Drop every response.
    #[serde(default)]
    pub is_drop_all: bool,
    /// Treat as a search domain.
    #[serde(default)]
    pub is_search_domain: bool,
}

/// A declared DNS block list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsBlockListConfig {
    /// Explicit remote id.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// URL of the upstream list.
    pub upstream: String,
    /// Names allowed despite the upstream list, in order.
    #[serde(default)]
    pub override_to_allow: Vec<String>,
}

/// A declared user group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupConfig {
    /// Explicit remote id.
    #[serde(default)]
    pub id: Option<String>,
    /// Group name.
    pub name: String,
    /// Member user ids. Membership is left alone when absent.
    #[serde(default)]
    pub users: Option<BTreeSet<String>>,
    /// How membership changes are pushed.
    #[serde(default)]
    pub membership_mode: MembershipMode,
}

/// A declared access resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceConfig {
    /// Explicit remote id.
    #[serde(default)]
    pub id: Option<String>,
    /// Resource name.
    pub name: String,
    /// Protocol (`http`, `https`, `tcp`, ...).
    pub protocol: String,
    /// Network location.
    pub location: LocationSpec,
    /// Ports.
    #[serde(default)]
    pub ports: PortsSpec,
}

/// Declared ports: an inclusive range or an explicit collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortsSpec {
    /// `[low, high]`, inclusive. Takes precedence over `collection`.
    #[serde(default)]
    pub range: Option<[u16; 2]>,
    /// Explicit ports.
    #[serde(default)]
    pub collection: Vec<u16>,
}

impl PortsSpec {
    /// Converts to the wire representation.
    #[must_use]
    pub fn to_ports(&self) -> ResourcePorts {
        ResourcePorts::from_declared(self.range, &self.collection)
    }
}

/// A declared resource group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceGroupConfig {
    /// Explicit remote id.
    #[serde(default)]
    pub id: Option<String>,
    /// Resource group name.
    pub name: String,
    /// Member resources (by name or id).
    #[serde(default)]
    pub resources: Vec<String>,
    /// Inherited resource groups (by name or id).
    #[serde(default)]
    pub inherited: Vec<String>,
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dns_defaults() {
        let dns: DnsConfig = serde_yaml::from_str("name: example.com").unwrap();
        assert!(dns.is_dns64);
        assert!(dns.is_counted);
        assert!(!dns.is_log);
        assert!(dns.is_drop_a);
        assert!(!dns.is_drop_all);
        assert!(!dns.is_search_domain);
        assert!(dns.servers.is_empty());
    }

    #[test]
    fn test_range_cidr_family() {
        let range: SiteRangeConfig =
            serde_yaml::from_str("name: lan\nipv6_range: fd00::/64").unwrap();
        assert_eq!(range.cidr(), Some(("fd00::/64", false)));

        let range: SiteRangeConfig = serde_yaml::from_str("name: lan").unwrap();
        assert_eq!(range.cidr(), None);
    }

    #[test]
    fn test_ports_spec_range_wins() {
        let ports: PortsSpec = serde_yaml::from_str("range: [80, 443]\ncollection: [22]").unwrap();
        assert_eq!(ports.to_ports(), ResourcePorts::Range { low: 80, high: 443 });
    }

    #[test]
    fn test_group_membership_unmanaged_by_default() {
        let group: GroupConfig = serde_yaml::from_str("name: eng").unwrap();
        assert!(group.users.is_none());
        assert_eq!(group.membership_mode, MembershipMode::Auto);
    }

    #[test]
    fn test_dns_block_list_overrides_default_empty() {
        let config: BowtieConfig = serde_yaml::from_str(
            "dns_block_lists:\n  - name: ads\n    upstream: https://lists.example.com/ads.txt\n",
        )
        .unwrap();
        assert_eq!(config.dns_block_lists.len(), 1);
        assert!(config.dns_block_lists[0].override_to_allow.is_empty());
        assert_eq!(config.entity_count(), 1);
    }

    #[test]
    fn test_state_path_default() {
        let config = BowtieConfig::default();
        assert_eq!(config.state_path(), DEFAULT_STATE_PATH);
    }
}
