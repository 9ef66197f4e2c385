//! In-memory control plane for executor and reconciler tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{ApiError, Result};

use super::control_plane::ControlPlane;
use super::types::{
    DnsBlockList, DnsPolicy, Group, GroupPayload, Policy, PolicySnapshot, Resource, ResourceGroup,
    RoutableRange, Site, SitePayload, SiteRangePayload,
};

/// Remote entities held by [`MemoryControlPlane`].
#[derive(Debug, Default, Clone)]
pub struct MemoryState {
    pub sites: HashMap<String, Site>,
    pub dns: HashMap<String, DnsPolicy>,
    pub dns_block_lists: HashMap<String, DnsBlockList>,
    pub groups: HashMap<String, Group>,
    pub members: HashMap<String, BTreeSet<String>>,
    pub resources: HashMap<String, Resource>,
    pub resource_groups: HashMap<String, ResourceGroup>,
    pub policies: HashMap<String, Policy>,
    /// Prefix put on ids of newly created groups, standing in for a
    /// controller that picks its own ids.
    pub group_id_prefix: Option<String>,
    /// Mutating calls in the order they were made.
    pub calls: Vec<String>,
}

/// Control plane backed by hash maps.
#[derive(Debug, Default)]
pub struct MemoryControlPlane {
    state: Mutex<MemoryState>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Makes new groups get `<prefix><sent id>` instead of the sent id.
    pub fn assign_group_ids(&self, prefix: &str) {
        self.state().group_id_prefix = Some(prefix.to_string());
    }

    /// Removes a group behind the reconciler's back.
    pub fn drop_group(&self, group_id: &str) {
        let mut state = self.state();
        state.groups.remove(group_id);
        state.members.remove(group_id);
    }
}

fn take<V>(map: &mut HashMap<String, V>, kind: &str, id: &str) -> Result<V> {
    map.remove(id).ok_or_else(|| ApiError::gone(kind, id).into())
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn list_sites(&self) -> Result<Vec<Site>> {
        Ok(self.state().sites.values().cloned().collect())
    }

    async fn upsert_site(&self, payload: &SitePayload) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("upsert_site {}", payload.id));
        let site = state.sites.entry(payload.id.clone()).or_default();
        site.id.clone_from(&payload.id);
        site.name.clone_from(&payload.name);
        Ok(())
    }

    async fn delete_site(&self, site_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_site {site_id}"));
        take(&mut state.sites, "site", site_id).map(|_| ())
    }

    async fn upsert_site_range(&self, payload: &SiteRangePayload) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("upsert_site_range {}", payload.id));
        let site = state
            .sites
            .get_mut(&payload.site_id)
            .ok_or_else(|| ApiError::gone("site", &payload.site_id))?;
        site.ranges_v4.retain(|r| r.id != payload.id);
        site.ranges_v6.retain(|r| r.id != payload.id);
        let range = RoutableRange {
            id: payload.id.clone(),
            name: payload.name.clone(),
            description: payload.description.clone(),
            range: payload.range.clone(),
            weight: payload.weight,
            metric: payload.metric,
        };
        if payload.is_v4 {
            site.ranges_v4.push(range);
        } else {
            site.ranges_v6.push(range);
        }
        Ok(())
    }

    async fn delete_site_range(&self, site_id: &str, range_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_site_range {range_id}"));
        let site = state
            .sites
            .get_mut(site_id)
            .ok_or_else(|| ApiError::gone("site", site_id))?;
        let before = site.ranges_v4.len() + site.ranges_v6.len();
        site.ranges_v4.retain(|r| r.id != range_id);
        site.ranges_v6.retain(|r| r.id != range_id);
        if site.ranges_v4.len() + site.ranges_v6.len() == before {
            return Err(ApiError::gone("site_range", range_id).into());
        }
        Ok(())
    }

    async fn list_dns(&self) -> Result<HashMap<String, DnsPolicy>> {
        Ok(self.state().dns.clone())
    }

    async fn upsert_dns(&self, payload: &DnsPolicy) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("upsert_dns {}", payload.id));
        state.dns.insert(payload.id.clone(), payload.clone());
        Ok(())
    }

    async fn delete_dns(&self, dns_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_dns {dns_id}"));
        take(&mut state.dns, "dns", dns_id).map(|_| ())
    }

    async fn list_dns_block_lists(&self) -> Result<HashMap<String, DnsBlockList>> {
        Ok(self.state().dns_block_lists.clone())
    }

    async fn upsert_dns_block_list(&self, payload: &DnsBlockList) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("upsert_dns_block_list {}", payload.id));
        state
            .dns_block_lists
            .insert(payload.id.clone(), payload.clone());
        Ok(())
    }

    async fn delete_dns_block_list(&self, list_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_dns_block_list {list_id}"));
        take(&mut state.dns_block_lists, "dns_block_list", list_id).map(|_| ())
    }

    async fn list_groups(&self) -> Result<HashMap<String, Group>> {
        Ok(self.state().groups.clone())
    }

    async fn upsert_group(&self, payload: &GroupPayload) -> Result<String> {
        let mut state = self.state();
        state.calls.push(format!("upsert_group {}", payload.id));
        let id = match &state.group_id_prefix {
            Some(prefix) if !state.groups.contains_key(&payload.id) => {
                format!("{prefix}{}", payload.id)
            }
            _ => payload.id.clone(),
        };
        state.groups.insert(
            id.clone(),
            Group {
                id: id.clone(),
                name: payload.name.clone(),
                users: Vec::new(),
            },
        );
        state.members.entry(id.clone()).or_default();
        Ok(id)
    }

    async fn list_group_members(&self, group_id: &str) -> Result<BTreeSet<String>> {
        self.state()
            .members
            .get(group_id)
            .cloned()
            .ok_or_else(|| ApiError::gone("group", group_id).into())
    }

    async fn add_group_members(&self, group_id: &str, users: &BTreeSet<String>) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("add_group_members {group_id} {}", users.len()));
        let members = state
            .members
            .get_mut(group_id)
            .ok_or_else(|| ApiError::gone("group", group_id))?;
        members.extend(users.iter().cloned());
        Ok(())
    }

    async fn remove_group_members(
        &self,
        group_id: &str,
        users: &BTreeSet<String>,
    ) -> Result<()> {
        let mut state = self.state();
        state
            .calls
            .push(format!("remove_group_members {group_id} {}", users.len()));
        let members = state
            .members
            .get_mut(group_id)
            .ok_or_else(|| ApiError::gone("group", group_id))?;
        members.retain(|user| !users.contains(user));
        Ok(())
    }

    async fn set_group_membership(
        &self,
        group_id: &str,
        users: &BTreeSet<String>,
    ) -> Result<()> {
        let mut state = self.state();
        state
            .calls
            .push(format!("set_group_membership {group_id} {}", users.len()));
        let members = state
            .members
            .get_mut(group_id)
            .ok_or_else(|| ApiError::gone("group", group_id))?;
        members.clone_from(users);
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_group {group_id}"));
        state.members.remove(group_id);
        take(&mut state.groups, "group", group_id).map(|_| ())
    }

    async fn policy_snapshot(&self) -> Result<PolicySnapshot> {
        let state = self.state();
        Ok(PolicySnapshot {
            policies: state.policies.clone(),
            resource_groups: state.resource_groups.clone(),
            resources: state.resources.clone(),
        })
    }

    async fn upsert_resource(&self, payload: &Resource) -> Result<Resource> {
        let mut state = self.state();
        state.calls.push(format!("upsert_resource {}", payload.id));
        state.resources.insert(payload.id.clone(), payload.clone());
        Ok(payload.clone())
    }

    async fn delete_resource(&self, resource_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_resource {resource_id}"));
        take(&mut state.resources, "resource", resource_id).map(|_| ())
    }

    async fn upsert_resource_group(&self, payload: &ResourceGroup) -> Result<()> {
        let mut state = self.state();
        state
            .calls
            .push(format!("upsert_resource_group {}", payload.id));
        state
            .resource_groups
            .insert(payload.id.clone(), payload.clone());
        Ok(())
    }

    async fn delete_resource_group(&self, group_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_resource_group {group_id}"));
        take(&mut state.resource_groups, "resource_group", group_id).map(|_| ())
    }

    async fn delete_policy(&self, policy_id: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_policy {policy_id}"));
        take(&mut state.policies, "policy", policy_id).map(|_| ())
    }
}
