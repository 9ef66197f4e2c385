//! The control-plane seam used by the observer and the plan executor.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;

use crate::error::Result;

use super::client::BowtieClient;
use super::types::{
    DnsBlockList, DnsPolicy, Group, GroupPayload, PolicySnapshot, Resource, ResourceGroup, Site,
    SitePayload, SiteRangePayload,
};

/// Operations the reconciler needs from the remote control plane.
///
/// Entity-addressed calls report a missing entity as `ApiError::EntityGone`.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Lists sites with their routable ranges.
    async fn list_sites(&self) -> Result<Vec<Site>>;
    /// Creates or updates a site.
    async fn upsert_site(&self, payload: &SitePayload) -> Result<()>;
    /// Deletes a site.
    async fn delete_site(&self, site_id: &str) -> Result<()>;
    /// Creates or updates a site range.
    async fn upsert_site_range(&self, payload: &SiteRangePayload) -> Result<()>;
    /// Deletes a site range.
    async fn delete_site_range(&self, site_id: &str, range_id: &str) -> Result<()>;

    /// Lists DNS policies keyed by id.
    async fn list_dns(&self) -> Result<HashMap<String, DnsPolicy>>;
    /// Creates or updates a DNS policy.
    async fn upsert_dns(&self, payload: &DnsPolicy) -> Result<()>;
    /// Deletes a DNS policy.
    async fn delete_dns(&self, dns_id: &str) -> Result<()>;

    /// Lists DNS block lists keyed by id.
    async fn list_dns_block_lists(&self) -> Result<HashMap<String, DnsBlockList>>;
    /// Creates or updates a DNS block list.
    async fn upsert_dns_block_list(&self, payload: &DnsBlockList) -> Result<()>;
    /// Deletes a DNS block list.
    async fn delete_dns_block_list(&self, list_id: &str) -> Result<()>;

    /// Lists groups keyed by id.
    async fn list_groups(&self) -> Result<HashMap<String, Group>>;
    /// Creates or updates a group, returning its id.
    async fn upsert_group(&self, payload: &GroupPayload) -> Result<String>;
    /// Lists a group's members.
    async fn list_group_members(&self, group_id: &str) -> Result<BTreeSet<String>>;
    /// Adds members to a group.
    async fn add_group_members(&self, group_id: &str, users: &BTreeSet<String>) -> Result<()>;
    /// Removes members from a group.
    async fn remove_group_members(&self, group_id: &str, users: &BTreeSet<String>)
    -> Result<()>;
    /// Replaces a group's membership.
    async fn set_group_membership(&self, group_id: &str, users: &BTreeSet<String>)
    -> Result<()>;
    /// Deletes a group.
    async fn delete_group(&self, group_id: &str) -> Result<()>;

    /// Fetches policies, resources and resource groups.
    async fn policy_snapshot(&self) -> Result<PolicySnapshot>;
    /// Creates or updates a resource.
    async fn upsert_resource(&self, payload: &Resource) -> Result<Resource>;
    /// Deletes a resource.
    async fn delete_resource(&self, resource_id: &str) -> Result<()>;
    /// Creates or updates a resource group.
    async fn upsert_resource_group(&self, payload: &ResourceGroup) -> Result<()>;
    /// Deletes a resource group.
    async fn delete_resource_group(&self, group_id: &str) -> Result<()>;
    /// Deletes a policy.
    async fn delete_policy(&self, policy_id: &str) -> Result<()>;
}

#[async_trait]
impl ControlPlane for BowtieClient {
    async fn list_sites(&self) -> Result<Vec<Site>> {
        Self::list_sites(self).await
    }

    async fn upsert_site(&self, payload: &SitePayload) -> Result<()> {
        Self::upsert_site(self, payload).await
    }

    async fn delete_site(&self, site_id: &str) -> Result<()> {
        Self::delete_site(self, site_id).await
    }

    async fn upsert_site_range(&self, payload: &SiteRangePayload) -> Result<()> {
        Self::upsert_site_range(self, payload).await
    }

    async fn delete_site_range(&self, site_id: &str, range_id: &str) -> Result<()> {
        Self::delete_site_range(self, site_id, range_id).await
    }

    async fn list_dns(&self) -> Result<HashMap<String, DnsPolicy>> {
        Self::list_dns(self).await
    }

    async fn upsert_dns(&self, payload: &DnsPolicy) -> Result<()> {
        Self::upsert_dns(self, payload).await
    }

    async fn delete_dns(&self, dns_id: &str) -> Result<()> {
        Self::delete_dns(self, dns_id).await
    }

    async fn list_dns_block_lists(&self) -> Result<HashMap<String, DnsBlockList>> {
        Self::list_dns_block_lists(self).await
    }

    async fn upsert_dns_block_list(&self, payload: &DnsBlockList) -> Result<()> {
        Self::upsert_dns_block_list(self, payload).await
    }

    async fn delete_dns_block_list(&self, list_id: &str) -> Result<()> {
        Self::delete_dns_block_list(self, list_id).await
    }

    async fn list_groups(&self) -> Result<HashMap<String, Group>> {
        Self::list_groups(self).await
    }

    async fn upsert_group(&self, payload: &GroupPayload) -> Result<String> {
        Self::upsert_group(self, payload).await
    }

    async fn list_group_members(&self, group_id: &str) -> Result<BTreeSet<String>> {
        Self::list_group_members(self, group_id).await
    }

    async fn add_group_members(&self, group_id: &str, users: &BTreeSet<String>) -> Result<()> {
        Self::add_group_members(self, group_id, users).await?;
        Ok(())
    }

    async fn remove_group_members(
        &self,
        group_id: &str,
        users: &BTreeSet<String>,
    ) -> Result<()> {
        Self::remove_group_members(self, group_id, users).await?;
        Ok(())
    }

    async fn set_group_membership(
        &self,
        group_id: &str,
        users: &BTreeSet<String>,
    ) -> Result<()> {
        Self::set_group_membership(self, group_id, users).await
    }

    async fn delete_group(&self, group_id: &str) -> Result<()> {
        Self::delete_group(self, group_id).await
    }

    async fn policy_snapshot(&self) -> Result<PolicySnapshot> {
        Self::policy_snapshot(self).await
    }

    async fn upsert_resource(&self, payload: &Resource) -> Result<Resource> {
        Self::upsert_resource(self, payload).await
    }

    async fn delete_resource(&self, resource_id: &str) -> Result<()> {
        Self::delete_resource(self, resource_id).await
    }

    async fn upsert_resource_group(&self, payload: &ResourceGroup) -> Result<()> {
        Self::upsert_resource_group(self, payload).await
    }

    async fn delete_resource_group(&self, group_id: &str) -> Result<()> {
        Self::delete_resource_group(self, group_id).await
    }

    async fn delete_policy(&self, policy_id: &str) -> Result<()> {
        Self::delete_policy(self, policy_id).await
    }
}
