//! Remote state observation.
//!
//! Builds one [`ObservedState`] snapshot per run. Snapshots are never cached
//! across runs.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::error::Result;

use super::control_plane::ControlPlane;
use super::sites::find_site_range;
use super::types::{
    DnsBlockList, DnsPolicy, Group, Policy, Resource, ResourceGroup, Site, SiteRangePayload,
};

/// Remote state as seen at the start of a run.
#[derive(Debug, Clone, Default)]
pub struct ObservedState {
    /// Sites by id.
    pub sites: HashMap<String, Site>,
    /// DNS policies by id.
    pub dns: HashMap<String, DnsPolicy>,
    /// DNS block lists by id.
    pub dns_block_lists: HashMap<String, DnsBlockList>,
    /// Groups by id.
    pub groups: HashMap<String, Group>,
    /// Members of the groups that were asked for.
    pub group_members: HashMap<String, BTreeSet<String>>,
    /// Resources by id.
    pub resources: HashMap<String, Resource>,
    /// Resource groups by id.
    pub resource_groups: HashMap<String, ResourceGroup>,
    /// Policies by id.
    pub policies: HashMap<String, Policy>,
}

impl ObservedState {
    /// Finds a site range by owning site and range id.
    #[must_use]
    pub fn site_range(&self, site_id: &str, range_id: &str) -> Option<SiteRangePayload> {
        self.sites
            .get(site_id)
            .and_then(|site| find_site_range(site, range_id))
    }

    /// Finds the site owning a range id.
    #[must_use]
    pub fn range_owner(&self, range_id: &str) -> Option<&str> {
        self.sites
            .values()
            .find(|site| find_site_range(site, range_id).is_some())
            .map(|site| site.id.as_str())
    }

    /// Total number of top-level entities observed.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.sites.len()
            + self.dns.len()
            + self.dns_block_lists.len()
            + self.groups.len()
            + self.resources.len()
            + self.resource_groups.len()
    }
}

/// Fetches remote state through a [`ControlPlane`].
pub struct StateObserver<'a> {
    api: &'a dyn ControlPlane,
}

impl std::fmt::Debug for StateObserver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateObserver").finish_non_exhaustive()
    }
}

impl<'a> StateObserver<'a> {
    /// Creates an observer over a control plane.
    #[must_use]
    pub const fn new(api: &'a dyn ControlPlane) -> Self {
        Self { api }
    }

    /// Observes every managed entity kind.
    ///
    /// Membership is fetched only for groups in `member_groups`; a group that
    /// disappears between listing and membership fetch is dropped from the
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if any listing fails.
    pub async fn observe(&self, member_groups: &BTreeSet<String>) -> Result<ObservedState> {
        info!("Observing remote state");

        let sites = self
            .api
            .list_sites()
            .await?
            .into_iter()
            .map(|site| (site.id.clone(), site))
            .collect();
        let dns = self.api.list_dns().await?;
        let dns_block_lists = self.api.list_dns_block_lists().await?;
        let mut groups = self.api.list_groups().await?;
        let snapshot = self.api.policy_snapshot().await?;

        let mut group_members = HashMap::new();
        for group_id in member_groups {
            if !groups.contains_key(group_id) {
                continue;
            }
            match self.api.list_group_members(group_id).await {
                Ok(members) => {
                    group_members.insert(group_id.clone(), members);
                }
                Err(e) if e.is_entity_gone() => {
                    warn!("Group {group_id} disappeared while reading its members");
                    groups.remove(group_id);
                }
                Err(e) => return Err(e),
            }
        }

        let observed = ObservedState {
            sites,
            dns,
            dns_block_lists,
            groups,
            group_members,
            resources: snapshot.resources,
            resource_groups: snapshot.resource_groups,
            policies: snapshot.policies,
        };

        debug!("Observed {} remote entities", observed.entity_count());
        Ok(observed)
    }
}
