//! DNS policy and DNS block list endpoints.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;

use super::client::{BowtieClient, Target};
use super::types::{DnsBlockList, DnsPolicy};

impl BowtieClient {
    /// Lists all DNS policies keyed by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_dns(&self) -> Result<HashMap<String, DnsPolicy>> {
        self.get_json("/dns", None).await
    }

    /// Creates or updates a DNS policy with its servers and exclusions.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn upsert_dns(&self, payload: &DnsPolicy) -> Result<()> {
        debug!(
            "Upserting DNS {} ({}) with {} server(s), {} exclusion(s)",
            payload.name,
            payload.id,
            payload.servers.len(),
            payload.dns64_exclude.len()
        );
        self.post("/dns/upsert", payload, None).await?;
        Ok(())
    }

    /// Deletes a DNS policy.
    ///
    /// # Errors
    ///
    /// Returns `EntityGone` if the policy no longer exists.
    pub async fn delete_dns(&self, dns_id: &str) -> Result<()> {
        self.delete(
            &format!("/dns/{dns_id}"),
            Target {
                kind: "dns",
                id: dns_id,
            },
        )
        .await
    }

    /// Lists all DNS block lists keyed by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_dns_block_lists(&self) -> Result<HashMap<String, DnsBlockList>> {
        self.get_json("/dns_block_list", None).await
    }

    /// Creates or updates a DNS block list.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn upsert_dns_block_list(&self, payload: &DnsBlockList) -> Result<()> {
        debug!(
            "Upserting DNS block list {} ({}) from {}",
            payload.name, payload.id, payload.upstream
        );
        self.post("/dns_block_list/upsert", payload, None).await?;
        Ok(())
    }

    /// Deletes a DNS block list.
    ///
    /// # Errors
    ///
    /// Returns `EntityGone` if the block list no longer exists.
    pub async fn delete_dns_block_list(&self, list_id: &str) -> Result<()> {
        self.delete(
            &format!("/dns_block_list/{list_id}"),
            Target {
                kind: "dns_block_list",
                id: list_id,
            },
        )
        .await
    }
}
