//! Group and group-membership endpoints.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::error::Result;

use super::client::{BowtieClient, Target, decode};
use super::types::{
    Group, GroupPayload, ModifyGroupUsersPayload, ModifyGroupUsersResponse, SetMembershipPayload,
    user_refs,
};

const KIND: &str = "group";

impl BowtieClient {
    /// Lists all groups keyed by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_groups(&self) -> Result<HashMap<String, Group>> {
        self.get_json("/group", None).await
    }

    /// Creates or updates a group and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or a non-empty response is not
    /// JSON.
    pub async fn upsert_group(&self, payload: &GroupPayload) -> Result<String> {
        debug!("Upserting group {} ({})", payload.name, payload.id);
        let body = self.post("/group/upsert", payload, None).await?;
        if body.trim().is_empty() {
            return Ok(payload.id.clone());
        }

        // The controller echoes the group; an echo without an id keeps the
        // requested one.
        let echoed: serde_json::Value = decode(&body)?;
        Ok(echoed
            .get("id")
            .and_then(serde_json::Value::as_str)
            .filter(|id| !id.is_empty())
            .map_or_else(|| payload.id.clone(), str::to_string))
    }

    /// Lists the member user ids of a group.
    ///
    /// # Errors
    ///
    /// Returns `EntityGone` if the group no longer exists.
    pub async fn list_group_members(&self, group_id: &str) -> Result<BTreeSet<String>> {
        let group: Group = self
            .get_json(
                &format!("/group/{group_id}/list"),
                Some(Target {
                    kind: KIND,
                    id: group_id,
                }),
            )
            .await?;
        Ok(group.users.into_iter().collect())
    }

    /// Adds users to a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn add_group_members(
        &self,
        group_id: &str,
        users: &BTreeSet<String>,
    ) -> Result<ModifyGroupUsersResponse> {
        self.modify_group_members("addusers", group_id, users).await
    }

    /// Removes users from a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn remove_group_members(
        &self,
        group_id: &str,
        users: &BTreeSet<String>,
    ) -> Result<ModifyGroupUsersResponse> {
        self.modify_group_members("removeusers", group_id, users).await
    }

    async fn modify_group_members(
        &self,
        action: &str,
        group_id: &str,
        users: &BTreeSet<String>,
    ) -> Result<ModifyGroupUsersResponse> {
        debug!("{action}: {} user(s) on group {group_id}", users.len());
        let payload = ModifyGroupUsersPayload {
            group_id: group_id.to_string(),
            users: user_refs(users),
        };
        self.post_json(
            &format!("/group/{action}"),
            &payload,
            Some(Target {
                kind: KIND,
                id: group_id,
            }),
        )
        .await
    }

    /// Replaces the full membership of a group.
    ///
    /// # Errors
    ///
    /// Returns `EntityGone` if the group no longer exists.
    pub async fn set_group_membership(
        &self,
        group_id: &str,
        users: &BTreeSet<String>,
    ) -> Result<()> {
        debug!("Setting {} member(s) on group {group_id}", users.len());
        let payload = SetMembershipPayload {
            users: user_refs(users),
        };
        self.post(
            &format!("/group/{group_id}/set_membership"),
            &payload,
            Some(Target {
                kind: KIND,
                id: group_id,
            }),
        )
        .await?;
        Ok(())
    }

    /// Deletes a group.
    ///
    /// # Errors
    ///
    /// Returns `EntityGone` if the group no longer exists.
    pub async fn delete_group(&self, group_id: &str) -> Result<()> {
        self.delete(
            &format!("/group/{group_id}"),
            Target {
                kind: KIND,
                id: group_id,
            },
        )
        .await
    }
}
