//! Policy, resource and resource-group endpoints.
//!
//! The policy endpoint returns policies, resources and resource groups in a
//! single snapshot; individual lookups are served from it.

use tracing::debug;

use crate::error::{ApiError, Result};

use super::client::{BowtieClient, Target};
use super::types::{Policy, PolicySnapshot, Resource, ResourceGroup};

impl BowtieClient {
    /// Fetches policies, resources and resource groups together.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or a resource cannot be decoded.
    pub async fn policy_snapshot(&self) -> Result<PolicySnapshot> {
        self.get_json("/policy", None).await
    }

    /// Looks up one policy by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the snapshot has no such policy.
    pub async fn get_policy(&self, policy_id: &str) -> Result<Policy> {
        let mut snapshot = self.policy_snapshot().await?;
        snapshot
            .policies
            .remove(policy_id)
            .ok_or_else(|| ApiError::not_found("policy", policy_id).into())
    }

    /// Creates or updates a resource and returns the stored entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be
    /// decoded.
    pub async fn upsert_resource(&self, payload: &Resource) -> Result<Resource> {
        debug!(
            "Upserting resource {} ({}) at {}",
            payload.name,
            payload.id,
            payload.location.describe()
        );
        self.post_json("/policy/upsert_resource", payload, None).await
    }

    /// Deletes a resource.
    ///
    /// # Errors
    ///
    /// Returns `EntityGone` if the resource no longer exists.
    pub async fn delete_resource(&self, resource_id: &str) -> Result<()> {
        self.delete(
            &format!("/policy/resource/{resource_id}"),
            Target {
                kind: "resource",
                id: resource_id,
            },
        )
        .await
    }

    /// Creates or updates a resource group.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn upsert_resource_group(&self, payload: &ResourceGroup) -> Result<()> {
        debug!(
            "Upserting resource group {} ({}) with {} resource(s)",
            payload.name,
            payload.id,
            payload.resources.len()
        );
        self.post("/policy/upsert_resource_group", payload, None)
            .await?;
        Ok(())
    }

    /// Deletes a resource group.
    ///
    /// # Errors
    ///
    /// Returns `EntityGone` if the resource group no longer exists.
    pub async fn delete_resource_group(&self, group_id: &str) -> Result<()> {
        self.delete(
            &format!("/policy/resource_group/{group_id}"),
            Target {
                kind: "resource_group",
                id: group_id,
            },
        )
        .await
    }

    /// Deletes a policy.
    ///
    /// # Errors
    ///
    /// Returns `EntityGone` if the policy no longer exists.
    pub async fn delete_policy(&self, policy_id: &str) -> Result<()> {
        self.delete(
            &format!("/policy/{policy_id}"),
            Target {
                kind: "policy",
                id: policy_id,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::api::client::API_PREFIX;
    use crate::api::client::test_support::{client_for, server_with_login};
    use crate::api::codec::{ResourceLocation, ResourcePorts};
    use crate::api::types::Resource;
    use crate::error::{ApiError, BowtieError};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn snapshot_body() -> serde_json::Value {
        serde_json::json!({
            "policies": {"p-1": {"id": "p-1"}},
            "resource_groups": {},
            "resources": {}
        })
    }

    #[tokio::test]
    async fn test_get_policy_found() {
        let server = server_with_login().await;
        Mock::given(method("GET"))
            .and(path(format!("{API_PREFIX}/policy")))
            .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_body()))
            .mount(&server)
            .await;

        let policy = client_for(&server).get_policy("p-1").await.unwrap();
        assert_eq!(policy.id, "p-1");
    }

    #[tokio::test]
    async fn test_get_policy_missing_is_not_found() {
        let server = server_with_login().await;
        Mock::given(method("GET"))
            .and(path(format!("{API_PREFIX}/policy")))
            .respond_with(ResponseTemplate::new(200).set_body_json(snapshot_body()))
            .mount(&server)
            .await;

        let err = client_for(&server).get_policy("p-2").await.unwrap_err();
        assert!(matches!(err, BowtieError::Api(ApiError::NotFound { .. })));
        assert!(err.to_string().contains("policy not found"));
    }

    #[tokio::test]
    async fn test_upsert_resource_emits_single_port_shape() {
        let server = server_with_login().await;
        let expected = serde_json::json!({
            "id": "r-1",
            "name": "intranet",
            "protocol": "http",
            "location": {"dns": "intranet.example.com"},
            "ports": {"range": [80, 443]}
        });
        Mock::given(method("POST"))
            .and(path(format!("{API_PREFIX}/policy/upsert_resource")))
            .and(body_json(expected.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(expected))
            .expect(1)
            .mount(&server)
            .await;

        let resource = Resource {
            id: String::from("r-1"),
            name: String::from("intranet"),
            protocol: String::from("http"),
            location: ResourceLocation::dns("intranet.example.com"),
            ports: ResourcePorts::Range { low: 80, high: 443 },
        };
        let stored = client_for(&server).upsert_resource(&resource).await.unwrap();
        assert_eq!(stored, resource);
    }

    #[tokio::test]
    async fn test_delete_missing_resource_group_is_gone() {
        let server = server_with_login().await;
        Mock::given(method("DELETE"))
            .and(path(format!("{API_PREFIX}/policy/resource_group/rg-9")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .delete_resource_group("rg-9")
            .await
            .unwrap_err();
        assert!(err.is_entity_gone());
    }

    #[tokio::test]
    async fn test_delete_policy() {
        let server = server_with_login().await;
        Mock::given(method("DELETE"))
            .and(path(format!("{API_PREFIX}/policy/p-1")))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).delete_policy("p-1").await.unwrap();
    }
}
