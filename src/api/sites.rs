//! Site and site-range endpoints.

use tracing::debug;

use crate::error::Result;

use super::client::{BowtieClient, Target};
use super::types::{Organization, Site, SitePayload, SiteRangePayload};

impl BowtieClient {
    /// Lists every site of the organization, ranges included.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let org: Organization = self.get_json("/organization", None).await?;
        Ok(org.sites)
    }

    /// Creates or updates a site.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn upsert_site(&self, payload: &SitePayload) -> Result<()> {
        debug!("Upserting site {} ({})", payload.name, payload.id);
        self.post("/site", payload, None).await?;
        Ok(())
    }

    /// Deletes a site.
    ///
    /// # Errors
    ///
    /// Returns `EntityGone` if the site no longer exists.
    pub async fn delete_site(&self, site_id: &str) -> Result<()> {
        self.delete(
            &format!("/site/{site_id}"),
            Target {
                kind: "site",
                id: site_id,
            },
        )
        .await
    }

    /// Creates or updates a routable range of a site.
    ///
    /// # Errors
    ///
    /// Returns `EntityGone` if the owning site no longer exists.
    pub async fn upsert_site_range(&self, payload: &SiteRangePayload) -> Result<()> {
        debug!(
            "Upserting range {} ({}) on site {}",
            payload.name, payload.range, payload.site_id
        );
        self.post(
            &format!("/site/{}/range", payload.site_id),
            payload,
            Some(Target {
                kind: "site",
                id: &payload.site_id,
            }),
        )
        .await?;
        Ok(())
    }

    /// Deletes a routable range of a site.
    ///
    /// # Errors
    ///
    /// Returns `EntityGone` if the range or its site no longer exists.
    pub async fn delete_site_range(&self, site_id: &str, range_id: &str) -> Result<()> {
        self.delete(
            &format!("/site/{site_id}/range/{range_id}"),
            Target {
                kind: "site_range",
                id: range_id,
            },
        )
        .await
    }
}

/// Finds a site by id in a listing.
#[must_use]
pub fn find_site<'a>(sites: &'a [Site], site_id: &str) -> Option<&'a Site> {
    sites.iter().find(|site| site.id == site_id)
}

/// Finds a range by id within a site, returning it with its address family
/// (`true` for IPv4).
#[must_use]
pub fn find_site_range(site: &Site, range_id: &str) -> Option<SiteRangePayload> {
    site.ranges_v4
        .iter()
        .find(|r| r.id == range_id)
        .map(|r| SiteRangePayload::from_observed(&site.id, r, true))
        .or_else(|| {
            site.ranges_v6
                .iter()
                .find(|r| r.id == range_id)
                .map(|r| SiteRangePayload::from_observed(&site.id, r, false))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::API_PREFIX;
    use crate::api::client::test_support::{client_for, server_with_login};
    use crate::api::types::RoutableRange;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn site_with_ranges() -> Site {
        Site {
            id: String::from("s-1"),
            name: String::from("office"),
            ranges_v4: vec![RoutableRange {
                id: String::from("r-4"),
                range: String::from("10.0.0.0/16"),
                ..RoutableRange::default()
            }],
            ranges_v6: vec![RoutableRange {
                id: String::from("r-6"),
                range: String::from("fd00::/64"),
                ..RoutableRange::default()
            }],
        }
    }

    #[test]
    fn test_find_site_range_reports_family() {
        let site = site_with_ranges();
        let v4 = find_site_range(&site, "r-4").unwrap();
        assert!(v4.is_v4 && !v4.is_v6);
        let v6 = find_site_range(&site, "r-6").unwrap();
        assert!(v6.is_v6 && !v6.is_v4);
        assert!(find_site_range(&site, "r-x").is_none());
    }

    #[test]
    fn test_find_site() {
        let sites = vec![site_with_ranges()];
        assert!(find_site(&sites, "s-1").is_some());
        assert!(find_site(&sites, "s-2").is_none());
    }

    #[tokio::test]
    async fn test_list_sites_from_organization() {
        let server = server_with_login().await;
        Mock::given(method("GET"))
            .and(path(format!("{API_PREFIX}/organization")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "org",
                "sites": [{"id": "s-1", "name": "office", "routable_ranges_v4": [], "routable_ranges_v6": []}]
            })))
            .mount(&server)
            .await;

        let sites = client_for(&server).list_sites().await.unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].name, "office");
    }

    #[tokio::test]
    async fn test_upsert_site_range_payload() {
        let server = server_with_login().await;
        Mock::given(method("POST"))
            .and(path(format!("{API_PREFIX}/site/s-1/range")))
            .and(body_json(serde_json::json!({
                "id": "r-1", "site_id": "s-1", "name": "lan", "description": "",
                "range": "10.0.0.0/16", "is_v4": true, "is_v6": false,
                "weight": 1, "metric": 255
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let payload = SiteRangePayload {
            id: String::from("r-1"),
            site_id: String::from("s-1"),
            name: String::from("lan"),
            description: String::new(),
            range: String::from("10.0.0.0/16"),
            is_v4: true,
            is_v6: false,
            weight: 1,
            metric: 255,
        };
        client_for(&server).upsert_site_range(&payload).await.unwrap();
    }
}
