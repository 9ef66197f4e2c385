//! Bowtie control-plane HTTP client.
//!
//! Wraps `reqwest::Client` with the API path prefix, a cookie-backed session
//! established lazily on first use, JSON bodies and status mapping. Endpoint
//! groups (sites, DNS, groups, policy) are implemented as inherent methods in
//! sibling modules.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url, header, redirect};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::{ApiError, BowtieError, Result};

use super::types::LoginPayload;

/// Path prefix of every API endpoint.
pub const API_PREFIX: &str = "/-net/api/v0";

/// Login endpoint, relative to [`API_PREFIX`].
const LOGIN_PATH: &str = "/user/login";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Account credentials used for the session login.
#[derive(Clone)]
pub struct Credentials {
    /// Account email.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Entity addressed by a request, used to turn a 404 into `EntityGone`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Target<'a> {
    pub kind: &'a str,
    pub id: &'a str,
}

/// Bowtie API client.
#[derive(Debug, Clone)]
pub struct BowtieClient {
    /// HTTP client.
    http: Client,
    /// Session cookie store shared with `http`.
    jar: Arc<Jar>,
    /// Controller base URL without trailing slash.
    host: String,
    /// Login credentials.
    credentials: Credentials,
}

impl BowtieClient {
    /// Creates a new client. No request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not a valid URL or the HTTP client
    /// cannot be created.
    pub fn new(host: &str, credentials: Credentials) -> Result<Self> {
        Self::with_timeout(host, credentials, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client and logs in immediately, so bad credentials or an
    /// unreachable host surface before any planning starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be created or login fails.
    pub async fn connect(host: &str, credentials: Credentials) -> Result<Self> {
        let client = Self::new(host, credentials)?;
        client.login().await?;
        Ok(client)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not a valid URL or the HTTP client
    /// cannot be created.
    pub fn with_timeout(host: &str, credentials: Credentials, timeout_secs: u64) -> Result<Self> {
        Url::parse(host).map_err(|e| {
            BowtieError::Api(ApiError::InvalidResponse {
                message: format!("Invalid host URL '{host}': {e}"),
            })
        })?;

        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .cookie_provider(Arc::clone(&jar))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            jar,
            host: host.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Returns the controller host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Builds the absolute URL of an API path.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{API_PREFIX}{path}", self.host);
        Url::parse(&raw).map_err(|e| {
            BowtieError::Api(ApiError::InvalidResponse {
                message: format!("Invalid endpoint URL '{raw}': {e}"),
            })
        })
    }

    /// Returns true if the cookie store holds a session for the API.
    ///
    /// # Errors
    ///
    /// Returns an error if the API URL cannot be built.
    pub fn has_session(&self) -> Result<bool> {
        let url = self.endpoint("/")?;
        Ok(self.jar.cookies(&url).is_some())
    }

    /// Logs in and stores the session cookie.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the credentials are rejected.
    pub async fn login(&self) -> Result<()> {
        let url = self.endpoint(LOGIN_PATH)?;
        debug!("Logging in at {url}");

        let payload = LoginPayload {
            email: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
        };

        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ApiError::network(format!("Login request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BowtieError::Api(ApiError::AuthenticationFailed {
                message: format!("login failed (HTTP {status}): {body}"),
            }));
        }

        if !self.has_session()? {
            return Err(BowtieError::Api(ApiError::AuthenticationFailed {
                message: String::from("login succeeded but no session cookie was set"),
            }));
        }

        debug!("Login successful");
        Ok(())
    }

    /// Logs in if no session cookie is present yet.
    async fn ensure_session(&self) -> Result<()> {
        if !self.has_session()? {
            self.login().await?;
        }
        Ok(())
    }

    /// Prepares a request against an API path.
    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        self.ensure_session().await?;
        let url = self.endpoint(path)?;
        trace!("{method} {url}");
        Ok(self.http.request(method, url))
    }

    /// Sends a request and maps non-success statuses to errors.
    async fn send(&self, request: RequestBuilder, target: Option<Target<'_>>) -> Result<String> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read response body: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }

        Err(BowtieError::Api(match (status, target) {
            (StatusCode::NOT_FOUND, Some(target)) => ApiError::gone(target.kind, target.id),
            (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _) => {
                ApiError::AuthenticationFailed {
                    message: format!("HTTP {status}: {body}"),
                }
            }
            _ => ApiError::request_failed(status.as_u16(), body),
        }))
    }

    /// GETs a path and decodes the JSON response.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        target: Option<Target<'_>>,
    ) -> Result<T> {
        let request = self.request(Method::GET, path).await?;
        let body = self.send(request, target).await?;
        decode(&body)
    }

    /// POSTs a JSON body and returns the raw response body.
    pub(crate) async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        payload: &B,
        target: Option<Target<'_>>,
    ) -> Result<String> {
        let request = self
            .request(Method::POST, path)
            .await?
            .header(header::CONTENT_TYPE, "application/json")
            .json(payload);
        self.send(request, target).await
    }

    /// POSTs a JSON body and decodes the JSON response.
    pub(crate) async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        payload: &B,
        target: Option<Target<'_>>,
    ) -> Result<T> {
        let body = self.post(path, payload, target).await?;
        decode(&body)
    }

    /// Sends a DELETE for an entity path.
    pub(crate) async fn delete(&self, path: &str, target: Target<'_>) -> Result<()> {
        let request = self.request(Method::DELETE, path).await?;
        self.send(request, Some(target)).await?;
        Ok(())
    }
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| {
        BowtieError::Api(ApiError::InvalidResponse {
            message: format!("Failed to parse response: {e}"),
        })
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::{client_for, server_with_login};
    use super::*;
    use crate::api::types::Site;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_endpoint_prefix() {
        let client = BowtieClient::new(
            "http://127.0.0.1:3000/",
            Credentials {
                username: String::new(),
                password: String::new(),
            },
        )
        .unwrap();
        let url = client.endpoint("/group/upsert").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3000/-net/api/v0/group/upsert");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials {
            username: String::from("a@b.c"),
            password: String::from("hunter2"),
        };
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_lazy_login_happens_once() {
        let server = server_with_login().await;
        Mock::given(method("GET"))
            .and(path(format!("{API_PREFIX}/site")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(!client.has_session().unwrap());

        let sites: Vec<Site> = client.get_json("/site", None).await.unwrap();
        assert!(sites.is_empty());
        let _: Vec<Site> = client.get_json("/site", None).await.unwrap();
        assert!(client.has_session().unwrap());
    }

    #[tokio::test]
    async fn test_connect_logs_in_eagerly() {
        let server = server_with_login().await;
        let client = BowtieClient::connect(
            &server.uri(),
            Credentials {
                username: String::from("admin@example.com"),
                password: String::from("secret"),
            },
        )
        .await
        .unwrap();
        assert!(client.has_session().unwrap());
    }

    #[tokio::test]
    async fn test_connect_with_bad_credentials_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{API_PREFIX}/user/login")))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = BowtieClient::connect(
            &server.uri(),
            Credentials {
                username: String::from("admin@example.com"),
                password: String::from("wrong"),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BowtieError::Api(ApiError::AuthenticationFailed { .. })));
    }

    #[tokio::test]
    async fn test_not_found_on_entity_is_gone() {
        let server = server_with_login().await;
        Mock::given(method("DELETE"))
            .and(path(format!("{API_PREFIX}/group/g-1")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .delete("/group/g-1", Target { kind: "group", id: "g-1" })
            .await
            .unwrap_err();
        assert!(err.is_entity_gone());
    }

    #[tokio::test]
    async fn test_server_error_passes_through() {
        let server = server_with_login().await;
        Mock::given(method("GET"))
            .and(path(format!("{API_PREFIX}/group")))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .get_json::<serde_json::Value>("/group", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BowtieError::Api(ApiError::RequestFailed { status: 500, ref message }) if message == "boom"
        ));
    }

    #[tokio::test]
    async fn test_rejected_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{API_PREFIX}/user/login")))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.get_json::<serde_json::Value>("/site", None).await.unwrap_err();
        assert!(matches!(err, BowtieError::Api(ApiError::AuthenticationFailed { .. })));
    }
}
