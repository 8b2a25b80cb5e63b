//! API client for the energy backend.
//!
//! This module provides the `ApiClient` struct for logging in and for making
//! authenticated requests for devices, usage stats and assistant answers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::auth::SessionController;
use crate::models::{
    AuthResponse, DeviceCreate, DevicePublic, DeviceStats, QueryRequest, QueryResponse, UserPublic,
};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL used when nothing is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api/v1";

/// HTTP request timeout in seconds.
/// 30s allows for slow assistant answers while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default look-back window for device stats, in days
pub const DEFAULT_STATS_DAYS: u32 = 7;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the energy backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Option<Arc<SessionController>>,
    initial_backoff: Duration,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url` (e.g. `https://host/api/v1`)
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: None,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Copy of this client that attaches the session's token to requests,
    /// sharing the connection pool.
    pub fn with_session(&self, session: Arc<SessionController>) -> Self {
        Self {
            session: Some(session),
            ..self.clone()
        }
    }

    pub fn without_session(&self) -> Self {
        Self {
            session: None,
            ..self.clone()
        }
    }

    /// Override the first rate-limit backoff delay (doubles on each retry)
    #[cfg(test)]
    pub(crate) fn with_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL for `segments` under the base URL. Each segment is percent-encoded,
    /// so ids containing `/` or `?` stay inside their own segment.
    fn segments_url(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("Invalid API base URL: {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API base URL cannot hold a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Bearer header from the session's current token, re-checked per request.
    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = self.session.as_ref().and_then(|s| s.current_token()) {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .context("Token contains characters not allowed in a header")?,
            );
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            Err(Self::error_from(response).await)
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::error_from(response).await)
        }
    }

    async fn error_from(response: reqwest::Response) -> ApiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        ApiError::from_status(status, &body)
    }

    /// Send a request built by `build`, retrying with exponential backoff on 429.
    async fn send_with_retry<T, F>(&self, url: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> Result<reqwest::RequestBuilder>,
    {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = build()?
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(
                        url = url,
                        retry = retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_url(self.url(path)).await
    }

    async fn get_url<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        self.send_with_retry(&url, || {
            Ok(self.client.get(&url).headers(self.auth_headers()?))
        })
        .await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        self.send_with_retry(&url, || {
            Ok(self.client.post(&url).headers(self.auth_headers()?).json(body))
        })
        .await
    }

    // ===== Authentication =====

    /// Exchange credentials for an access token. The backend expects an
    /// OAuth2 password form, with the email sent as `username`.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let url = self.url("/auth/login");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .form(&[("username", email), ("password", password)])
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse login response: {}", e)))
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<UserPublic> {
        let body = json!({ "email": email, "password": password });
        let user: UserPublic = self.post("/auth/register", &body).await?;
        debug!(email = %user.email, "Registered account");
        Ok(user)
    }

    // ===== Devices =====

    pub async fn devices(&self) -> Result<Vec<DevicePublic>> {
        self.get("/devices/").await
    }

    pub async fn create_device(&self, name: &str, kind: &str) -> Result<DevicePublic> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Device name cannot be empty");
        }
        self.post("/devices/", &DeviceCreate { name, kind }).await
    }

    pub async fn device_stats(&self, device_id: &str, days: u32) -> Result<DeviceStats> {
        let mut url = self.segments_url(&["devices", device_id, "stats"])?;
        url.query_pairs_mut().append_pair("days", &days.to_string());
        self.get_url(url.into())
            .await
            .with_context(|| format!("Could not fetch stats for device {}", device_id))
    }

    // ===== Assistant =====

    pub async fn query(&self, question: &str) -> Result<QueryResponse> {
        self.post("/query/", &QueryRequest { question }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::token_expiring_at;
    use crate::auth::{AuthError, Authenticator, ManualClock, TokenStore, TOKEN_KEY};
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::HttpAuthenticator;
    use mockito::Matcher;

    const NOW: i64 = 1_700_000_000;

    fn session_with_token(api: &ApiClient, token: Option<&str>) -> Arc<SessionController> {
        let backend = Arc::new(MemoryStore::new());
        if let Some(token) = token {
            backend.set(TOKEN_KEY, token).unwrap();
        }
        Arc::new(SessionController::with_options(
            TokenStore::new(backend),
            Arc::new(HttpAuthenticator::new(api)),
            Arc::new(ManualClock::new(NOW)),
            Duration::from_secs(300),
        ))
    }

    #[tokio::test]
    async fn test_login_posts_form_and_parses_token() {
        let mut server = mockito::Server::new_async().await;
        let token = token_expiring_at(NOW + 3600);
        let mock = server
            .mock("POST", "/auth/login")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("username".into(), "a@b.com".into()),
                Matcher::UrlEncoded("password".into(), "pw".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "access_token": token, "token_type": "bearer" }).to_string())
            .create_async()
            .await;

        let api = ApiClient::new(&server.url()).unwrap();
        let resp = api.login("a@b.com", "pw").await.unwrap();
        assert_eq!(resp.access_token, token);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_authenticator_maps_bad_credentials_to_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(401)
            .with_body(r#"{"detail":"Incorrect email or password"}"#)
            .create_async()
            .await;

        let api = ApiClient::new(&server.url()).unwrap();
        let err = HttpAuthenticator::new(&api)
            .login("a@b.com", "wrong")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::Rejected("Incorrect email or password".to_string())
        );
    }

    #[tokio::test]
    async fn test_authenticator_maps_outage_to_unreachable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(503)
            .create_async()
            .await;

        let api = ApiClient::new(&server.url()).unwrap();
        let err = HttpAuthenticator::new(&api).login("a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Unreachable(_)));

        // Nothing listening at all
        let api = ApiClient::new("http://127.0.0.1:9").unwrap();
        let err = HttpAuthenticator::new(&api).login("a@b.com", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_session_login_through_http() {
        let mut server = mockito::Server::new_async().await;
        let token = token_expiring_at(NOW + 3600);
        server
            .mock("POST", "/auth/login")
            .with_status(200)
            .with_body(json!({ "access_token": token }).to_string())
            .create_async()
            .await;

        let api = ApiClient::new(&server.url()).unwrap();
        let session = session_with_token(&api, None);
        session.login("a@b.com", "pw").await.unwrap();
        assert_eq!(session.current_token().as_deref(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn test_requests_carry_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let token = token_expiring_at(NOW + 3600);
        let mock = server
            .mock("GET", "/devices/")
            .match_header("authorization", format!("Bearer {}", token).as_str())
            .with_status(200)
            .with_body(r#"[{"id":"d1","name":"Fridge","type":"APPLIANCE","owner_id":"u1"}]"#)
            .create_async()
            .await;

        let api = ApiClient::new(&server.url()).unwrap();
        let api = api.with_session(session_with_token(&api, Some(&token)));
        let devices = api.devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Fridge");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_session_means_no_authorization_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/devices/")
            .match_header("authorization", Matcher::Missing)
            .with_status(401)
            .with_body(r#"{"detail":"Not authenticated"}"#)
            .create_async()
            .await;

        let api = ApiClient::new(&server.url()).unwrap();
        let api = api.with_session(session_with_token(&api, None));
        let err = api.devices().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::Unauthorized(_))
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_device_stats_and_create() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/devices/d1/stats")
            .match_query(Matcher::UrlEncoded("days".into(), "3".into()))
            .with_status(200)
            .with_body(r#"{"device_id":"d1","time_period_days":3,"hourly_usage":[{"date":"2025-03-04","hour":1,"total_energy":5.0}]}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/devices/")
            .match_body(Matcher::Json(json!({ "name": "Heater", "type": "APPLIANCE" })))
            .with_status(201)
            .with_body(r#"{"id":"d2","name":"Heater","type":"APPLIANCE","owner_id":"u1"}"#)
            .create_async()
            .await;

        let api = ApiClient::new(&server.url()).unwrap();
        let stats = api.device_stats("d1", 3).await.unwrap();
        assert_eq!(stats.time_period_days, Some(3));
        assert_eq!(stats.hourly_usage.len(), 1);

        let device = api.create_device("  Heater ", "APPLIANCE").await.unwrap();
        assert_eq!(device.id, "d2");

        assert!(api.create_device("   ", "APPLIANCE").await.is_err());
    }

    #[tokio::test]
    async fn test_device_id_is_encoded_into_one_segment() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/devices/a%2Fb%3Fx/stats")
            .match_query(Matcher::UrlEncoded("days".into(), "7".into()))
            .with_status(200)
            .with_body(r#"{"device_id":"a/b?x"}"#)
            .create_async()
            .await;

        let api = ApiClient::new(&format!("{}/api/v1", server.url())).unwrap();
        let stats = api.device_stats("a/b?x", DEFAULT_STATS_DAYS).await.unwrap();
        assert_eq!(stats.device_id, "a/b?x");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/query/")
            .with_status(429)
            .expect(4)
            .create_async()
            .await;

        let api = ApiClient::new(&server.url())
            .unwrap()
            .with_backoff(Duration::from_millis(1));
        let err = api.query("how much?").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::RateLimited)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_returns_summary() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/query/")
            .match_body(Matcher::Json(json!({ "question": "How much did the fridge use?" })))
            .with_status(200)
            .with_body(r#"{"summary":"3.2 kWh"}"#)
            .create_async()
            .await;

        let api = ApiClient::new(&server.url()).unwrap();
        let answer = api.query("How much did the fridge use?").await.unwrap();
        assert_eq!(answer.summary, "3.2 kWh");
    }
}
