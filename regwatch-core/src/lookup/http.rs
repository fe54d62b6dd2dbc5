use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use regwatch_model::Registration;

use super::{InspectionLookup, InspectionRecord, LookupError, LookupResponse};

/// Connection settings for the external inspection-status API.
#[derive(Clone, Debug)]
pub struct InspectionApiConfig {
    pub base_url: Url,
    pub client_id: String,
    pub client_secret: String,
    /// Per-request timeout. Lookup latency bounds pause latency, so keep
    /// this tight.
    pub timeout_secs: u64,
}

impl InspectionApiConfig {
    pub fn new(base_url: Url, client_id: String, client_secret: String) -> Self {
        Self {
            base_url,
            client_id,
            client_secret,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    expires_at: Option<NaiveDate>,
}

#[derive(Clone, Debug)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Refresh slightly early so an in-flight lookup never races expiry.
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - chrono::Duration::seconds(30) > now
    }
}

/// Client for the external inspection-status service: client-credentials
/// token acquisition plus one status lookup per registration.
pub struct HttpInspectionClient {
    http: reqwest::Client,
    config: InspectionApiConfig,
    token: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for HttpInspectionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpInspectionClient")
            .field("base_url", &self.config.base_url.as_str())
            .field("client_id", &self.config.client_id)
            .finish()
    }
}

impl HttpInspectionClient {
    pub fn new(config: InspectionApiConfig) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, LookupError> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| LookupError::Api(format!("invalid endpoint {path}: {e}")))
    }

    async fn fetch_token(&self) -> Result<CachedToken, LookupError> {
        let url = self.endpoint("token")?;
        let response = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| LookupError::Malformed(e.to_string()))?;
                Ok(CachedToken {
                    access_token: body.access_token,
                    expires_at: Utc::now() + chrono::Duration::seconds(body.expires_in),
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(LookupError::InvalidCredential),
            status => Err(LookupError::Api(format!(
                "token endpoint returned {status}"
            ))),
        }
    }

    /// Returns a fresh bearer token, refreshing the cached one when it is
    /// within its expiry margin.
    async fn bearer(&self) -> Result<String, LookupError> {
        let now = Utc::now();
        if let Some(token) = self.token.read().await.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.access_token.clone());
        }

        let mut slot = self.token.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = slot.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.access_token.clone());
        }

        debug!("refreshing inspection API credential");
        let token = self.fetch_token().await?;
        let access = token.access_token.clone();
        *slot = Some(token);
        Ok(access)
    }
}

#[async_trait]
impl InspectionLookup for HttpInspectionClient {
    async fn ensure_credential(&self) -> Result<(), LookupError> {
        self.bearer().await.map(|_| ())
    }

    async fn lookup(&self, registration: &Registration) -> Result<LookupResponse, LookupError> {
        let token = self.bearer().await?;
        let url = self.endpoint(&format!("vehicles/{}/inspection", registration.as_str()))?;
        let response = self.http.get(url).bearer_auth(token).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body: StatusResponse = response
                    .json()
                    .await
                    .map_err(|e| LookupError::Malformed(e.to_string()))?;
                Ok(LookupResponse::Found(InspectionRecord {
                    status: body.status,
                    expires_at: body.expires_at,
                }))
            }
            StatusCode::NOT_FOUND => Ok(LookupResponse::NotFound),
            StatusCode::TOO_MANY_REQUESTS => Err(LookupError::RateLimited),
            StatusCode::UNAUTHORIZED => {
                // Token revoked server-side; drop the cache so the next item
                // fetches a new one instead of failing the rest of the run.
                warn!("inspection API rejected credential mid-run");
                *self.token.write().await = None;
                Err(LookupError::InvalidCredential)
            }
            status => Err(LookupError::Api(format!(
                "status lookup for {registration} returned {status}"
            ))),
        }
    }
}
