use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use dietsync_core::error::{Result, SyncError};
use dietsync_core::gateway::Gateway;
use dietsync_core::models::SyncKey;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`Gateway`] over the `/api/sync` endpoint of `dietsync serve`.
///
/// The server derives the user from the bearer token, so `user_id` is only
/// used for logging. [`whoami`](Self::whoami) reports which user that is.
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    endpoint: String,
    token: String,
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    key: &'a str,
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhoamiBody {
    user_id: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpGateway {
    pub fn new(server_url: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("dietsync/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = server_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            endpoint: format!("{base_url}/api/sync"),
            base_url,
            token: token.to_string(),
        })
    }

    /// The user id the server has on record for our token.
    pub async fn whoami(&self) -> Result<String> {
        let url = format!("{}/api/whoami", self.base_url);
        debug!("GET {url}");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let resp = Self::check(resp).await?;
        let body: WhoamiBody = resp
            .json()
            .await
            .map_err(|e| SyncError::Unknown(format!("invalid response: {e}")))?;
        Ok(body.user_id)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .json::<ErrorBody>()
            .await
            .map_or_else(|_| status.to_string(), |body| body.error);
        Err(status_error(status.as_u16(), message))
    }
}

/// Map a non-success HTTP status onto the sync error taxonomy.
pub(crate) fn status_error(status: u16, message: String) -> SyncError {
    match status {
        401 | 403 => SyncError::Unauthorized,
        400 | 413 | 422 => SyncError::BadRequest(message),
        404 => SyncError::NotFound,
        500..=599 => SyncError::Backend(message),
        _ => SyncError::Unknown(format!("HTTP {status}: {message}")),
    }
}

fn transport_error(err: &reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Network(format!("request timed out: {err}"))
    } else {
        SyncError::Network(err.to_string())
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn fetch(&self, user_id: &str, key: SyncKey) -> Result<Option<Value>> {
        debug!(user = user_id, %key, "GET {}", self.endpoint);
        let resp = self
            .client
            .get(&self.endpoint)
            .bearer_auth(&self.token)
            .query(&[("key", key.as_str())])
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        let resp = Self::check(resp).await?;
        let body: FetchResponse = resp
            .json()
            .await
            .map_err(|e| SyncError::Unknown(format!("invalid response: {e}")))?;
        Ok(body.data)
    }

    async fn upsert(&self, user_id: &str, key: SyncKey, value: Value) -> Result<()> {
        debug!(user = user_id, %key, "POST {}", self.endpoint);
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&UpsertRequest {
                key: key.as_str(),
                data: value,
            })
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        Self::check(resp).await?;
        Ok(())
    }
}
