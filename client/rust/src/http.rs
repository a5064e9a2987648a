//! REST implementation of [`RemoteStore`].
//!
//! Talks to the complaint backend's JSON API:
//!
//! | Operation          | Request                                   |
//! |--------------------|-------------------------------------------|
//! | `fetch_complaints` | `GET /complaints`                         |
//! | `fetch_aggregate`  | `GET /complaints/analytics`, `/department-stats`, `/area-stats` |
//! | `update_status`    | `PATCH /complaints/{id}/status`           |
//!
//! Reads are retried with backoff on transient failures. Status writes are
//! sent exactly once.

use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::model::{
    records_from_payload, Aggregate, AnalyticsPayload, AreaCount, BulkFetch, ComplaintId,
    ComplaintRecord, ComplaintStatus, DepartmentCount,
};
use crate::retry::read_backoff;
use crate::traits::RemoteStore;

/// Longest slice of an error body kept in [`ClientError::Status`].
const ERROR_BODY_LIMIT: usize = 200;

/// HTTP remote store configuration.
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// API base URL, e.g. `http://localhost:3000/api`.
    pub base_url: String,

    /// Bearer token sent with every request.
    pub auth_token: Option<String>,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Pair every bulk read with a fresh aggregate.
    pub include_aggregate: bool,

    /// Retry idempotent reads on transient failures.
    pub retry_reads: bool,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            auth_token: None,
            timeout: Duration::from_secs(30),
            include_aggregate: false,
            retry_reads: true,
        }
    }
}

impl HttpStoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_include_aggregate(mut self, include: bool) -> Self {
        self.include_aggregate = include;
        self
    }

    pub fn with_retry_reads(mut self, retry: bool) -> Self {
        self.retry_reads = retry;
        self
    }
}

/// REST client for the complaint backend.
pub struct HttpRemoteStore {
    client: Client,
    base: Url,
    config: HttpStoreConfig,
}

impl HttpRemoteStore {
    /// Create a new store with the given configuration.
    pub fn new(config: HttpStoreConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            ClientError::InvalidArgument(format!("invalid base url '{}': {}", config.base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidArgument(format!(
                "base url '{}' cannot carry a path",
                config.base_url
            )));
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base,
            config,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidArgument("base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Turn a response into JSON, mapping non-2xx to [`ClientError::Status`].
    async fn decode(response: Response) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            body: body.chars().take(ERROR_BODY_LIMIT).collect(),
        })
    }

    async fn get_once(&self, segments: &[&str]) -> Result<Value> {
        let url = self.endpoint(segments)?;
        let response = self.authorize(self.client.get(url)).send().await?;
        Self::decode(response).await
    }

    async fn get_json(&self, segments: &[&str]) -> Result<Value> {
        if !self.config.retry_reads {
            return self.get_once(segments).await;
        }

        (|| self.get_once(segments))
            .retry(read_backoff())
            .when(ClientError::is_retryable)
            .notify(|err, delay| {
                warn!(
                    path = %segments.join("/"),
                    error = %err,
                    retry_in = ?delay,
                    "Backend read failed, retrying"
                );
            })
            .await
    }

    async fn get_typed<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let value = self.get_json(segments).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    #[tracing::instrument(name = "remote.fetch_complaints", skip_all)]
    async fn fetch_complaints(&self) -> Result<BulkFetch> {
        let (body, aggregate) = if self.config.include_aggregate {
            let (body, aggregate) =
                futures::try_join!(self.get_json(&["complaints"]), self.fetch_aggregate())?;
            (body, Some(aggregate))
        } else {
            (self.get_json(&["complaints"]).await?, None)
        };

        let records = records_from_payload(body)?;
        debug!(
            count = records.len(),
            with_aggregate = aggregate.is_some(),
            "Fetched complaints"
        );

        Ok(BulkFetch { records, aggregate })
    }

    #[tracing::instrument(name = "remote.fetch_aggregate", skip_all)]
    async fn fetch_aggregate(&self) -> Result<Aggregate> {
        let (analytics, departments, areas) = futures::try_join!(
            self.get_typed::<AnalyticsPayload>(&["complaints", "analytics"]),
            self.get_typed::<Vec<DepartmentCount>>(&["complaints", "department-stats"]),
            self.get_typed::<Vec<AreaCount>>(&["complaints", "area-stats"]),
        )?;

        Ok(Aggregate::from_backend(analytics, departments, areas))
    }

    #[tracing::instrument(name = "remote.update_status", skip_all, fields(id = %id, status = %status))]
    async fn update_status(
        &self,
        id: &ComplaintId,
        status: ComplaintStatus,
    ) -> Result<ComplaintRecord> {
        let url = self.endpoint(&["complaints", id.as_str(), "status"])?;
        let response = self
            .authorize(self.client.patch(url))
            .json(&json!({ "status": status }))
            .send()
            .await?;

        let body = Self::decode(response).await?;
        let payload = match body {
            Value::Object(mut envelope) if envelope.contains_key("complaint") => envelope
                .remove("complaint")
                .unwrap_or(Value::Null),
            other => other,
        };

        let record = ComplaintRecord::from_payload(payload)?;
        debug!(id = %record.id, status = %record.status, "Status updated");
        Ok(record)
    }
}
