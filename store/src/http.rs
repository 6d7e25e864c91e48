//! HTTP-backed record store implementation
//!
//! Transport-level concerns (retry, backoff, rate limiting, auth)
//! live here, behind the `RecordStore` seam. The reconciliation
//! engine never retries; a failed call surfaces as a failed record.

use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::{ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Result, StoreError};
use crate::store::RecordStore;
use crate::types::{Draft, ExistingRecord, QueryPredicate, ResourceKind, UpdateAction};

/// Paged list response returned by the store's query endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResult<T> {
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
    pub items: Vec<T>,
}

/// Query parameters for list requests.
#[derive(Debug, Clone, Default, Serialize)]
struct QueryParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    offset: usize,
    limit: usize,
}

/// Record store backed by a remote HTTP API.
pub struct HttpRecordStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRecordStore {
    /// Create a store client with default transport settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        HttpRecordStoreBuilder::new(base_url).build()
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let content: T = response.json().await?;
            Ok(content)
        } else {
            Err(self.parse_error_response(response).await)
        }
    }

    async fn parse_error_response(&self, response: reqwest::Response) -> StoreError {
        let status = response.status();

        match status {
            StatusCode::NOT_FOUND => StoreError::NotFound,
            StatusCode::CONFLICT => {
                let message = response.text().await.unwrap_or_default();
                StoreError::VersionConflict { id: message }
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|h| h.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                StoreError::RateLimit { retry_after }
            }
            status if status.is_client_error() => {
                let error_text = response.text().await.unwrap_or_default();
                StoreError::Validation(error_text)
            }
            status if status.is_server_error() => {
                let error_text = response.text().await.unwrap_or_default();
                StoreError::Server {
                    status: status.as_u16(),
                    message: error_text,
                }
            }
            _ => {
                let error_text = response.text().await.unwrap_or_default();
                StoreError::Unknown(error_text)
            }
        }
    }

    async fn retry_operation<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(10),
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        retry(backoff, || async {
            match operation().await {
                Ok(result) => Ok(result),
                Err(error) => {
                    if error.is_retryable() {
                        warn!("Retryable store error: {}", error);
                        Err(backoff::Error::transient(error))
                    } else {
                        debug!("Non-retryable store error: {}", error);
                        Err(backoff::Error::permanent(error))
                    }
                }
            }
        })
        .await
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn lookup_id_by_key(&self, kind: ResourceKind, key: &str) -> Result<Option<String>> {
        let operation = || async {
            let url = format!(
                "{}/api/{}/records/key/{}",
                self.base_url,
                kind.as_str(),
                key
            );
            let response = self.request(self.client.get(&url)).send().await?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let record: ExistingRecord = self.handle_response(response).await?;
            Ok(Some(record.id))
        };

        self.retry_operation(operation).await
    }

    async fn query_page(
        &self,
        kind: ResourceKind,
        predicate: &QueryPredicate,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ExistingRecord>> {
        let operation = || async {
            let params = QueryParams {
                filter: predicate.to_filter(),
                offset,
                limit,
            };
            let url = format!(
                "{}/api/{}/records?{}",
                self.base_url,
                kind.as_str(),
                serde_urlencoded::to_string(&params).unwrap_or_default()
            );
            let response = self.request(self.client.get(&url)).send().await?;
            let page: ListResult<ExistingRecord> = self.handle_response(response).await?;
            Ok(page.items)
        };

        self.retry_operation(operation).await
    }

    async fn create_record(&self, draft: &Draft) -> Result<ExistingRecord> {
        let operation = || async {
            let url = format!("{}/api/{}/records", self.base_url, draft.kind.as_str());
            let response = self
                .request(self.client.post(&url).json(draft))
                .send()
                .await?;
            self.handle_response(response).await
        };

        self.retry_operation(operation).await
    }

    async fn update_record(
        &self,
        kind: ResourceKind,
        id: &str,
        actions: &[UpdateAction],
    ) -> Result<ExistingRecord> {
        let operation = || async {
            let url = format!(
                "{}/api/{}/records/{}/actions",
                self.base_url,
                kind.as_str(),
                id
            );
            let response = self
                .request(self.client.post(&url).json(&actions))
                .send()
                .await?;
            self.handle_response(response).await
        };

        self.retry_operation(operation).await
    }
}

/// Builder for `HttpRecordStore` transport configuration.
pub struct HttpRecordStoreBuilder {
    base_url: String,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
    auth_token: Option<String>,
}

impl HttpRecordStoreBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: None,
            connect_timeout: None,
            user_agent: None,
            auth_token: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn build(self) -> Result<HttpRecordStore> {
        let base_url = Url::parse(&self.base_url)?;

        let client = ClientBuilder::new()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(30)))
            .connect_timeout(self.connect_timeout.unwrap_or(Duration::from_secs(10)))
            .user_agent(
                self.user_agent
                    .unwrap_or_else(|| concat!("keysync/", env!("CARGO_PKG_VERSION")).to_string()),
            )
            .build()
            .map_err(StoreError::Network)?;

        Ok(HttpRecordStore {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            auth_token: self.auth_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_constructs_store() {
        let store = HttpRecordStoreBuilder::new("http://localhost:8090")
            .timeout(Duration::from_secs(60))
            .user_agent("keysync-test/1.0")
            .auth_token("secret")
            .build();
        assert!(store.is_ok());
    }

    #[test]
    fn builder_rejects_invalid_base_url() {
        let result = HttpRecordStoreBuilder::new("not a url").build();
        assert!(matches!(result, Err(StoreError::InvalidUrl(_))));
    }

    #[test]
    fn query_params_encode_filter_and_paging() {
        let params = QueryParams {
            filter: Some("key in (\"a\")".to_string()),
            offset: 500,
            limit: 500,
        };
        let encoded = serde_urlencoded::to_string(&params).unwrap();
        assert!(encoded.contains("offset=500"));
        assert!(encoded.contains("limit=500"));
        assert!(encoded.contains("filter="));
    }
}
