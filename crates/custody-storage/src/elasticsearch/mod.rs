//! Elasticsearch-backed repository over the REST API.

mod query;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use custody_types::{AuditSearchResults, SearchFilter, SearchKeywords, SignedCentralAuditEntry};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::repo::AuditRepo;

/// Longest error body kept in [`StorageError::Backend`].
const MAX_ERROR_BODY: usize = 512;

/// Connection settings for [`ElasticsearchAuditRepo`].
#[derive(Clone)]
pub struct ElasticsearchConfig {
    /// Base URL, e.g. `https://localhost:9200`.
    pub url: String,
    /// Index holding central entries.
    pub index: String,
    /// Basic-auth user.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Extra PEM CA certificate to trust.
    pub ca_cert_path: Option<PathBuf>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ElasticsearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchConfig")
            .field("url", &self.url)
            .field("index", &self.index)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("ca_cert_path", &self.ca_cert_path)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Repository storing entries in an Elasticsearch index.
#[derive(Debug)]
pub struct ElasticsearchAuditRepo {
    config: ElasticsearchConfig,
    base_url: String,
    client: Client,
}

impl ElasticsearchAuditRepo {
    /// Build the repository and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Config`] if the CA certificate cannot be read
    /// or the client cannot be built.
    pub fn new(config: ElasticsearchConfig) -> StorageResult<Self> {
        let mut builder = Client::builder().timeout(config.request_timeout);
        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path).map_err(|e| {
                StorageError::Config(format!("cannot read CA cert {}: {e}", path.display()))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| StorageError::Config(format!("invalid CA cert: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            config,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.username {
            Some(user) => request.basic_auth(user, self.config.password.as_deref()),
            None => request,
        }
    }

    async fn send_json(&self, request: RequestBuilder) -> StorageResult<Value> {
        let response = self.authed(request).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<Value>().await?)
    }

    async fn ensure_index(&self) -> StorageResult<()> {
        let index_url = self.url(&self.config.index);
        let response = self.authed(self.client.head(&index_url)).send().await?;
        match response.status() {
            StatusCode::OK => {
                debug!(index = %self.config.index, "Index exists");
                Ok(())
            },
            StatusCode::NOT_FOUND => {
                self.send_json(self.client.put(&index_url).json(&query::index_mappings()))
                    .await?;
                info!(index = %self.config.index, "Created index");
                Ok(())
            },
            status => Err(StorageError::Backend {
                status: status.as_u16(),
                body: String::new(),
            }),
        }
    }
}

async fn ensure_success(response: Response) -> StorageResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| body.is_char_boundary(i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(StorageError::Backend {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl AuditRepo for ElasticsearchAuditRepo {
    async fn init(&self) -> StorageResult<()> {
        let info = self.send_json(self.client.get(self.url("/"))).await?;
        info!(
            node = info.get("name").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            cluster = info.get("cluster_name").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            version = info.pointer("/version/number").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
            "Connected to Elasticsearch"
        );
        self.ensure_index().await
    }

    async fn destroy(&self) -> StorageResult<()> {
        debug!("Elasticsearch repository closed");
        Ok(())
    }

    async fn store(&self, entries: &[SignedCentralAuditEntry]) -> StorageResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let body = query::bulk_body(&self.config.index, entries)?;
        let request = self
            .client
            .post(self.url("_bulk"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body);
        let response = self.send_json(request).await?;

        let outcome = query::parse_bulk_response(&response);
        for (id, reason) in &outcome.failed {
            error!(entry_id = %id, reason = %reason, "Elasticsearch rejected audit entry");
        }
        debug!(
            accepted = outcome.accepted,
            failed = outcome.failed.len(),
            "Bulk stored audit entries"
        );
        Ok(outcome.accepted)
    }

    async fn search_entries(&self, filter: &SearchFilter) -> StorageResult<AuditSearchResults> {
        let page = filter.page_request();
        let body = query::search_body(filter, page);
        let url = self.url(&format!("{}/_search", self.config.index));
        let response = self.send_json(self.client.post(url).json(&body)).await?;
        query::parse_search_response(&response, page)
    }

    async fn get_search_keywords(&self) -> Vec<SearchKeywords> {
        let url = self.url(&format!("{}/_search", self.config.index));
        match self
            .send_json(self.client.post(url).json(&query::keywords_body()))
            .await
        {
            Ok(response) => query::parse_keywords_response(&response),
            Err(e) => {
                warn!(error = %e, "Failed to query search keywords");
                Vec::new()
            },
        }
    }
}
