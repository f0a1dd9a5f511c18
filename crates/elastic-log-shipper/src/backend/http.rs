// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`Backend`] over the Elasticsearch REST API.
//!
//! | Operation            | Request                       |
//! |----------------------|-------------------------------|
//! | `index_exists`       | `HEAD /{index}`               |
//! | `template_exists`    | `HEAD /_template/{name}`      |
//! | `create_index`       | `PUT /{index}`                |
//! | `put_index_template` | `PUT /_template/{name}`       |
//! | `put_mapping`        | `PUT /{index}/_mapping`       |
//! | `index_document`     | `PUT /{index}/_doc/{id}`      |
//! | `bulk`               | `POST /_bulk` (NDJSON body)   |

use std::error::Error;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::{Backend, BackendResponse, BulkOperation};
use crate::config::IndexSettings;
use crate::error::BackendError;
use crate::payload;

const NDJSON: &str = "application/x-ndjson";

#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL of the cluster, e.g. `http://localhost:9200`.
    pub url: String,
    pub timeout: Duration,
    pub https_proxy: Option<String>,
    /// Basic auth `(username, password)`.
    pub credentials: Option<(String, String)>,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            timeout: Duration::from_secs(10),
            https_proxy: None,
            credentials: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl HttpBackend {
    #[must_use]
    pub fn new(config: &HttpBackendConfig) -> Self {
        Self {
            client: get_client(config),
            base_url: config.url.trim_end_matches('/').to_string(),
            credentials: config.credentials.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    async fn exists(&self, path: &str) -> Result<bool, BackendError> {
        let response = self
            .authorize(self.client.head(self.url(path)))
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(BackendError::UnexpectedStatus {
                request: format!("HEAD /{path}"),
                status,
            }),
        }
    }

    async fn put_json(&self, path: &str, body: &Value) -> Result<BackendResponse, BackendError> {
        let request = self.authorize(self.client.put(self.url(path)).json(body));
        execute(request).await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        self.exists(index).await
    }

    async fn template_exists(&self, name: &str) -> Result<bool, BackendError> {
        self.exists(&format!("_template/{name}")).await
    }

    async fn create_index(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> Result<BackendResponse, BackendError> {
        self.put_json(index, &payload::index_body(settings)).await
    }

    async fn put_index_template(
        &self,
        name: &str,
        pattern: &str,
        settings: &IndexSettings,
        mapping: &Value,
    ) -> Result<BackendResponse, BackendError> {
        let body = payload::template_body(pattern, settings, mapping);
        self.put_json(&format!("_template/{name}"), &body).await
    }

    async fn put_mapping(
        &self,
        index: &str,
        mapping: &Value,
    ) -> Result<BackendResponse, BackendError> {
        self.put_json(&format!("{index}/_mapping"), mapping).await
    }

    async fn index_document(
        &self,
        index: &str,
        doc_id: &str,
        payload: &Value,
    ) -> Result<BackendResponse, BackendError> {
        self.put_json(&format!("{index}/_doc/{doc_id}"), payload)
            .await
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BackendResponse, BackendError> {
        let body = bulk_body(operations)?;
        let request = self.authorize(
            self.client
                .post(self.url("_bulk"))
                .header(CONTENT_TYPE, NDJSON)
                .body(body),
        );
        let response = execute(request).await?;
        if response.is_success() && has_item_errors(&response.body) {
            warn!(
                "BULK | Backend accepted a bulk of {} documents but rejected some of them",
                operations.len()
            );
        }
        Ok(response)
    }
}

async fn execute(request: RequestBuilder) -> Result<BackendResponse, BackendError> {
    let response = request.send().await?;
    let status = response.status();
    // An unreadable body does not change the outcome
    let body = response.text().await.unwrap_or_default();
    Ok(BackendResponse { status, body })
}

/// Builds the newline delimited body of a `_bulk` request. The body always
/// ends with a newline.
pub fn bulk_body(operations: &[BulkOperation]) -> Result<String, BackendError> {
    let mut body = String::new();
    for op in operations {
        let action = json!({ "index": { "_index": op.index, "_id": op.doc_id } });
        for line in [&action, &op.payload] {
            let line = serde_json::to_string(line)
                .map_err(|e| BackendError::InvalidPayload(e.to_string()))?;
            body.push_str(&line);
            body.push('\n');
        }
    }
    Ok(body)
}

fn has_item_errors(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("errors").and_then(Value::as_bool))
        .unwrap_or(false)
}

/// Builds the HTTP client, falling back to a direct connection when the
/// proxy setting cannot be used.
#[must_use]
pub fn get_client(config: &HttpBackendConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "SHIPPER | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "SHIPPER | Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &HttpBackendConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(config.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            debug!("SHIPPER | Using HTTPS proxy {}", https_uri);
            client = client.proxy(reqwest::Proxy::https(https_uri.clone())?);
        }
    }
    Ok(client.build()?)
}
