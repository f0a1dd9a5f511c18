// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The indexing backend the shipper writes to.
//!
//! Every operation answers with the raw HTTP status and body; deciding what
//! counts as a failure is left to the caller.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::config::IndexSettings;
use crate::error::BackendError;

pub mod http;

pub use http::{HttpBackend, HttpBackendConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub body: String,
}

impl BackendResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK, "")
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// One document of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub index: String,
    pub doc_id: String,
    pub payload: Value,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError>;

    async fn template_exists(&self, name: &str) -> Result<bool, BackendError>;

    async fn create_index(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> Result<BackendResponse, BackendError>;

    /// Creates or replaces the template `name` applied to indices matching `pattern`.
    async fn put_index_template(
        &self,
        name: &str,
        pattern: &str,
        settings: &IndexSettings,
        mapping: &Value,
    ) -> Result<BackendResponse, BackendError>;

    async fn put_mapping(&self, index: &str, mapping: &Value)
        -> Result<BackendResponse, BackendError>;

    async fn index_document(
        &self,
        index: &str,
        doc_id: &str,
        payload: &Value,
    ) -> Result<BackendResponse, BackendError>;

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BackendResponse, BackendError>;
}
