// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors surfaced synchronously while starting a shipper.
///
/// These are fatal: nothing is retried and no worker is started.
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index {0} does not exist and backend administration is disabled")]
    IndexMissing(String),

    #[error("Failed to create index {index}: {status} {body}")]
    IndexCreation {
        index: String,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to create index template {template}: {status} {body}")]
    TemplateCreation {
        template: String,
        status: StatusCode,
        body: String,
    },

    #[error("Failed to put mapping on index {index}: {status} {body}")]
    MappingCreation {
        index: String,
        status: StatusCode,
        body: String,
    },

    #[error("Backend error during setup: {0}")]
    Backend(#[from] BackendError),

    #[error("A default shipper is already initialized")]
    AlreadyInitialized,
}

/// Failures reaching the backend at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{request} answered {status}")]
    UnexpectedStatus { request: String, status: StatusCode },
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        BackendError::Transport(e.to_string())
    }
}

/// Outcome of a failed delivery attempt on the consumer side.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("Backend answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Delivery cancelled during shutdown")]
    Cancelled,
}

impl DeliveryError {
    /// Whether another attempt could succeed.
    ///
    /// Transport failures, server errors and throttling are transient. Any
    /// other client error means the document itself is rejected, and a
    /// cancellation must reach the caller instead of being retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            DeliveryError::Backend(BackendError::Transport(_)) => true,
            DeliveryError::Backend(BackendError::UnexpectedStatus { status, .. }) => {
                status.is_server_error()
            }
            DeliveryError::Backend(BackendError::InvalidPayload(_)) => false,
            DeliveryError::Cancelled => false,
        }
    }
}
