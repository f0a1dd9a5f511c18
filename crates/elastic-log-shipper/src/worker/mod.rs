// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery strategies run by the worker pool.
//!
//! A worker drains the shared queue until it is closed and empty, then
//! returns. Backend failures are logged and dropped; only a cancellation
//! during shutdown makes a worker return an error.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::debug::DebugChannel;
use crate::queue::DeliveryQueue;
use crate::retry::RetryStrategy;

pub mod bulk;
pub mod delivery;
pub mod single;

pub use bulk::BulkWorker;
pub use single::SingleItemWorker;

/// Resources shared by every worker of a shipper.
#[derive(Clone)]
pub struct WorkerContext {
    pub id: usize,
    pub queue: Arc<DeliveryQueue>,
    pub backend: Arc<dyn Backend>,
    pub retry: RetryStrategy,
    pub debug: DebugChannel,
    /// Cancelled when the shutdown timeout expires.
    pub cancel: CancellationToken,
}

impl WorkerContext {
    #[must_use]
    pub fn with_id(&self, id: usize) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }
}
