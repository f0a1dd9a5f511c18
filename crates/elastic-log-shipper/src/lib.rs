// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Elastic Log Shipper
//!
//! Ships structured log items to an Elasticsearch-compatible backend from a
//! set of background tasks, so that the application producing the logs never
//! waits on the network.
//!
//! ## Architecture
//!
//! ```text
//!   ShipperHandle::submit
//!          │ (severity filter, encode, route)
//!          v
//!   ┌───────────────┐
//!   │ DeliveryQueue │  (bounded, closable)
//!   └──────┬────────┘
//!          │
//!     ┌────┴─────┐
//!     v          v
//!   worker     worker   (single-item or bulk, `pool_size` of them)
//!     │          │
//!     v          v
//!   ┌───────────────┐
//!   │    Backend    │  (index / bulk requests with retries)
//!   └───────────────┘
//! ```
//!
//! - [`routing`]: time based index sharding
//! - [`queue`]: the bounded queue shared by producers and workers
//! - [`worker`]: single-item and bulk delivery strategies
//! - [`reporter`]: periodic queue occupancy sampling
//! - [`debug`]: optional lifecycle event sink used for observability and tests
//! - [`shipper`]: startup, submission and graceful shutdown
//! - [`backend`]: the backend capability and its HTTP implementation

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod annotate;
pub mod backend;
pub mod config;
pub mod debug;
pub mod error;
pub mod global;
pub mod item;
pub mod logger;
pub mod payload;
pub mod queue;
pub mod reporter;
pub mod retry;
pub mod routing;
pub mod shipper;
pub mod worker;

pub use config::{
    AdminMode, BulkConfig, FlushTimeout, IndexSettings, LoggingGuarantee, SendStrategy,
    SendThreshold, ShipperConfig,
};
pub use error::{BackendError, DeliveryError, ShipperError};
pub use item::{Location, LogItem, Severity};
pub use routing::ShardingPolicy;
pub use shipper::{Shipper, ShipperHandle};

/// Spacing between enqueue attempts for `TryNTimes` and `TryForever`.
pub const ENQUEUE_RETRY_DELAY_MS: u64 = 10;

/// Number of approximate queue samples the reporter takes per exact sample.
pub const APPROXIMATE_SAMPLES_PER_EXACT: u32 = 4;
