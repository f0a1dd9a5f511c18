// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide default shipper for code that has no handle at hand.
//!
//! It is started at most once and never torn down implicitly; shut it down
//! through the handle returned by [`init`]. The engine itself never reads it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::backend::Backend;
use crate::config::ShipperConfig;
use crate::error::ShipperError;
use crate::item::LogItem;
use crate::shipper::{Shipper, ShipperHandle};

static DEFAULT: OnceCell<ShipperHandle> = OnceCell::const_new();

/// Starts the default shipper.
///
/// Fails with [`ShipperError::AlreadyInitialized`] when a previous call
/// succeeded. A failed start leaves it uninitialized.
pub async fn init(
    config: ShipperConfig,
    backend: Arc<dyn Backend>,
) -> Result<&'static ShipperHandle, ShipperError> {
    let started = AtomicBool::new(false);
    let started_ref = &started;
    let handle = DEFAULT
        .get_or_try_init(|| async move {
            started_ref.store(true, Ordering::Relaxed);
            Shipper::start(config, backend).await
        })
        .await?;

    if started.load(Ordering::Relaxed) {
        Ok(handle)
    } else {
        Err(ShipperError::AlreadyInitialized)
    }
}

/// The default shipper, once [`init`] succeeded.
#[must_use]
pub fn handle() -> Option<&'static ShipperHandle> {
    DEFAULT.get()
}

/// Submits to the default shipper; drops the item before [`init`].
pub async fn submit(item: LogItem) -> bool {
    match handle() {
        Some(handle) => handle.submit(item).await,
        None => false,
    }
}
