// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::backend::BackendResponse;
use crate::error::{BackendError, DeliveryError};
use crate::retry::RetryStrategy;

/// Runs `attempt` under `strategy` until the backend answers with a success.
///
/// Failures are logged and swallowed once they are not retryable or the
/// strategy is exhausted, so `Ok` does not mean the documents were stored.
/// The only error returned is [`DeliveryError::Cancelled`], when `cancel`
/// fires while waiting or sending.
pub async fn send_with_retry<F, Fut>(
    strategy: RetryStrategy,
    cancel: &CancellationToken,
    what: &str,
    mut attempt: F,
) -> Result<(), DeliveryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<BackendResponse, BackendError>>,
{
    let mut attempts = 0;
    let mut last_error = None;

    while let Some(delay) = strategy.delay_before(attempts + 1) {
        attempts += 1;
        if !delay.is_zero() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(DeliveryError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DeliveryError::Cancelled),
            outcome = attempt() => outcome,
        };

        let e = match outcome {
            Ok(response) if response.is_success() => return Ok(()),
            Ok(response) => DeliveryError::Status {
                status: response.status,
                body: response.body,
            },
            Err(e) => DeliveryError::Backend(e),
        };

        if !e.is_retryable() {
            error!(
                "SHIPPER | Dropping {} after non-retryable failure: {}",
                what, e
            );
            return Ok(());
        }
        debug!("SHIPPER | Attempt {} to send {} failed: {}", attempts, what, e);
        last_error = Some(e);
    }

    match last_error {
        Some(e) => error!(
            "SHIPPER | Dropping {} after {} attempts: {}",
            what, attempts, e
        ),
        None => error!("SHIPPER | Dropping {}: retry strategy allows no attempt", what),
    }
    Ok(())
}
