// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::debug::{DebugChannel, DebugStatus};
use crate::queue::DeliveryQueue;
use crate::APPROXIMATE_SAMPLES_PER_EXACT;

/// Periodically publishes the queue occupancy on the debug channel.
///
/// Every tick takes one sample: [`APPROXIMATE_SAMPLES_PER_EXACT`] lock-free
/// samples, then one taken under the queue lock, and so on.
pub struct QueueReporter {
    queue: Arc<DeliveryQueue>,
    debug: DebugChannel,
    interval: Duration,
    cancel: CancellationToken,
}

impl QueueReporter {
    #[must_use]
    pub fn new(
        queue: Arc<DeliveryQueue>,
        debug: DebugChannel,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            debug,
            interval,
            cancel,
        }
    }

    pub async fn run(self) {
        debug!("SHIPPER | Queue reporter started, interval {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sample: u32 = 0;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let status = if sample < APPROXIMATE_SAMPLES_PER_EXACT {
                DebugStatus::EstimatedQueueLength(self.queue.approximate_len())
            } else {
                DebugStatus::TrueQueueLength(self.queue.exact_len())
            };
            sample = (sample + 1) % (APPROXIMATE_SAMPLES_PER_EXACT + 1);

            // a full blocking channel must not hold up shutdown
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = self.debug.publish(status) => {}
            }
        }
        debug!("SHIPPER | Queue reporter stopped");
    }
}
