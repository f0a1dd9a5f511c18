// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bulk delivery: two cooperating tasks per worker.
//!
//! ```text
//!   DeliveryQueue ──dequeue──> accumulation task ──push──> [ batch ]
//!                                                             │ take
//!                              sender task: wait(timeout | threshold)
//!                                                             │
//!                                                             v
//!                                                      POST /_bulk
//! ```
//!
//! The accumulation task never waits on the sender, so entries keep moving
//! out of the shared queue while a batch is being sent. The sender races the
//! flush timeout against the send threshold; whichever resolves first ends
//! the wait and the whole batch is taken in one swap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::delivery::send_with_retry;
use super::WorkerContext;
use crate::backend::BulkOperation;
use crate::config::{BulkConfig, BulkDispatch};
use crate::debug::DebugStatus;
use crate::error::DeliveryError;
use crate::queue::{DeliveryQueue, QueueEntry};

/// Batch under construction, shared by the two tasks of one worker.
#[derive(Default)]
struct Accumulator {
    batch: Mutex<Vec<QueueEntry>>,
    /// Woken on every append and when the accumulation task stops.
    appended: Notify,
    /// Set once the queue is closed and drained.
    stop: AtomicBool,
}

impl Accumulator {
    fn lock(&self) -> MutexGuard<'_, Vec<QueueEntry>> {
        self.batch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, entry: QueueEntry) {
        self.lock().push(entry);
        self.appended.notify_waiters();
    }

    fn take(&self) -> Vec<QueueEntry> {
        std::mem::take(&mut *self.lock())
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.appended.notify_waiters();
    }
}

pub struct BulkWorker {
    ctx: WorkerContext,
    config: BulkConfig,
}

impl BulkWorker {
    #[must_use]
    pub fn new(ctx: WorkerContext, config: BulkConfig) -> Self {
        Self { ctx, config }
    }

    /// Runs until the queue is closed and every accumulated entry was sent.
    pub async fn run(self) -> Result<(), DeliveryError> {
        let id = self.ctx.id;
        debug!("BULK | Worker {} started", id);

        let accumulator = Arc::new(Accumulator::default());
        let accumulation = tokio::spawn(accumulate(
            Arc::clone(&self.ctx.queue),
            Arc::clone(&accumulator),
            self.config.accumulate_delay,
        ));
        let mut detached = JoinSet::new();

        let sent = self.send_loop(&accumulator, &mut detached).await;
        if sent.is_err() {
            accumulation.abort();
            detached.abort_all();
        }

        let mut result = sent;
        while let Some(joined) = detached.join_next().await {
            if let Err(e) = flatten(joined) {
                result = result.and(Err(e));
            }
        }
        if let Err(e) = accumulation.await {
            if !e.is_cancelled() {
                error!("BULK | Worker {} accumulation task failed: {}", id, e);
            }
        }

        match &result {
            Ok(()) => debug!("BULK | Worker {} drained the queue", id),
            Err(e) => debug!("BULK | Worker {} interrupted: {}", id, e),
        }
        result
    }

    async fn send_loop(
        &self,
        accumulator: &Accumulator,
        detached: &mut JoinSet<Result<(), DeliveryError>>,
    ) -> Result<(), DeliveryError> {
        let debug = &self.ctx.debug;
        loop {
            debug.publish(DebugStatus::StartWait).await;
            let started = Instant::now();
            self.wait_for_batch(accumulator).await;
            let popped = accumulator.take();
            debug.publish(DebugStatus::FinishWait).await;
            debug
                .publish(DebugStatus::WaitDuration(started.elapsed()))
                .await;

            if !popped.is_empty() {
                let sender = BatchSender::new(&self.ctx);
                match self.config.dispatch {
                    BulkDispatch::Inline => sender.send(popped).await?,
                    BulkDispatch::Detached => {
                        detached.spawn(sender.send(popped));
                    }
                }
            }

            while let Some(joined) = detached.try_join_next() {
                flatten(joined)?;
            }

            // stop is checked first: once set, no further push can happen
            if accumulator.is_stopped() && accumulator.lock().is_empty() {
                return Ok(());
            }
        }
    }

    /// Returns when the timeout fires, the threshold is met, or the
    /// accumulation task has stopped.
    async fn wait_for_batch(&self, accumulator: &Accumulator) {
        let timeout = self.config.timeout.start();

        let threshold = async {
            loop {
                let notified = accumulator.appended.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if accumulator.is_stopped()
                    || !self.config.threshold.keep_waiting(&accumulator.lock())
                {
                    return;
                }
                notified.await;
            }
        };

        tokio::select! {
            () = timeout => {}
            () = threshold => {}
        }
    }
}

async fn accumulate(
    queue: Arc<DeliveryQueue>,
    accumulator: Arc<Accumulator>,
    delay: Option<Duration>,
) {
    while let Some(entry) = queue.dequeue().await {
        accumulator.push(entry);
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
    }
    accumulator.request_stop();
}

fn flatten(joined: Result<Result<(), DeliveryError>, JoinError>) -> Result<(), DeliveryError> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(DeliveryError::Cancelled),
        Err(e) => {
            warn!("BULK | Detached send panicked: {}", e);
            Ok(())
        }
    }
}

/// Owned copy of what one bulk send needs, so it can run detached.
#[derive(Clone)]
struct BatchSender {
    ctx: WorkerContext,
}

impl BatchSender {
    fn new(ctx: &WorkerContext) -> Self {
        Self { ctx: ctx.clone() }
    }

    async fn send(self, popped: Vec<QueueEntry>) -> Result<(), DeliveryError> {
        let ctx = &self.ctx;
        let count = popped.len();
        ctx.debug.publish(DebugStatus::StartSend).await;
        let started = Instant::now();

        let operations: Vec<BulkOperation> = popped
            .into_iter()
            .map(|entry| BulkOperation {
                index: entry.index,
                doc_id: Uuid::new_v4().to_string(),
                payload: entry.payload,
            })
            .collect();

        let what = format!("bulk of {count} documents");
        let result = send_with_retry(ctx.retry, &ctx.cancel, &what, || {
            ctx.backend.bulk(&operations)
        })
        .await;
        debug!("BULK | Worker {} sent {} documents", ctx.id, count);

        ctx.debug.publish(DebugStatus::FinishSend).await;
        ctx.debug
            .publish(DebugStatus::SendDuration(started.elapsed()))
            .await;
        ctx.debug.publish(DebugStatus::SentCount(count)).await;
        result
    }
}
