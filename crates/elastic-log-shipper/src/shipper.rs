// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Startup, submission and shutdown of a shipper.
//!
//! [`Shipper::start`] prepares the backend, then spawns the worker pool and,
//! when debugging is enabled, the queue reporter. It hands back a
//! [`ShipperHandle`] that every producer clones.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;
use crate::config::{AdminMode, SendStrategy, ShipperConfig};
use crate::debug::DebugChannel;
use crate::error::{DeliveryError, ShipperError};
use crate::item::{LogItem, Severity};
use crate::payload::{base_mapping, encode};
use crate::queue::{DeliveryQueue, QueueEntry};
use crate::reporter::QueueReporter;
use crate::retry::RetryStrategy;
use crate::routing::{route, template_pattern, ShardingPolicy};
use crate::worker::{BulkWorker, SingleItemWorker, WorkerContext};

pub struct Shipper;

impl Shipper {
    /// Validates `config`, prepares the backend and starts the workers.
    ///
    /// Setup failures are returned here and nothing is left running.
    pub async fn start(
        config: ShipperConfig,
        backend: Arc<dyn Backend>,
    ) -> Result<ShipperHandle, ShipperError> {
        config.validate()?;
        prepare_backend(&config, backend.as_ref()).await?;

        let queue = Arc::new(DeliveryQueue::new(config.queue_size));
        let debug = DebugChannel::from_config(&config.debug);
        let abort = CancellationToken::new();

        let ctx = WorkerContext {
            id: 0,
            queue: Arc::clone(&queue),
            backend,
            retry: config.retry_strategy,
            debug: debug.clone(),
            cancel: abort.clone(),
        };
        let workers: Vec<_> = (0..config.pool_size)
            .map(|id| {
                let ctx = ctx.with_id(id);
                match &config.send_strategy {
                    SendStrategy::Single => tokio::spawn(SingleItemWorker::new(ctx).run()),
                    SendStrategy::Bulk(bulk) => {
                        tokio::spawn(BulkWorker::new(ctx, bulk.clone()).run())
                    }
                }
            })
            .collect();

        let reporter_cancel = CancellationToken::new();
        let reporter = debug.is_enabled().then(|| {
            tokio::spawn(
                QueueReporter::new(
                    Arc::clone(&queue),
                    debug,
                    config.debug.report_interval,
                    reporter_cancel.clone(),
                )
                .run(),
            )
        });

        info!(
            "SHIPPER | Started {} workers shipping to index {}",
            config.pool_size, config.index_name
        );

        Ok(ShipperHandle {
            inner: Arc::new(Inner {
                index_name: config.index_name,
                sharding: config.sharding,
                annotate_types: config.annotate_types,
                min_severity: config.min_severity,
                enqueue_strategy: config.guarantee.strategy(),
                app: config.app,
                env: config.env,
                shutdown_timeout: config.shutdown_timeout,
                queue,
                abort,
                reporter_cancel,
                tasks: Mutex::new(Some(Tasks { workers, reporter })),
            }),
        })
    }
}

async fn prepare_backend(config: &ShipperConfig, backend: &dyn Backend) -> Result<(), ShipperError> {
    let index = &config.index_name;
    match (config.admin_mode, config.sharding.is_sharded()) {
        (AdminMode::None, _) => {
            debug!("SHIPPER | Backend administration disabled");
        }
        (AdminMode::CheckOnly, false) => {
            if !backend.index_exists(index).await? {
                return Err(ShipperError::IndexMissing(index.clone()));
            }
        }
        (AdminMode::CheckOnly, true) => {
            if !backend.template_exists(index).await? {
                return Err(ShipperError::IndexMissing(template_pattern(index)));
            }
        }
        (AdminMode::Full, false) => {
            if backend.index_exists(index).await? {
                debug!("SHIPPER | Index {} already exists", index);
                return Ok(());
            }
            let response = backend.create_index(index, &config.index_settings).await?;
            if !response.is_success() {
                return Err(ShipperError::IndexCreation {
                    index: index.clone(),
                    status: response.status,
                    body: response.body,
                });
            }
            let response = backend.put_mapping(index, &base_mapping()).await?;
            if !response.is_success() {
                return Err(ShipperError::MappingCreation {
                    index: index.clone(),
                    status: response.status,
                    body: response.body,
                });
            }
            info!("SHIPPER | Created index {}", index);
        }
        (AdminMode::Full, true) => {
            if backend.template_exists(index).await? {
                debug!("SHIPPER | Index template {} already exists", index);
                return Ok(());
            }
            let pattern = template_pattern(index);
            let response = backend
                .put_index_template(index, &pattern, &config.index_settings, &base_mapping())
                .await?;
            if !response.is_success() {
                return Err(ShipperError::TemplateCreation {
                    template: index.clone(),
                    status: response.status,
                    body: response.body,
                });
            }
            info!("SHIPPER | Created index template {} for {}", index, pattern);
        }
    }
    Ok(())
}

struct Tasks {
    workers: Vec<JoinHandle<Result<(), DeliveryError>>>,
    reporter: Option<JoinHandle<()>>,
}

struct Inner {
    index_name: String,
    sharding: ShardingPolicy,
    annotate_types: bool,
    min_severity: Severity,
    enqueue_strategy: RetryStrategy,
    app: String,
    env: String,
    shutdown_timeout: Option<Duration>,
    queue: Arc<DeliveryQueue>,
    /// Cancels in-flight sends once the shutdown timeout expires.
    abort: CancellationToken,
    reporter_cancel: CancellationToken,
    /// `None` once shut down.
    tasks: Mutex<Option<Tasks>>,
}

impl Drop for Inner {
    // Dropping every handle without `shutdown` still lets the workers drain
    // and exit, but nothing waits for them.
    fn drop(&mut self) {
        if !self.queue.is_closed() {
            debug!("SHIPPER | Last handle dropped without shutdown, closing queue");
            self.queue.close();
        }
        self.reporter_cancel.cancel();
    }
}

/// Producer side of a running shipper. Cheap to clone.
///
/// Call [`ShipperHandle::shutdown`] to wait for queued items to be delivered.
/// When the last clone is dropped instead, the queue is closed and the
/// workers finish in the background.
#[derive(Clone)]
pub struct ShipperHandle {
    inner: Arc<Inner>,
}

impl ShipperHandle {
    /// Encodes, routes and enqueues `item`.
    ///
    /// Returns whether the item made it into the queue. Items below the
    /// minimum severity, items submitted after shutdown began and items still
    /// rejected once the logging guarantee gives up are dropped.
    pub async fn submit(&self, mut item: LogItem) -> bool {
        let inner = &self.inner;
        if item.severity < inner.min_severity {
            return false;
        }
        if item.app.is_empty() {
            item.app.clone_from(&inner.app);
        }
        if item.env.is_empty() {
            item.env.clone_from(&inner.env);
        }

        let index = route(&inner.index_name, &inner.sharding, &item);
        let mut entry = QueueEntry::new(index, encode(&item, inner.annotate_types));

        let mut attempt = 1;
        loop {
            match inner.queue.try_enqueue(entry) {
                Ok(()) => return true,
                Err(rejected) => entry = rejected,
            }
            if inner.queue.is_closed() {
                debug!("SHIPPER | Dropping log item submitted after shutdown");
                return false;
            }
            attempt += 1;
            let Some(delay) = inner.enqueue_strategy.delay_before(attempt) else {
                warn!(
                    "SHIPPER | Queue full, dropping log item after {} attempts",
                    attempt - 1
                );
                return false;
            };
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Approximate number of entries waiting in the queue.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.inner.queue.approximate_len()
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.queue.is_closed()
    }

    /// Stops accepting items, waits for the workers to drain the queue, then
    /// stops the reporter.
    ///
    /// Every entry enqueued before this call is delivered or has exhausted
    /// its retries when it returns. With a shutdown timeout, in-flight sends
    /// are cancelled once it expires. Calling it again, from any clone, waits
    /// for the first call to finish and returns.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        let mut tasks = inner.tasks.lock().await;
        let Some(Tasks { workers, reporter }) = tasks.take() else {
            return;
        };

        info!(
            "SHIPPER | Shutting down, draining about {} queued entries",
            inner.queue.approximate_len()
        );
        inner.queue.close();

        let drain = join_workers(workers);
        tokio::pin!(drain);
        match inner.shutdown_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, drain.as_mut()).await.is_err() {
                    warn!(
                        "SHIPPER | Drain did not finish within {:?}, cancelling in-flight sends",
                        limit
                    );
                    inner.abort.cancel();
                    drain.await;
                }
            }
            None => drain.await,
        }

        inner.reporter_cancel.cancel();
        if let Some(reporter) = reporter {
            if let Err(e) = reporter.await {
                error!("SHIPPER | Queue reporter failed: {}", e);
            }
        }
        info!("SHIPPER | Shutdown complete");
    }
}

async fn join_workers(workers: Vec<JoinHandle<Result<(), DeliveryError>>>) {
    for (id, worker) in workers.into_iter().enumerate() {
        match worker.await {
            Ok(Ok(())) => {}
            Ok(Err(DeliveryError::Cancelled)) => {
                warn!("SHIPPER | Worker {} cancelled with sends in flight", id);
            }
            Ok(Err(e)) => error!("SHIPPER | Worker {} stopped: {}", id, e),
            Err(e) => error!("SHIPPER | Worker {} failed: {}", id, e),
        }
    }
}
