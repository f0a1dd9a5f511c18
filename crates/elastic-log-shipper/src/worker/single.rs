// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Instant;

use tracing::debug;
use uuid::Uuid;

use super::delivery::send_with_retry;
use super::WorkerContext;
use crate::debug::DebugStatus;
use crate::error::DeliveryError;

/// Sends one index request per dequeued entry.
pub struct SingleItemWorker {
    ctx: WorkerContext,
}

impl SingleItemWorker {
    #[must_use]
    pub fn new(ctx: WorkerContext) -> Self {
        Self { ctx }
    }

    /// Drains the queue until it is closed and empty.
    pub async fn run(self) -> Result<(), DeliveryError> {
        let ctx = &self.ctx;
        debug!("SHIPPER | Single item worker {} started", ctx.id);

        while let Some(entry) = ctx.queue.dequeue().await {
            ctx.debug.publish(DebugStatus::StartSend).await;
            let started = Instant::now();

            let backend = &ctx.backend;
            let result = send_with_retry(ctx.retry, &ctx.cancel, "document", || {
                // every attempt writes under a fresh id
                let doc_id = Uuid::new_v4().to_string();
                let entry = &entry;
                async move {
                    backend
                        .index_document(&entry.index, &doc_id, &entry.payload)
                        .await
                }
            })
            .await;

            ctx.debug.publish(DebugStatus::FinishSend).await;
            ctx.debug
                .publish(DebugStatus::SendDuration(started.elapsed()))
                .await;
            ctx.debug.publish(DebugStatus::SentCount(1)).await;

            if let Err(e) = result {
                debug!("SHIPPER | Single item worker {} interrupted: {}", ctx.id, e);
                return Err(e);
            }
        }

        debug!("SHIPPER | Single item worker {} drained the queue", ctx.id);
        Ok(())
    }
}
