// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Optional side channel of worker and reporter lifecycle events.
//!
//! Workers hold a [`DebugChannel`] whether or not debugging is configured;
//! publishing on a channel built from a disabled [`DebugConfig`] does nothing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::trace;

const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle event published by workers and the queue reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugStatus {
    /// A send of `n` documents finished, successful or not.
    SentCount(usize),
    StartWait,
    FinishWait,
    WaitDuration(Duration),
    StartSend,
    FinishSend,
    SendDuration(Duration),
    EstimatedQueueLength(usize),
    TrueQueueLength(usize),
}

impl DebugStatus {
    /// Whether the event comes from the queue reporter rather than a worker.
    #[must_use]
    pub fn is_queue_length(&self) -> bool {
        matches!(
            self,
            DebugStatus::EstimatedQueueLength(_) | DebugStatus::TrueQueueLength(_)
        )
    }
}

impl fmt::Display for DebugStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebugStatus::SentCount(n) => write!(f, "Sent {n} documents"),
            DebugStatus::StartWait => write!(f, "Started waiting for a batch"),
            DebugStatus::FinishWait => write!(f, "Finished waiting for a batch"),
            DebugStatus::WaitDuration(d) => write!(f, "Waited {} ms", d.as_millis()),
            DebugStatus::StartSend => write!(f, "Started sending"),
            DebugStatus::FinishSend => write!(f, "Finished sending"),
            DebugStatus::SendDuration(d) => write!(f, "Send took {} ms", d.as_millis()),
            DebugStatus::EstimatedQueueLength(n) => write!(f, "Estimated queue length {n}"),
            DebugStatus::TrueQueueLength(n) => write!(f, "True queue length {n}"),
        }
    }
}

/// What a [`DebugSender`] does when its channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Wait for room, slowing down the publisher.
    #[default]
    Block,
    /// Discard the event.
    Drop,
}

/// Bounded event sink.
#[derive(Debug, Clone)]
pub struct DebugSender {
    pub tx: mpsc::Sender<DebugStatus>,
    pub overflow: Overflow,
}

impl DebugSender {
    /// Creates a sender and the receiver tests or tooling read events from.
    #[must_use]
    pub fn channel(capacity: usize, overflow: Overflow) -> (Self, mpsc::Receiver<DebugStatus>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, overflow }, rx)
    }
}

/// Text sink receiving every event rendered with [`fmt::Display`].
pub type ReportFn = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct DebugConfig {
    pub report: Option<ReportFn>,
    pub channel: Option<DebugSender>,
    /// Period of the queue reporter.
    pub report_interval: Duration,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            report: None,
            channel: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

impl fmt::Debug for DebugConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugConfig")
            .field("report", &self.report.as_ref().map(|_| "<fn>"))
            .field("channel", &self.channel)
            .field("report_interval", &self.report_interval)
            .finish()
    }
}

impl DebugConfig {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.report.is_some() || self.channel.is_some()
    }
}

struct Sinks {
    report: Option<ReportFn>,
    channel: Option<DebugSender>,
}

/// Publisher handle shared by every task of a shipper.
#[derive(Clone, Default)]
pub struct DebugChannel {
    inner: Option<Arc<Sinks>>,
}

impl fmt::Debug for DebugChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugChannel")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl DebugChannel {
    #[must_use]
    pub fn from_config(config: &DebugConfig) -> Self {
        if !config.is_enabled() {
            return Self::disabled();
        }
        Self {
            inner: Some(Arc::new(Sinks {
                report: config.report.clone(),
                channel: config.channel.clone(),
            })),
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub async fn publish(&self, status: DebugStatus) {
        let Some(sinks) = &self.inner else {
            return;
        };
        trace!("DEBUG | {}", status);

        if let Some(report) = &sinks.report {
            report(&status.to_string());
        }

        if let Some(sender) = &sinks.channel {
            match sender.overflow {
                Overflow::Block => {
                    // a dropped receiver only means nobody is listening anymore
                    let _ = sender.tx.send(status).await;
                }
                Overflow::Drop => {
                    if let Err(mpsc::error::TrySendError::Full(dropped)) =
                        sender.tx.try_send(status)
                    {
                        trace!("DEBUG | Channel full, dropping {:?}", dropped);
                    }
                }
            }
        }
    }
}
