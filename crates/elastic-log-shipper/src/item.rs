// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log items handed to the shipper by the logging front-end.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Severity of a log item, ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
            Severity::Alert => "alert",
            Severity::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "notice" => Ok(Severity::Notice),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            "alert" => Ok(Severity::Alert),
            "emergency" => Ok(Severity::Emergency),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Source location the item was logged from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Location {
    pub package: String,
    pub module: String,
    pub function: String,
    pub line: u32,
    pub column: u32,
}

/// A single structured log event.
///
/// Items are immutable once built; the shipper takes ownership on submit.
#[derive(Clone, Debug, PartialEq)]
pub struct LogItem {
    pub app: String,
    pub env: String,
    pub severity: Severity,
    pub namespace: Vec<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub pid: u32,
    pub thread_id: String,
    pub location: Option<Location>,
    pub payload: Map<String, Value>,
}

impl LogItem {
    /// Builds an item stamped with the current time, host, process and thread.
    ///
    /// The host is read from `HOSTNAME` and falls back to `localhost` when the
    /// variable is not exported. The thread id is taken from the `Debug` form
    /// of [`std::thread::ThreadId`], which std does not promise to keep
    /// stable. Callers that need either value exact set it with
    /// [`LogItem::on_host`] and [`LogItem::on_thread`].
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            app: String::new(),
            env: String::new(),
            severity,
            namespace: Vec::new(),
            message: message.into(),
            timestamp: Utc::now(),
            host: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            pid: std::process::id(),
            thread_id: current_thread_id(),
            location: None,
            payload: Map::new(),
        }
    }

    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn on_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn on_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }

    #[must_use]
    pub fn in_namespace<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.namespace = segments.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

// "ThreadId(7)" -> "7"; best effort, the Debug format is not guaranteed
fn current_thread_id() -> String {
    let raw = format!("{:?}", std::thread::current().id());
    raw.trim_start_matches("ThreadId(")
        .trim_end_matches(')')
        .to_string()
}
