// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use elastic_log_shipper::backend::{Backend, BackendResponse, BulkOperation};
use elastic_log_shipper::debug::DebugStatus;
use elastic_log_shipper::{BackendError, IndexSettings};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Default)]
struct State {
    indices: HashSet<String>,
    mappings: HashMap<String, Value>,
    /// template name -> pattern
    templates: HashMap<String, String>,
    documents: HashMap<String, Vec<Value>>,
    doc_ids: Vec<String>,
    /// Statuses answered to the next document writes, in order.
    scripted: VecDeque<StatusCode>,
    create_index_status: Option<StatusCode>,
    mapping_status: Option<StatusCode>,
    template_status: Option<StatusCode>,
    send_delay: Option<Duration>,
    index_calls: usize,
    bulk_sizes: Vec<usize>,
}

/// Backend keeping everything in memory, with scriptable failures.
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(self, index: &str) -> Self {
        self.state.lock().unwrap().indices.insert(index.to_string());
        self
    }

    pub fn with_template(self, name: &str, pattern: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .templates
            .insert(name.to_string(), pattern.to_string());
        self
    }

    pub fn failing_create_index(self, status: StatusCode) -> Self {
        self.state.lock().unwrap().create_index_status = Some(status);
        self
    }

    pub fn failing_mapping(self, status: StatusCode) -> Self {
        self.state.lock().unwrap().mapping_status = Some(status);
        self
    }

    pub fn failing_template(self, status: StatusCode) -> Self {
        self.state.lock().unwrap().template_status = Some(status);
        self
    }

    /// Delay applied to every document write.
    pub fn with_send_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().send_delay = Some(delay);
        self
    }

    /// The next document writes answer these statuses instead of storing.
    pub fn script(&self, statuses: impl IntoIterator<Item = StatusCode>) {
        self.state.lock().unwrap().scripted.extend(statuses);
    }

    pub fn documents(&self, index: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .documents
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_documents(&self) -> usize {
        self.state.lock().unwrap().documents.values().map(Vec::len).sum()
    }

    pub fn indices_with_documents(&self) -> Vec<String> {
        let mut indices: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .documents
            .keys()
            .cloned()
            .collect();
        indices.sort();
        indices
    }

    pub fn doc_ids(&self) -> Vec<String> {
        self.state.lock().unwrap().doc_ids.clone()
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.state.lock().unwrap().indices.contains(index)
    }

    pub fn mapping(&self, index: &str) -> Option<Value> {
        self.state.lock().unwrap().mappings.get(index).cloned()
    }

    pub fn template_pattern(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().templates.get(name).cloned()
    }

    pub fn index_calls(&self) -> usize {
        self.state.lock().unwrap().index_calls
    }

    pub fn bulk_sizes(&self) -> Vec<usize> {
        self.state.lock().unwrap().bulk_sizes.clone()
    }

    fn admin_response(status: Option<StatusCode>) -> BackendResponse {
        match status {
            Some(status) => BackendResponse::new(status, "scripted failure"),
            None => BackendResponse::ok(),
        }
    }

    /// Scripted failure for the next write, if any.
    fn next_failure(&self) -> Option<BackendResponse> {
        let mut state = self.state.lock().unwrap();
        match state.scripted.pop_front() {
            Some(status) if !status.is_success() => {
                Some(BackendResponse::new(status, "scripted failure"))
            }
            _ => None,
        }
    }

    async fn delay(&self) {
        let delay = self.state.lock().unwrap().send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        Ok(self.has_index(index))
    }

    async fn template_exists(&self, name: &str) -> Result<bool, BackendError> {
        Ok(self.template_pattern(name).is_some())
    }

    async fn create_index(
        &self,
        index: &str,
        _settings: &IndexSettings,
    ) -> Result<BackendResponse, BackendError> {
        let mut state = self.state.lock().unwrap();
        let response = Self::admin_response(state.create_index_status);
        if response.is_success() {
            state.indices.insert(index.to_string());
        }
        Ok(response)
    }

    async fn put_index_template(
        &self,
        name: &str,
        pattern: &str,
        _settings: &IndexSettings,
        _mapping: &Value,
    ) -> Result<BackendResponse, BackendError> {
        let mut state = self.state.lock().unwrap();
        let response = Self::admin_response(state.template_status);
        if response.is_success() {
            state.templates.insert(name.to_string(), pattern.to_string());
        }
        Ok(response)
    }

    async fn put_mapping(
        &self,
        index: &str,
        mapping: &Value,
    ) -> Result<BackendResponse, BackendError> {
        let mut state = self.state.lock().unwrap();
        let response = Self::admin_response(state.mapping_status);
        if response.is_success() {
            state.mappings.insert(index.to_string(), mapping.clone());
        }
        Ok(response)
    }

    async fn index_document(
        &self,
        index: &str,
        doc_id: &str,
        payload: &Value,
    ) -> Result<BackendResponse, BackendError> {
        self.state.lock().unwrap().index_calls += 1;
        self.delay().await;
        if let Some(failure) = self.next_failure() {
            return Ok(failure);
        }
        let mut state = self.state.lock().unwrap();
        state
            .documents
            .entry(index.to_string())
            .or_default()
            .push(payload.clone());
        state.doc_ids.push(doc_id.to_string());
        Ok(BackendResponse::new(StatusCode::CREATED, ""))
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BackendResponse, BackendError> {
        self.delay().await;
        if let Some(failure) = self.next_failure() {
            return Ok(failure);
        }
        let mut state = self.state.lock().unwrap();
        state.bulk_sizes.push(operations.len());
        for op in operations {
            state
                .documents
                .entry(op.index.clone())
                .or_default()
                .push(op.payload.clone());
            state.doc_ids.push(op.doc_id.clone());
        }
        Ok(BackendResponse::ok())
    }
}

/// Next event published by a worker, skipping queue length samples.
pub async fn next_worker_event(rx: &mut mpsc::Receiver<DebugStatus>) -> DebugStatus {
    loop {
        let status = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a debug event")
            .expect("debug channel closed");
        if !status.is_queue_length() {
            return status;
        }
    }
}

/// Event name with durations erased, for comparing sequences.
pub fn shape(status: &DebugStatus) -> String {
    match status {
        DebugStatus::WaitDuration(_) => "WaitDuration".to_string(),
        DebugStatus::SendDuration(_) => "SendDuration".to_string(),
        other => format!("{other:?}"),
    }
}
