//! Logical contract for the remote persistent store.
//!
//! Transport and auth live behind this trait; the engine only sees typed
//! serde payloads. Records and filters are JSON objects, and a filter
//! matches a record when every filter field equals the record field.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote rejected {resource}: {message}")]
    Protocol { resource: String, message: String },
    #[error("no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl RemoteError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Protocol { .. } => "protocol",
            Self::Timeout { .. } => "timeout",
        }
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn query(&self, resource: &str, filter: &Value) -> Result<Vec<Value>, RemoteError>;
    async fn insert(&self, resource: &str, record: &Value) -> Result<Value, RemoteError>;
    async fn update(&self, resource: &str, filter: &Value, patch: &Value)
        -> Result<(), RemoteError>;
    async fn delete(&self, resource: &str, filter: &Value) -> Result<(), RemoteError>;
}

/// In-memory RemoteStore. Backs tests and offline runs; resources are
/// plain record lists matched by exact field equality.
#[derive(Default)]
pub struct MemoryRemote {
    resources: Mutex<HashMap<String, Vec<Value>>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self, resource: &str) -> usize {
        self.resources
            .lock()
            .get(resource)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

fn matches(record: &Value, filter: &Value) -> bool {
    match filter.as_object() {
        Some(fields) => fields
            .iter()
            .all(|(key, expected)| record.get(key) == Some(expected)),
        None => true,
    }
}

fn apply_patch(record: &mut Value, patch: &Value) {
    if let (Some(target), Some(fields)) = (record.as_object_mut(), patch.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn query(&self, resource: &str, filter: &Value) -> Result<Vec<Value>, RemoteError> {
        let resources = self.resources.lock();
        Ok(resources
            .get(resource)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| matches(record, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, resource: &str, record: &Value) -> Result<Value, RemoteError> {
        if !record.is_object() {
            return Err(RemoteError::Protocol {
                resource: resource.to_string(),
                message: "record must be an object".to_string(),
            });
        }
        let mut resources = self.resources.lock();
        resources
            .entry(resource.to_string())
            .or_default()
            .push(record.clone());
        Ok(record.clone())
    }

    async fn update(
        &self,
        resource: &str,
        filter: &Value,
        patch: &Value,
    ) -> Result<(), RemoteError> {
        let mut resources = self.resources.lock();
        if let Some(records) = resources.get_mut(resource) {
            for record in records.iter_mut() {
                if matches(record, filter) {
                    apply_patch(record, patch);
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, resource: &str, filter: &Value) -> Result<(), RemoteError> {
        let mut resources = self.resources.lock();
        if let Some(records) = resources.get_mut(resource) {
            records.retain(|record| !matches(record, filter));
        }
        Ok(())
    }
}
