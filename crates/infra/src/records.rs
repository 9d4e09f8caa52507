//! Audit records for AI provider jobs.
//!
//! One row per provider job, keyed by the job id. Rows are never deleted and
//! only `status`, `attempts`, `error` and `updated_at` change after insert. The
//! prompt itself is not stored; a SHA-256 of it is kept for dedup and metrics.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

use brainflow_core::UserId;

use crate::jobs::JobId;

/// Status of a provider job as seen by the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Processing,
    /// Last attempt failed transiently; another one is scheduled.
    Retrying,
    Completed,
    Failed,
}

impl RecordStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::Completed | RecordStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub provider: String,
    /// Provider operation, e.g. `generate:release_notes`.
    pub method: String,
    pub content_hash: String,
    pub content_length: usize,
    pub options: JsonValue,
    pub status: RecordStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Hex SHA-256 of a prompt.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

impl JobRecord {
    pub fn new(
        id: JobId,
        provider: impl Into<String>,
        method: impl Into<String>,
        prompt: &str,
        options: JsonValue,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            provider: provider.into(),
            method: method.into(),
            content_hash: content_hash(prompt),
            content_length: prompt.chars().count(),
            options,
            status: RecordStatus::Pending,
            attempts: 0,
            error: None,
            user_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, status: RecordStatus, error: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.error = error;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RecordStoreError {
    #[error("job record not found: {0}")]
    NotFound(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Append-mostly audit table; concurrent inserts from different workers are fine.
pub trait JobRecordStore: Send + Sync {
    /// Insert the record, or return the existing one for the same job id.
    fn insert_or_get(&self, record: JobRecord) -> Result<JobRecord, RecordStoreError>;

    fn get(&self, id: JobId) -> Result<Option<JobRecord>, RecordStoreError>;

    /// Status transition (the only mutation allowed after insert).
    fn update_status(
        &self,
        id: JobId,
        status: RecordStatus,
        attempts: u32,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, RecordStoreError>;

    fn list_for_user(&self, user_id: UserId) -> Result<Vec<JobRecord>, RecordStoreError>;
}

impl<S> JobRecordStore for Arc<S>
where
    S: JobRecordStore + ?Sized,
{
    fn insert_or_get(&self, record: JobRecord) -> Result<JobRecord, RecordStoreError> {
        (**self).insert_or_get(record)
    }

    fn get(&self, id: JobId) -> Result<Option<JobRecord>, RecordStoreError> {
        (**self).get(id)
    }

    fn update_status(
        &self,
        id: JobId,
        status: RecordStatus,
        attempts: u32,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, RecordStoreError> {
        (**self).update_status(id, status, attempts, error, now)
    }

    fn list_for_user(&self, user_id: UserId) -> Result<Vec<JobRecord>, RecordStoreError> {
        (**self).list_for_user(user_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryJobRecordStore {
    records: RwLock<HashMap<JobId, JobRecord>>,
}

impl InMemoryJobRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> RecordStoreError {
    RecordStoreError::Storage("job record lock poisoned".to_string())
}

impl JobRecordStore for InMemoryJobRecordStore {
    fn insert_or_get(&self, record: JobRecord) -> Result<JobRecord, RecordStoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        Ok(records.entry(record.id).or_insert(record).clone())
    }

    fn get(&self, id: JobId) -> Result<Option<JobRecord>, RecordStoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(&id).cloned())
    }

    fn update_status(
        &self,
        id: JobId,
        status: RecordStatus,
        attempts: u32,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, RecordStoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let record = records.get_mut(&id).ok_or(RecordStoreError::NotFound(id))?;
        record.attempts = attempts;
        record.transition(status, error, now);
        Ok(record.clone())
    }

    fn list_for_user(&self, user_id: UserId) -> Result<Vec<JobRecord>, RecordStoreError> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut result: Vec<JobRecord> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by_key(|r| r.created_at);
        Ok(result)
    }
}
