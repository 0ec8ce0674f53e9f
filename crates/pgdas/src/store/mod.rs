//! Audit trail of SERPRO submissions. Records are keyed by taxpayer, period
//! and declaration type, never deleted, and only their status moves.

mod filesystem;
mod memory;
mod slips;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::clock::Clock;
use crate::declaration::{DeclarationType, Period};
use crate::transmission::FiscalReceipt;

pub use filesystem::FileSystemRepository;
pub(crate) use filesystem::file_stem;
pub use memory::InMemoryRepository;
pub use slips::{PaymentSlipKey, PaymentSlipRecord, PaymentSlipStore};

/// Document persisted under a stable string id.
pub trait StoredRecord: Clone + Serialize + DeserializeOwned + Send + Sync {
    fn record_id(&self) -> &str;
}

/// Keyed document store. `insert_new` must be atomic: of two concurrent
/// inserts for one id exactly one sees [`InsertOutcome::Inserted`].
pub trait RecordRepository<R: StoredRecord>: Send + Sync {
    fn insert_new(&self, record: R) -> Result<InsertOutcome, RepositoryError>;
    /// Insert or overwrite.
    fn replace(&self, record: R) -> Result<(), RepositoryError>;
    /// Overwrite an existing record; [`RepositoryError::NotFound`] otherwise.
    fn update(&self, record: R) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &str) -> Result<Option<R>, RepositoryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record {0} not found")]
    NotFound(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("record {id} is unreadable: {message}")]
    Corrupt { id: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmissionStatus {
    Pending,
    Success,
    Failure,
    AlreadySent,
}

impl fmt::Display for TransmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::AlreadySent => "ALREADY_SENT",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransmissionKey {
    pub taxpayer_id: String,
    pub period: Period,
    pub declaration_type: DeclarationType,
}

impl TransmissionKey {
    pub fn new(taxpayer_id: impl Into<String>, period: Period, declaration_type: DeclarationType) -> Self {
        Self {
            taxpayer_id: taxpayer_id.into(),
            period,
            declaration_type,
        }
    }

    pub fn id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.taxpayer_id,
            self.period,
            self.declaration_type.code()
        )
    }
}

impl fmt::Display for TransmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmissionRecord {
    pub id: String,
    pub taxpayer_id: String,
    pub period: Period,
    pub declaration_type: DeclarationType,
    pub status: TransmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub request_payload: Value,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub amounts_due: Vec<Value>,
    #[serde(default)]
    pub declaration_id: Option<String>,
    #[serde(default)]
    pub receipt: Option<Value>,
    #[serde(default)]
    pub document_base64: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl StoredRecord for TransmissionRecord {
    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Pending/success/failure lifecycle of PGDAS-D submissions.
pub struct TransmissionStore {
    repository: Arc<dyn RecordRepository<TransmissionRecord>>,
    clock: Arc<dyn Clock>,
}

impl TransmissionStore {
    pub fn new(
        repository: Arc<dyn RecordRepository<TransmissionRecord>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repository, clock }
    }

    /// An ORIGINAL is written only if nothing exists for the key yet; that
    /// check is the sole guard against filing the same period twice. An
    /// AMENDED always replaces whatever is there.
    pub fn insert_pending(
        &self,
        key: &TransmissionKey,
        request_payload: Value,
    ) -> Result<InsertOutcome, RepositoryError> {
        let now = self.clock.now();
        let record = TransmissionRecord {
            id: key.id(),
            taxpayer_id: key.taxpayer_id.clone(),
            period: key.period,
            declaration_type: key.declaration_type,
            status: TransmissionStatus::Pending,
            created_at: now,
            updated_at: now,
            request_payload,
            response: None,
            amounts_due: Vec::new(),
            declaration_id: None,
            receipt: None,
            document_base64: None,
            error_message: None,
        };

        match key.declaration_type {
            DeclarationType::Original => self.repository.insert_new(record),
            DeclarationType::Amended => {
                self.repository.replace(record)?;
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    pub fn mark_success(
        &self,
        key: &TransmissionKey,
        response: &Value,
    ) -> Result<TransmissionRecord, RepositoryError> {
        let mut record = self.existing(key)?;
        let receipt = FiscalReceipt::from_response(response);

        record.status = TransmissionStatus::Success;
        record.updated_at = self.clock.now();
        record.response = Some(response.clone());
        record.amounts_due = receipt.amounts_due;
        record.declaration_id = receipt.declaration_id;
        record.receipt = receipt.receipt;
        record.document_base64 = receipt.document_base64;
        record.error_message = None;

        self.repository.update(record.clone())?;
        info!(key = %key, "transmission recorded as SUCCESS");
        Ok(record)
    }

    pub fn mark_failure(
        &self,
        key: &TransmissionKey,
        response: Option<&Value>,
        message: &str,
    ) -> Result<TransmissionRecord, RepositoryError> {
        let mut record = self.existing(key)?;

        record.status = TransmissionStatus::Failure;
        record.updated_at = self.clock.now();
        record.response = response.cloned();
        record.error_message = Some(message.to_string());

        self.repository.update(record.clone())?;
        info!(key = %key, error = message, "transmission recorded as FAILURE");
        Ok(record)
    }

    pub fn fetch(&self, key: &TransmissionKey) -> Result<Option<TransmissionRecord>, RepositoryError> {
        self.repository.fetch(&key.id())
    }

    fn existing(&self, key: &TransmissionKey) -> Result<TransmissionRecord, RepositoryError> {
        self.repository
            .fetch(&key.id())?
            .ok_or_else(|| RepositoryError::NotFound(key.id()))
    }
}

impl fmt::Debug for TransmissionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransmissionStore").finish_non_exhaustive()
    }
}
