use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{InsertOutcome, RecordRepository, RepositoryError, StoredRecord, TransmissionStatus};
use crate::clock::Clock;
use crate::declaration::Period;
use crate::transmission::{PaymentSlip, PaymentSlipRequest};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaymentSlipKey {
    pub taxpayer_id: String,
    pub period: Period,
    pub consolidation_date: NaiveDate,
}

impl PaymentSlipKey {
    pub fn id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.taxpayer_id,
            self.period,
            self.consolidation_date.format("%Y%m%d")
        )
    }
}

impl From<&PaymentSlipRequest> for PaymentSlipKey {
    fn from(request: &PaymentSlipRequest) -> Self {
        Self {
            taxpayer_id: request.taxpayer_id.clone(),
            period: request.period,
            consolidation_date: request.consolidation_date,
        }
    }
}

impl fmt::Display for PaymentSlipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSlipRecord {
    pub id: String,
    pub taxpayer_id: String,
    pub period: Period,
    pub consolidation_date: String,
    pub status: TransmissionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub request_payload: Value,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub pdf_base64: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl StoredRecord for PaymentSlipRecord {
    fn record_id(&self) -> &str {
        &self.id
    }
}

/// DAS issuance attempts. One slip per taxpayer, period and consolidation
/// date; a second request for the same key is reported as existing.
pub struct PaymentSlipStore {
    repository: Arc<dyn RecordRepository<PaymentSlipRecord>>,
    clock: Arc<dyn Clock>,
}

impl PaymentSlipStore {
    pub fn new(
        repository: Arc<dyn RecordRepository<PaymentSlipRecord>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repository, clock }
    }

    pub fn insert_pending(
        &self,
        request: &PaymentSlipRequest,
    ) -> Result<InsertOutcome, RepositoryError> {
        let key = PaymentSlipKey::from(request);
        let now = self.clock.now();
        self.repository.insert_new(PaymentSlipRecord {
            id: key.id(),
            taxpayer_id: key.taxpayer_id.clone(),
            period: key.period,
            consolidation_date: request.consolidation_label(),
            status: TransmissionStatus::Pending,
            created_at: now,
            updated_at: now,
            request_payload: request.payload(),
            response: None,
            pdf_base64: None,
            details: None,
            error_message: None,
        })
    }

    pub fn mark_success(
        &self,
        key: &PaymentSlipKey,
        slip: &PaymentSlip,
        response: &Value,
    ) -> Result<PaymentSlipRecord, RepositoryError> {
        let mut record = self.existing(key)?;
        record.status = TransmissionStatus::Success;
        record.updated_at = self.clock.now();
        record.response = Some(response.clone());
        record.pdf_base64 = slip.pdf_base64.clone();
        record.details = slip.details.clone();
        record.error_message = None;

        self.repository.update(record.clone())?;
        info!(key = %key, has_pdf = record.pdf_base64.is_some(), "DAS recorded as SUCCESS");
        Ok(record)
    }

    pub fn mark_failure(
        &self,
        key: &PaymentSlipKey,
        response: Option<&Value>,
        message: &str,
    ) -> Result<PaymentSlipRecord, RepositoryError> {
        let mut record = self.existing(key)?;
        record.status = TransmissionStatus::Failure;
        record.updated_at = self.clock.now();
        record.response = response.cloned();
        record.error_message = Some(message.to_string());

        self.repository.update(record.clone())?;
        info!(key = %key, error = message, "DAS recorded as FAILURE");
        Ok(record)
    }

    pub fn fetch(&self, key: &PaymentSlipKey) -> Result<Option<PaymentSlipRecord>, RepositoryError> {
        self.repository.fetch(&key.id())
    }

    fn existing(&self, key: &PaymentSlipKey) -> Result<PaymentSlipRecord, RepositoryError> {
        self.repository
            .fetch(&key.id())?
            .ok_or_else(|| RepositoryError::NotFound(key.id()))
    }
}

impl fmt::Debug for PaymentSlipStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentSlipStore").finish_non_exhaustive()
    }
}
