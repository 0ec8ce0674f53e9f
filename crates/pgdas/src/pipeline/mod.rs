//! Per-taxpayer filing chain: revenue rows, assembly, audit record,
//! transmission, polling and partner notification.

mod partner;
mod payment_slip;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::archive;
use crate::declaration::{
    AssembledDeclaration, AssemblyError, Declaration, DeclarationAssembler, DeclarationType,
    Period, UnresolvedSegment,
};
use crate::sources::{RevenueSource, SourceError};
use crate::store::{
    InsertOutcome, RepositoryError, TransmissionKey, TransmissionStatus, TransmissionStore,
};
use crate::transmission::{FiscalReceipt, StatusPoller, TransmissionClient};

pub use partner::{NotifyError, PartnerNotifier, PartnerPayload};
pub use payment_slip::{PaymentSlipOutcome, PaymentSlipPipeline};

/// What happened to one taxpayer's declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub key: TransmissionKey,
    /// `SUCCESS`, `FAILURE` or `ALREADY_SENT`; never `PENDING`.
    pub status: TransmissionStatus,
    pub response: Option<Value>,
    pub receipt: Option<FiscalReceipt>,
    pub error_message: Option<String>,
    pub unresolved: Vec<UnresolvedSegment>,
}

impl PipelineOutcome {
    fn new(key: TransmissionKey, status: TransmissionStatus, unresolved: Vec<UnresolvedSegment>) -> Self {
        Self {
            key,
            status,
            response: None,
            receipt: None,
            error_message: None,
            unresolved,
        }
    }
}

/// Errors that stop a taxpayer before anything reaches SERPRO, or that leave
/// the audit store unable to record what happened.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("could not encode declaration: {0}")]
    Encoding(#[from] serde_json::Error),
}

struct Rejection {
    response: Option<Value>,
    message: String,
}

pub struct DeclarationPipeline {
    revenue: Arc<dyn RevenueSource>,
    assembler: DeclarationAssembler,
    store: TransmissionStore,
    client: Arc<TransmissionClient>,
    poller: StatusPoller,
    notifier: Option<Arc<dyn PartnerNotifier>>,
    archive_dir: Option<PathBuf>,
}

impl DeclarationPipeline {
    pub fn new(
        revenue: Arc<dyn RevenueSource>,
        assembler: DeclarationAssembler,
        store: TransmissionStore,
        client: Arc<TransmissionClient>,
        poller: StatusPoller,
    ) -> Self {
        Self {
            revenue,
            assembler,
            store,
            client,
            poller,
            notifier: None,
            archive_dir: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn PartnerNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Keeps a copy of every assembled payload under `dir`, labelled with the
    /// first row's establishment.
    pub fn with_archive(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    pub fn store(&self) -> &TransmissionStore {
        &self.store
    }

    /// Files one declaration. Every SERPRO-side failure (authentication,
    /// rejection, exhausted retries, poll timeout) is recorded as `FAILURE`
    /// and returned as an outcome rather than an error.
    pub fn run(
        &self,
        taxpayer_id: &str,
        period: Period,
        declaration_type: DeclarationType,
    ) -> Result<PipelineOutcome, PipelineError> {
        let rows = self.revenue.revenue_rows(taxpayer_id, period)?;
        let AssembledDeclaration {
            declaration,
            unresolved,
        } = self.assembler.build(&rows, declaration_type)?;
        if !unresolved.is_empty() {
            warn!(
                taxpayer = taxpayer_id,
                period = %period,
                rows = unresolved.len(),
                "declaration excludes rows without an activity id"
            );
        }

        if let Some(dir) = &self.archive_dir {
            let label = rows.first().map(|row| row.establishment_id.as_str());
            if let Err(err) = archive::save_payload(&declaration, label, dir, true) {
                warn!(taxpayer = taxpayer_id, error = %err, "could not archive declaration payload");
            }
        }

        let key = TransmissionKey::new(
            declaration.taxpayer_id.clone(),
            declaration.period,
            declaration_type,
        );
        if self.store.insert_pending(&key, declaration.to_wire()?)? == InsertOutcome::AlreadyExists {
            info!(key = %key, "declaration already on record, skipping");
            return Ok(PipelineOutcome::new(
                key,
                TransmissionStatus::AlreadySent,
                unresolved,
            ));
        }

        match self.transmit(&declaration) {
            Ok(body) => {
                let record = self.store.mark_success(&key, &body)?;
                let receipt = FiscalReceipt::from_response(&body);
                self.notify(&key, &receipt);

                let mut outcome = PipelineOutcome::new(key, record.status, unresolved);
                outcome.response = record.response;
                outcome.receipt = Some(receipt);
                Ok(outcome)
            }
            Err(rejection) => {
                warn!(key = %key, error = %rejection.message, "declaration not accepted");
                let record =
                    self.store
                        .mark_failure(&key, rejection.response.as_ref(), &rejection.message)?;

                let mut outcome = PipelineOutcome::new(key, record.status, unresolved);
                outcome.response = record.response;
                outcome.error_message = record.error_message;
                Ok(outcome)
            }
        }
    }

    /// Runs taxpayers one after another; one taxpayer's error never stops
    /// the rest.
    pub fn run_batch(
        &self,
        taxpayers: &[String],
        period: Period,
        declaration_type: DeclarationType,
    ) -> Vec<(String, Result<PipelineOutcome, PipelineError>)> {
        taxpayers
            .iter()
            .map(|taxpayer_id| {
                let result = self.run(taxpayer_id, period, declaration_type);
                if let Err(err) = &result {
                    warn!(taxpayer = %taxpayer_id, error = %err, "taxpayer skipped");
                }
                (taxpayer_id.clone(), result)
            })
            .collect()
    }

    fn transmit(&self, declaration: &Declaration) -> Result<Value, Rejection> {
        let response = self.client.send(declaration).map_err(|err| Rejection {
            response: err.last_response_body(),
            message: err.to_string(),
        })?;

        if response.is_pending() {
            let Some(request_id) = response.request_id() else {
                return Err(Rejection {
                    response: Some(response.snapshot()),
                    message: "SERPRO accepted the request without a responseId".to_string(),
                });
            };
            info!(request_id = %request_id, "declaration queued, polling");
            return self.poller.poll(&request_id).map_err(|err| Rejection {
                response: err.last_response_body(),
                message: err.to_string(),
            });
        }

        if response.is_success() {
            return Ok(response.body);
        }

        Err(Rejection {
            message: format!("SERPRO rejected the declaration with HTTP {}", response.status),
            response: Some(response.snapshot()),
        })
    }

    fn notify(&self, key: &TransmissionKey, receipt: &FiscalReceipt) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let payload = PartnerPayload::from_receipt(
            key.taxpayer_id.clone(),
            key.period,
            receipt,
            Some(key.declaration_type),
            None,
        );
        if let Err(err) = notifier.notify(&payload) {
            warn!(key = %key, error = %err, "partner notification failed");
        }
    }
}

impl fmt::Debug for DeclarationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclarationPipeline")
            .field("client", &self.client)
            .field("has_notifier", &self.notifier.is_some())
            .field("archive_dir", &self.archive_dir)
            .finish_non_exhaustive()
    }
}
