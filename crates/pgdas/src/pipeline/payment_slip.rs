use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use super::PipelineError;
use crate::store::{InsertOutcome, PaymentSlipKey, PaymentSlipStore, TransmissionStatus};
use crate::transmission::{PaymentSlip, PaymentSlipRequest, SlipOutcome, TransmissionClient};

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSlipOutcome {
    pub key: PaymentSlipKey,
    pub status: TransmissionStatus,
    pub slip: Option<PaymentSlip>,
    pub response: Option<Value>,
    pub error_message: Option<String>,
}

/// Issues a DAS and keeps its audit record.
#[derive(Debug)]
pub struct PaymentSlipPipeline {
    client: Arc<TransmissionClient>,
    store: PaymentSlipStore,
}

impl PaymentSlipPipeline {
    pub fn new(client: Arc<TransmissionClient>, store: PaymentSlipStore) -> Self {
        Self { client, store }
    }

    pub fn run(&self, request: &PaymentSlipRequest) -> Result<PaymentSlipOutcome, PipelineError> {
        let key = PaymentSlipKey::from(request);
        let mut outcome = PaymentSlipOutcome {
            key: key.clone(),
            status: TransmissionStatus::AlreadySent,
            slip: None,
            response: None,
            error_message: None,
        };

        if self.store.insert_pending(request)? == InsertOutcome::AlreadyExists {
            info!(key = %key, "DAS already issued for this consolidation date");
            return Ok(outcome);
        }

        let (response, rejection) = match self.client.issue_payment_slip(request) {
            Ok(response) => match SlipOutcome::from_response(&response) {
                SlipOutcome::Issued(slip) => {
                    let record = self.store.mark_success(&key, &slip, &response.snapshot())?;
                    outcome.status = record.status;
                    outcome.response = record.response;
                    outcome.slip = Some(slip);
                    return Ok(outcome);
                }
                SlipOutcome::Rejected { status, .. } => (
                    Some(response.snapshot()),
                    format!("SERPRO refused the DAS with HTTP {status}"),
                ),
            },
            Err(err) => (err.last_response_body(), err.to_string()),
        };

        warn!(key = %key, error = %rejection, "DAS not issued");
        let record = self.store.mark_failure(&key, response.as_ref(), &rejection)?;
        outcome.status = record.status;
        outcome.response = record.response;
        outcome.error_message = record.error_message;
        Ok(outcome)
    }
}
