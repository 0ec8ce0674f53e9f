//! Integra-SN calls: declaration upload with retry, status polling and DAS
//! issuance, plus decoding of what SERPRO sends back.

mod client;
mod envelope;
mod poller;
mod receipt;
mod slip;

use serde_json::{json, Value};

use crate::credentials::AuthenticationError;
use crate::transport::{HttpReply, TransportError};

pub use client::{TransmissionClient, DEFAULT_MAX_RETRIES};
pub use envelope::{Envelope, Party, RequestData, DECLARE_SERVICE, EMIT_SLIP_SERVICE};
pub use poller::{StatusPoller, PROCESSING_STATES};
pub use receipt::{decode_dados, FiscalReceipt};
pub use slip::{PaymentSlip, PaymentSlipRequest, SlipOutcome};

/// HTTP status plus body as returned by SERPRO. Bodies that are not JSON are
/// kept as a JSON string.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionResponse {
    pub status: u16,
    pub body: Value,
}

impl TransmissionResponse {
    pub fn from_reply(reply: &HttpReply) -> Self {
        Self {
            status: reply.status,
            body: reply.json_body(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 202: accepted for asynchronous processing, poll with [`Self::request_id`].
    pub fn is_pending(&self) -> bool {
        self.status == 202
    }

    pub fn is_permanent_rejection(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn request_id(&self) -> Option<String> {
        match self.body.get("responseId")? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    /// `{status, body}` document kept for audit.
    pub fn snapshot(&self) -> Value {
        json!({ "status": self.status, "body": self.body })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransmissionError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),
    #[error("could not encode request: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error(transparent)]
    Network(#[from] TransportError),
    #[error("SERPRO still failing after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        last_response: Option<TransmissionResponse>,
        last_error: Option<String>,
    },
    #[error("request {request_id} still processing after {budget_secs}s ({attempts} polls)")]
    PollTimeout {
        request_id: String,
        budget_secs: u64,
        attempts: u32,
        last_body: Option<Value>,
    },
    #[error("status poll for {request_id} rejected with HTTP {}", .response.status)]
    PollRejected {
        request_id: String,
        response: TransmissionResponse,
    },
}

impl TransmissionError {
    /// Last SERPRO body seen before giving up, when there was one.
    pub fn last_response_body(&self) -> Option<Value> {
        match self {
            Self::Exhausted {
                last_response: Some(response),
                ..
            } => Some(response.snapshot()),
            Self::PollRejected { response, .. } => Some(response.snapshot()),
            Self::PollTimeout {
                last_body: Some(body),
                ..
            } => Some(body.clone()),
            _ => None,
        }
    }
}
