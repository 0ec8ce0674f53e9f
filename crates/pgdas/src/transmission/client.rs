use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{info, warn};

use super::envelope::{Envelope, DECLARE_SERVICE, EMIT_SLIP_SERVICE};
use super::slip::PaymentSlipRequest;
use super::{TransmissionError, TransmissionResponse};
use crate::clock::Clock;
use crate::config::EndpointConfig;
use crate::credentials::{AuthenticationError, CredentialManager, ROLE_TYPE};
use crate::declaration::Declaration;
use crate::transport::{HttpRequest, HttpTransport};

pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Authenticated Integra-SN client. Responses below 500 are returned as-is;
/// 5xx and network failures are retried with a linear backoff of two seconds
/// per attempt.
pub struct TransmissionClient {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<CredentialManager>,
    endpoints: EndpointConfig,
    contractor_id: String,
    api_key: SecretString,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl TransmissionClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialManager>,
        endpoints: EndpointConfig,
        contractor_id: impl Into<String>,
        api_key: SecretString,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            credentials,
            endpoints,
            contractor_id: contractor_id.into(),
            api_key,
            clock,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Uploads a declaration through `/Declarar`. Not idempotent: callers
    /// must record the attempt in the transmission store first.
    pub fn send(&self, declaration: &Declaration) -> Result<TransmissionResponse, TransmissionError> {
        let dados = serde_json::to_string(&declaration.to_wire()?)?;
        let envelope = Envelope::new(
            &self.contractor_id,
            &declaration.taxpayer_id,
            DECLARE_SERVICE,
            dados,
        );
        info!(
            taxpayer = %declaration.taxpayer_id,
            period = %declaration.period,
            declaration_type = declaration.declaration_type().code(),
            transmit = declaration.transmit,
            total_revenue = declaration.total_revenue(),
            "sending PGDAS-D declaration"
        );
        self.post_with_retry(&self.endpoints.declare_url(), &envelope)
    }

    /// Requests a DAS through `/Emitir` with the same retry policy as `send`.
    pub fn issue_payment_slip(
        &self,
        request: &PaymentSlipRequest,
    ) -> Result<TransmissionResponse, TransmissionError> {
        let dados = serde_json::to_string(&request.payload())?;
        let envelope = Envelope::new(
            &self.contractor_id,
            &request.taxpayer_id,
            EMIT_SLIP_SERVICE,
            dados,
        );
        info!(
            taxpayer = %request.taxpayer_id,
            period = %request.period,
            consolidation = %request.consolidation_label(),
            "requesting DAS"
        );
        self.post_with_retry(&self.endpoints.emit_url(), &envelope)
    }

    /// Single `/Monitorar` call. Network failures surface as
    /// [`TransmissionError::Network`] so the poller can keep waiting.
    pub fn monitor(&self, request_id: &str) -> Result<TransmissionResponse, TransmissionError> {
        let body = serde_json::to_string(&json!({ "idPedidoDados": request_id }))?;
        let request = self.authenticated_request(&self.endpoints.monitor_url(), body)?;
        let reply = self.transport.post(&request)?;
        self.forget_token_if_refused(reply.status);
        Ok(TransmissionResponse::from_reply(&reply))
    }

    fn forget_token_if_refused(&self, status: u16) {
        if status == 401 {
            warn!("SERPRO refused the access token, dropping it");
            self.credentials.invalidate();
        }
    }

    fn authenticated_request(
        &self,
        url: &str,
        body: String,
    ) -> Result<HttpRequest, AuthenticationError> {
        let token = self.credentials.token()?;
        Ok(HttpRequest::json(url, body)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .headers(token.auth_headers())
            .header("X-Api-Key", self.api_key.expose_secret())
            .header("Role-Type", ROLE_TYPE))
    }

    fn post_with_retry(
        &self,
        url: &str,
        envelope: &Envelope,
    ) -> Result<TransmissionResponse, TransmissionError> {
        let body = serde_json::to_string(envelope)?;
        let attempts = self.max_retries + 1;
        let mut last_response = None;
        let mut last_error = None;

        for attempt in 1..=attempts {
            let request = self.authenticated_request(url, body.clone())?;
            match self.transport.post(&request) {
                Ok(reply) if reply.status < 500 => {
                    self.forget_token_if_refused(reply.status);
                    return Ok(TransmissionResponse::from_reply(&reply));
                }
                Ok(reply) => {
                    warn!(
                        url,
                        status = reply.status,
                        attempt,
                        attempts,
                        "SERPRO server error"
                    );
                    last_response = Some(TransmissionResponse::from_reply(&reply));
                }
                Err(err) => {
                    warn!(url, attempt, attempts, error = %err, "SERPRO unreachable");
                    last_error = Some(err.to_string());
                }
            }

            if attempt < attempts {
                self.clock
                    .sleep(Duration::from_secs(2 * u64::from(attempt)));
            }
        }

        Err(TransmissionError::Exhausted {
            attempts,
            last_response,
            last_error,
        })
    }
}

impl fmt::Debug for TransmissionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransmissionClient")
            .field("endpoints", &self.endpoints)
            .field("contractor_id", &self.contractor_id)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
