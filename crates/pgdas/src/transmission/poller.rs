use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{TransmissionClient, TransmissionError};
use crate::clock::{to_chrono, Clock};

/// `situacao` values that mean the job is still running. SERPRO answers in
/// Portuguese or English depending on the gateway version.
pub const PROCESSING_STATES: [&str; 4] = ["PROCESSANDO", "PROCESSING", "EM_FILA", "QUEUED"];

/// Polls `/Monitorar` at a fixed interval until the job leaves the
/// processing states or the wall-clock budget runs out. Server errors and
/// network failures count as still running; any other non-200 reply ends the
/// poll as [`TransmissionError::PollRejected`].
#[derive(Debug)]
pub struct StatusPoller {
    client: Arc<TransmissionClient>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    budget: Duration,
}

impl StatusPoller {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(4);
    pub const DEFAULT_BUDGET: Duration = Duration::from_secs(180);

    pub fn new(client: Arc<TransmissionClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            clock,
            interval: Self::DEFAULT_INTERVAL,
            budget: Self::DEFAULT_BUDGET,
        }
    }

    pub fn with_timing(mut self, interval: Duration, budget: Duration) -> Self {
        self.interval = interval;
        self.budget = budget;
        self
    }

    /// Returns the first terminal body. The token is re-checked on every
    /// iteration since a long poll can outlive it.
    pub fn poll(&self, request_id: &str) -> Result<Value, TransmissionError> {
        let deadline = self.clock.now() + to_chrono(self.budget);
        let mut attempts = 0u32;
        let mut last_body = None;

        loop {
            attempts += 1;
            match self.client.monitor(request_id) {
                Ok(response) if response.status == 200 && !is_processing(&response.body) => {
                    info!(request_id, attempts, "SERPRO job finished");
                    return Ok(response.body);
                }
                Ok(response) if response.status < 500 && response.status != 200 => {
                    warn!(request_id, status = response.status, "status poll rejected");
                    return Err(TransmissionError::PollRejected {
                        request_id: request_id.to_string(),
                        response,
                    });
                }
                Ok(response) => {
                    debug!(
                        request_id,
                        status = response.status,
                        situacao = situacao(&response.body).unwrap_or("-"),
                        "SERPRO job still running"
                    );
                    last_body = Some(response.body);
                }
                Err(TransmissionError::Network(err)) => {
                    warn!(request_id, error = %err, "status poll failed, will retry");
                }
                Err(other) => return Err(other),
            }

            if self.clock.now() >= deadline {
                return Err(TransmissionError::PollTimeout {
                    request_id: request_id.to_string(),
                    budget_secs: self.budget.as_secs(),
                    attempts,
                    last_body,
                });
            }
            self.clock.sleep(self.interval);
        }
    }
}

fn situacao(body: &Value) -> Option<&str> {
    body.get("situacao").and_then(Value::as_str)
}

fn is_processing(body: &Value) -> bool {
    situacao(body).is_some_and(|state| {
        let state = state.trim().to_ascii_uppercase();
        PROCESSING_STATES.contains(&state.as_str())
    })
}
