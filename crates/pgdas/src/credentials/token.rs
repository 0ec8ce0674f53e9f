use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, info};

use super::{AuthenticationError, ROLE_TYPE};
use crate::clock::Clock;
use crate::transport::{HttpRequest, HttpTransport};

/// Seconds shaved off `expires_in` so a token is never used at its edge.
pub const TOKEN_SAFETY_MARGIN_SECS: i64 = 60;

const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Bearer and JWT pair issued by the SERPRO token endpoint.
#[derive(Debug, Clone)]
pub struct Token {
    pub access_token: SecretString,
    pub jwt_token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Headers every authenticated SERPRO call carries.
    pub fn auth_headers(&self) -> Vec<(String, String)> {
        vec![
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.access_token.expose_secret()),
            ),
            (
                "jwt_token".to_string(),
                self.jwt_token.expose_secret().to_string(),
            ),
        ]
    }
}

/// Owns the cached token. Share it through an `Arc`; the cache lock is held
/// across the expiry check and the refresh so concurrent callers never issue
/// duplicate grants.
pub struct CredentialManager {
    token_url: String,
    consumer_key: String,
    consumer_secret: SecretString,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<Token>>,
}

impl CredentialManager {
    pub fn new(
        token_url: impl Into<String>,
        consumer_key: impl Into<String>,
        consumer_secret: SecretString,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            consumer_key: consumer_key.into(),
            consumer_secret,
            transport,
            clock,
            cached: Mutex::new(None),
        }
    }

    pub fn token(&self) -> Result<Token, AuthenticationError> {
        let mut cached = self.lock();
        let now = self.clock.now();

        if let Some(token) = cached.as_ref().filter(|token| token.is_valid_at(now)) {
            debug!("reusing cached SERPRO token");
            return Ok(token.clone());
        }

        let token = self.request_token(now)?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drops the cached token so the next call performs a fresh grant. The
    /// client calls this when SERPRO answers 401.
    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    fn request_token(&self, now: DateTime<Utc>) -> Result<Token, AuthenticationError> {
        let basic = BASE64_STANDARD.encode(format!(
            "{}:{}",
            self.consumer_key,
            self.consumer_secret.expose_secret()
        ));
        let request = HttpRequest::form(
            self.token_url.as_str(),
            vec![("grant_type".to_string(), "client_credentials".to_string())],
        )
        .header("Authorization", format!("Basic {basic}"))
        .header("Role-Type", ROLE_TYPE);

        let reply = self.transport.post(&request)?;
        if !(200..300).contains(&reply.status) {
            return Err(AuthenticationError::Rejected {
                status: reply.status,
                body: reply.body,
            });
        }

        let body: Value = serde_json::from_str(&reply.body)
            .map_err(|_| AuthenticationError::MalformedResponse("a JSON body"))?;
        let access_token = string_field(&body, "access_token")
            .ok_or(AuthenticationError::MalformedResponse("access_token"))?;
        let jwt_token = string_field(&body, "jwt_token")
            .ok_or(AuthenticationError::MalformedResponse("jwt_token"))?;

        let expires_in = match body.get("expires_in") {
            Some(Value::Number(number)) => number.as_i64(),
            Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
            _ => None,
        }
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let lifetime = (expires_in - TOKEN_SAFETY_MARGIN_SECS).max(0);

        info!(expires_in, "obtained SERPRO access token");
        Ok(Token {
            access_token: SecretString::from(access_token),
            jwt_token: SecretString::from(jwt_token),
            expires_at: now + Duration::seconds(lifetime),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Token>> {
        self.cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("token_url", &self.token_url)
            .field("consumer_key", &self.consumer_key)
            .finish_non_exhaustive()
    }
}

fn string_field(body: &Value, name: &str) -> Option<String> {
    body.get(name)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
