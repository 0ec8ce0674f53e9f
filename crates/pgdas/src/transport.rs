use std::collections::VecDeque;
use std::fmt::Debug;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use reqwest::Identity;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::runtime::Runtime;

use crate::config::TransmissionConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Json(String),
    Form(Vec<(String, String)>),
}

/// Outbound POST as the SERPRO endpoints expect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn json(url: impl Into<String>, body: String) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Json(body),
        }
    }

    pub fn form(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body: RequestBody::Form(fields),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// JSON body, or the raw text as a JSON string when it does not parse.
    pub fn json_body(&self) -> Value {
        serde_json::from_str(&self.body).unwrap_or_else(|_| Value::String(self.body.clone()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("http runtime unavailable: {0}")]
    Runtime(String),
    #[error("client identity rejected: {0}")]
    Identity(String),
}

pub trait HttpTransport: Debug + Send + Sync {
    fn post(&self, request: &HttpRequest) -> Result<HttpReply, TransportError>;
}

/// mTLS reqwest client driven from synchronous code through its own runtime.
pub struct ReqwestTransport {
    client: reqwest::Client,
    runtime: Runtime,
}

impl ReqwestTransport {
    pub fn with_identity(
        certificate: &Path,
        password: &SecretString,
        config: &TransmissionConfig,
    ) -> Result<Self, TransportError> {
        let der = std::fs::read(certificate).map_err(|err| {
            TransportError::Identity(format!("{}: {err}", certificate.display()))
        })?;
        let identity = Identity::from_pkcs12_der(&der, password.expose_secret())
            .map_err(|err| TransportError::Identity(err.to_string()))?;

        let client = reqwest::Client::builder()
            .identity(identity)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| TransportError::Identity(err.to_string()))?;
        let runtime = Runtime::new().map_err(|err| TransportError::Runtime(err.to_string()))?;

        Ok(Self { client, runtime })
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport").finish_non_exhaustive()
    }
}

impl HttpTransport for ReqwestTransport {
    fn post(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
        let network = |err: reqwest::Error| TransportError::Network {
            url: request.url.clone(),
            message: err.to_string(),
        };

        self.runtime.block_on(async {
            let mut builder = self.client.post(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            builder = match &request.body {
                RequestBody::Json(body) => builder.body(body.clone()),
                RequestBody::Form(fields) => builder.form(fields),
            };

            let response = builder.send().await.map_err(network)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(network)?;
            Ok(HttpReply { status, body })
        })
    }
}

/// Canned outcome for [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    Reply(HttpReply),
    NetworkFailure(String),
}

#[derive(Debug, Default)]
struct Script {
    routes: Vec<(String, VecDeque<ScriptedReply>)>,
    requests: Vec<HttpRequest>,
}

/// In-process transport for dry runs and tests. Replies are queued per URL
/// suffix; the last reply queued on a route keeps repeating.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, route: &str, status: u16, body: impl Into<String>) -> Self {
        self.push(route, ScriptedReply::Reply(HttpReply::new(status, body)));
        self
    }

    pub fn fail(self, route: &str, message: &str) -> Self {
        self.push(route, ScriptedReply::NetworkFailure(message.to_string()));
        self
    }

    pub fn push(&self, route: &str, reply: ScriptedReply) {
        let mut script = self.lock();
        match script.routes.iter_mut().find(|(key, _)| key == route) {
            Some((_, queue)) => queue.push_back(reply),
            None => script
                .routes
                .push((route.to_string(), VecDeque::from([reply]))),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_to(&self, route: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url.ends_with(route))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HttpTransport for ScriptedTransport {
    fn post(&self, request: &HttpRequest) -> Result<HttpReply, TransportError> {
        let mut script = self.lock();
        script.requests.push(request.clone());

        let queue = script
            .routes
            .iter_mut()
            .find(|(route, _)| request.url.ends_with(route.as_str()))
            .map(|(_, queue)| queue);
        let reply = match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match reply {
            Some(ScriptedReply::Reply(reply)) => Ok(reply),
            Some(ScriptedReply::NetworkFailure(message)) => Err(TransportError::Network {
                url: request.url.clone(),
                message,
            }),
            None => Err(TransportError::Network {
                url: request.url.clone(),
                message: "no scripted reply".to_string(),
            }),
        }
    }
}
