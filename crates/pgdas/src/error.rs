use crate::config::ConfigError;
use crate::credentials::AuthenticationError;
use crate::declaration::AssemblyError;
use crate::pipeline::PipelineError;
use crate::sources::SourceError;
use crate::store::RepositoryError;
use crate::telemetry::TelemetryError;
use crate::transmission::TransmissionError;
use crate::transport::TransportError;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Authentication(AuthenticationError),
    Transport(TransportError),
    Source(SourceError),
    Assembly(AssemblyError),
    Repository(RepositoryError),
    Transmission(TransmissionError),
    Pipeline(PipelineError),
    Encoding(serde_json::Error),
    /// Some taxpayers in a filing batch did not end in success.
    BatchFailed { failed: usize, total: usize },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Authentication(err) => write!(f, "authentication error: {}", err),
            AppError::Transport(err) => write!(f, "transport error: {}", err),
            AppError::Source(err) => write!(f, "source error: {}", err),
            AppError::Assembly(err) => write!(f, "assembly error: {}", err),
            AppError::Repository(err) => write!(f, "store error: {}", err),
            AppError::Transmission(err) => write!(f, "transmission error: {}", err),
            AppError::Pipeline(err) => write!(f, "pipeline error: {}", err),
            AppError::Encoding(err) => write!(f, "encoding error: {}", err),
            AppError::BatchFailed { failed, total } => {
                write!(f, "{} of {} declarations failed", failed, total)
            }
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Authentication(err) => Some(err),
            AppError::Transport(err) => Some(err),
            AppError::Source(err) => Some(err),
            AppError::Assembly(err) => Some(err),
            AppError::Repository(err) => Some(err),
            AppError::Transmission(err) => Some(err),
            AppError::Pipeline(err) => Some(err),
            AppError::Encoding(err) => Some(err),
            AppError::BatchFailed { .. } => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<AuthenticationError> for AppError {
    fn from(value: AuthenticationError) -> Self {
        Self::Authentication(value)
    }
}

impl From<TransportError> for AppError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<SourceError> for AppError {
    fn from(value: SourceError) -> Self {
        Self::Source(value)
    }
}

impl From<AssemblyError> for AppError {
    fn from(value: AssemblyError) -> Self {
        Self::Assembly(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Repository(value)
    }
}

impl From<TransmissionError> for AppError {
    fn from(value: TransmissionError) -> Self {
        Self::Transmission(value)
    }
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encoding(value)
    }
}
