//! Client certificate handling and the OAuth2 token lifecycle for the SERPRO
//! gateway.

mod certificate;
mod token;

use std::io;
use std::path::PathBuf;

use crate::transport::TransportError;

pub use certificate::{ensure_certificate, ensure_certificate_in};
pub use token::{CredentialManager, Token, TOKEN_SAFETY_MARGIN_SECS};

/// Fixed role marker sent on every SERPRO request.
pub const ROLE_TYPE: &str = "TERCEIROS";

#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("cannot read certificate {}: {source}", .path.display())]
    CertificateIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("certificate {} is not a usable PKCS#12 bundle: {message}", .path.display())]
    CertificateFormat { path: PathBuf, message: String },
    #[error("token request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("token endpoint answered HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("token response is missing {0}")]
    MalformedResponse(&'static str),
}
