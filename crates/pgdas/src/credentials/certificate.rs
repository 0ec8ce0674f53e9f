use std::fs;
use std::path::{Path, PathBuf};

use openssl::pkcs12::Pkcs12;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use super::AuthenticationError;

const FRIENDLY_NAME: &str = "pgdas-client";

/// Returns a path to a canonical-DER PKCS#12 bundle for `path`, converting
/// into the system temp dir when needed.
pub fn ensure_certificate(
    path: &Path,
    password: &SecretString,
) -> Result<PathBuf, AuthenticationError> {
    ensure_certificate_in(path, password, &std::env::temp_dir())
}

/// Bundles that already parse as canonical DER are used in place. Anything
/// else (BER from older exporters, legacy encodings) is decoded leniently and
/// written back as DER with the same password to `<scratch>/<stem>_der.pfx`.
pub fn ensure_certificate_in(
    path: &Path,
    password: &SecretString,
    scratch_dir: &Path,
) -> Result<PathBuf, AuthenticationError> {
    let raw = fs::read(path).map_err(|source| AuthenticationError::CertificateIo {
        path: path.to_path_buf(),
        source,
    })?;
    let format_error = |message: String| AuthenticationError::CertificateFormat {
        path: path.to_path_buf(),
        message,
    };

    let bundle = Pkcs12::from_der(&raw).map_err(|err| format_error(err.to_string()))?;
    let parsed = bundle
        .parse2(password.expose_secret())
        .map_err(|err| format_error(err.to_string()))?;

    let canonical = bundle
        .to_der()
        .map(|der| der == raw)
        .unwrap_or(false);
    if canonical {
        return Ok(path.to_path_buf());
    }

    let mut builder = Pkcs12::builder();
    builder.name(FRIENDLY_NAME);
    if let Some(pkey) = parsed.pkey.as_ref() {
        builder.pkey(pkey);
    }
    if let Some(cert) = parsed.cert.as_ref() {
        builder.cert(cert);
    }
    if let Some(chain) = parsed.ca {
        builder.ca(chain);
    }
    let der = builder
        .build2(password.expose_secret())
        .and_then(|bundle| bundle.to_der())
        .map_err(|err| format_error(err.to_string()))?;

    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "certificate".to_string());
    let target = scratch_dir.join(format!("{stem}_der.pfx"));
    fs::write(&target, der).map_err(|source| AuthenticationError::CertificateIo {
        path: target.clone(),
        source,
    })?;

    info!(source = %path.display(), target = %target.display(), "re-encoded client certificate as DER");
    Ok(target)
}
