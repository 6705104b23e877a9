//! Error taxonomy for RA certificate verification.

use std::time::Duration;

use thiserror::Error;

/// Failure class of a verification, stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    CertFormat,
    EnvelopeFormat,
    Trust,
    Signature,
    ReportFormat,
    Policy,
    QuoteFormat,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("certificate format error: {0}")]
    CertFormat(String),

    #[error("attestation envelope error: {0}")]
    EnvelopeFormat(String),

    #[error("untrusted signing certificate: {0}")]
    Trust(String),

    #[error("report signature verification failed: {0}")]
    Signature(String),

    #[error("attestation report error: {0}")]
    ReportFormat(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error("quote format error: {0}")]
    QuoteFormat(String),
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::Decode,
            Self::CertFormat(_) => ErrorKind::CertFormat,
            Self::EnvelopeFormat(_) => ErrorKind::EnvelopeFormat,
            Self::Trust(_) => ErrorKind::Trust,
            Self::Signature(_) => ErrorKind::Signature,
            Self::ReportFormat(_) => ErrorKind::ReportFormat,
            Self::Policy(_) => ErrorKind::Policy,
            Self::QuoteFormat(_) => ErrorKind::QuoteFormat,
        }
    }
}

/// Report content that parsed correctly but is not acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("SGX_ERROR_UNEXPECTED: unexpected isvEnclaveQuoteStatus {0:?}")]
    UnexpectedStatus(String),

    #[error("Illegal PlatformInfoBlob")]
    IllegalPlatformInfoBlob,

    #[error("Failed to fetch platformInfoBlob from attestation report")]
    MissingPlatformInfoBlob,

    #[error("attestation report is stale: age {}s exceeds {}s", age.as_secs(), max_age.as_secs())]
    StaleReport { age: Duration, max_age: Duration },

    #[error("attestation report timestamp is {}s in the future", ahead.as_secs())]
    FutureReport { ahead: Duration },

    #[error("quote report data does not match the certificate public key")]
    ReportDataMismatch,
}

pub type Result<T> = std::result::Result<T, VerifyError>;
