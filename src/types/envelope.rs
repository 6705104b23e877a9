use base64ct::{Base64, Encoding};
use x509_cert::{der::Decode, Certificate};

use crate::constants::{ENVELOPE_DELIMITER, ENVELOPE_SEGMENTS};
use crate::error::{Result, VerifyError};

/// The three parts of an RA certificate payload.
///
/// `report_bytes` is kept exactly as received: the report signature covers
/// these bytes, so they are never re-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationEnvelope {
    pub report_bytes: Vec<u8>,
    pub signature: Vec<u8>,
    /// DER encoded report signing certificate.
    pub signing_certificate: Vec<u8>,
}

impl AttestationEnvelope {
    /// Splits `report|base64(signature)|base64(signing cert)`.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let segments: Vec<&[u8]> = payload.split(|b| *b == ENVELOPE_DELIMITER).collect();
        if segments.len() != ENVELOPE_SEGMENTS {
            return Err(VerifyError::EnvelopeFormat(format!(
                "Failed to get attest report from cert: expected {ENVELOPE_SEGMENTS} segments, found {}",
                segments.len()
            )));
        }
        if let Some(idx) = segments.iter().position(|s| s.is_empty()) {
            return Err(VerifyError::EnvelopeFormat(format!("segment {idx} is empty")));
        }

        let signature = decode_segment("signature", segments[1])?;
        let signing_certificate = decode_segment("signing certificate", segments[2])?;

        Ok(Self {
            report_bytes: segments[0].to_vec(),
            signature,
            signing_certificate,
        })
    }

    pub fn signing_certificate(&self) -> Result<Certificate> {
        Certificate::from_der(&self.signing_certificate)
            .map_err(|e| VerifyError::Trust(format!("failed to parse signing certificate: {e}")))
    }
}

fn decode_segment(label: &str, segment: &[u8]) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(segment)
        .map_err(|e| VerifyError::EnvelopeFormat(format!("{label} is not base64 text: {e}")))?;
    let decoded = Base64::decode_vec(text)
        .map_err(|e| VerifyError::EnvelopeFormat(format!("{label}: invalid base64: {e}")))?;
    if decoded.is_empty() {
        return Err(VerifyError::EnvelopeFormat(format!("{label} is empty")));
    }
    Ok(decoded)
}
