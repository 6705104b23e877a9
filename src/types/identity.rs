use p256::ecdsa::VerifyingKey;

use crate::constants::{
    DER_TAG_BIT_STRING, DER_TAG_OCTET_STRING, EC_POINT_PREFIX_LEN, NS_COMMENT_OID_MARKER,
    PRIME256V1_OID_MARKER,
};
use crate::error::{Result, VerifyError};
use crate::utils::der::DerScanner;

/// Enclave key and attestation payload lifted out of an RA certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedIdentity {
    /// Raw P-256 point coordinates `x || y`, without the `00 04` prefix.
    pub public_key: Vec<u8>,

    /// Contents of the Netscape comment extension: `report|signature|signing cert`.
    pub attestation_payload: Vec<u8>,
}

impl ExtractedIdentity {
    /// Extracts the enclave public key and the attestation payload from DER bytes.
    pub fn from_der(cert: &[u8]) -> Result<Self> {
        let scanner = DerScanner::new(cert);

        let key_field = scanner
            .read_value_after_marker(&PRIME256V1_OID_MARKER, DER_TAG_BIT_STRING, "sgx pubkey")
            .map_err(|e| VerifyError::CertFormat(format!("Can not get sgx pubkey from cert: {e}")))?;
        let public_key = key_field.get(EC_POINT_PREFIX_LEN..).ok_or_else(|| {
            VerifyError::CertFormat(format!(
                "public key field of {} bytes is shorter than its point prefix",
                key_field.len()
            ))
        })?;

        let attestation_payload = scanner
            .read_value_after_marker(&NS_COMMENT_OID_MARKER, DER_TAG_OCTET_STRING, "attestation payload")
            .map_err(|e| {
                VerifyError::CertFormat(format!("Can not get attestation payload from cert: {e}"))
            })?;
        if attestation_payload.is_empty() {
            return Err(VerifyError::CertFormat("attestation payload is empty".into()));
        }

        Ok(Self {
            public_key: public_key.to_vec(),
            attestation_payload: attestation_payload.to_vec(),
        })
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }

    /// Interprets the public key as an uncompressed P-256 point.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        let mut sec1 = Vec::with_capacity(self.public_key.len() + 1);
        sec1.push(0x04);
        sec1.extend_from_slice(&self.public_key);
        VerifyingKey::from_sec1_bytes(&sec1)
            .map_err(|e| VerifyError::CertFormat(format!("invalid enclave public key: {e}")))
    }
}
