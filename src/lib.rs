pub mod config;
pub mod constants;
pub mod error;
pub mod trust_store;
pub mod types;
pub mod utils;

use std::time::SystemTime;

use tracing::{debug, info, trace, warn};

pub use config::{VerificationPolicy, VerifierConfig};
pub use error::{ErrorKind, PolicyError, Result, VerifyError};
pub use trust_store::TrustStore;
use types::{
    AttestationEnvelope, DecodedQuote, ExtractedIdentity, QuoteReport, ReportAssessment,
    VerifyResult,
};

/// Pulls the enclave public key and the attestation payload out of a DER RA certificate.
pub fn extract_identity(cert: &[u8]) -> Result<ExtractedIdentity> {
    ExtractedIdentity::from_der(cert)
}

/// Splits an attestation payload into report, signature and signing certificate.
pub fn parse_envelope(payload: &[u8]) -> Result<AttestationEnvelope> {
    AttestationEnvelope::parse(payload)
}

/// Establishes trust in the signing certificate, then in the report signature.
///
/// Returns the report bytes exactly as signed.
pub fn verify_envelope<'a>(
    current_time: SystemTime,
    envelope: &'a AttestationEnvelope,
    trust_store: &TrustStore,
    policy: &VerificationPolicy,
) -> Result<&'a [u8]> {
    let signing_cert = envelope.signing_certificate()?;
    let signer = trust_store.verify_chain_leaf(current_time, &[signing_cert])?;
    signer.verify_report_signature(&envelope.report_bytes, &envelope.signature, policy)?;
    debug!(signer = %signer.subject(), "attestation report signature verified");
    Ok(&envelope.report_bytes)
}

/// Applies quote status and freshness policy to a verified report.
pub fn evaluate_report(
    report_bytes: &[u8],
    current_time: SystemTime,
    policy: &VerificationPolicy,
) -> Result<ReportAssessment> {
    QuoteReport::evaluate(report_bytes, current_time, policy)
}

/// Decodes the base64 quote body of a report.
pub fn decode_quote(quote_body_b64: &str, public_key: &[u8]) -> Result<DecodedQuote> {
    DecodedQuote::decode(quote_body_b64, public_key)
}

/// Runs the full pipeline over a DER RA certificate. The first failing stage wins.
pub fn verify_mra_cert(
    current_time: SystemTime,
    cert: &[u8],
    trust_store: &TrustStore,
    policy: &VerificationPolicy,
) -> Result<DecodedQuote> {
    trace!(cert = %utils::escape_bytes(cert), "received server certificate");

    // 1. Locate the enclave key and the attestation payload in the certificate.
    let identity = extract_identity(cert)?;
    // Binding to the report data is only meaningful for a point on the curve.
    if let Err(err) = identity.verifying_key() {
        if policy.enforce_report_data_binding {
            return Err(err);
        }
        warn!(public_key = %identity.public_key_hex(), "{err}");
    }

    // 2. Split the payload and verify the report against the pinned roots.
    let envelope = parse_envelope(&identity.attestation_payload)?;
    let report_bytes = verify_envelope(current_time, &envelope, trust_store, policy)?;

    // 3. Judge the report content.
    let assessment = evaluate_report(report_bytes, current_time, policy)?;

    // 4. Decode the quote and bind it to the certificate key.
    let quote = decode_quote(&assessment.quote_body, &identity.public_key)?;
    if quote.binds(&identity.public_key) {
        debug!("quote report data binds the certificate public key");
    } else if policy.enforce_report_data_binding {
        return Err(PolicyError::ReportDataMismatch.into());
    } else {
        warn!(
            public_key = %identity.public_key_hex(),
            report_data = %quote.quote_report_body.report_data,
            "accepting quote whose report data does not match the certificate public key"
        );
    }

    info!(
        status = %assessment.status,
        report_id = assessment.report.id.as_deref().unwrap_or_default(),
        mr_enclave = %quote.quote_report_body.mr_enclave,
        "RA certificate verified"
    );
    Ok(quote)
}

/// Whether `pem` holds a decodable PEM block.
pub fn is_valid_pem(pem: &str) -> bool {
    pem::parse(pem).is_ok()
}

/// Verifier bound to a pinned root store and a policy, shared across calls.
pub struct Verifier {
    trust_store: TrustStore,
    policy: VerificationPolicy,
}

impl Verifier {
    /// Loads the configured roots; call once at process start.
    pub fn new(config: &VerifierConfig) -> anyhow::Result<Self> {
        let trust_store = TrustStore::load(&config.root_pem_paths, &config.allowed_root_fingerprints)?;
        info!(roots = trust_store.trusted.len(), "loaded attestation report signing roots");
        Ok(Self::from_trust_store(trust_store, config.policy.clone()))
    }

    pub fn from_trust_store(trust_store: TrustStore, policy: VerificationPolicy) -> Self {
        Self { trust_store, policy }
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust_store
    }

    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    pub fn verify_mra_cert(&self, current_time: SystemTime, cert: &[u8]) -> Result<DecodedQuote> {
        verify_mra_cert(current_time, cert, &self.trust_store, &self.policy)
    }

    /// Verifies a hex encoded DER certificate.
    pub fn verify_hex(&self, current_time: SystemTime, certificate_hex: &str) -> Result<DecodedQuote> {
        let cert = hex::decode(certificate_hex.trim())
            .map_err(|e| VerifyError::Decode(format!("certificate is not valid hex: {e}")))?;
        self.verify_mra_cert(current_time, &cert)
    }

    /// Host entrypoint: hex certificate in, `{"result", "data"}` envelope out.
    pub fn verify(&self, certificate_hex: &str) -> VerifyResult {
        self.finish(self.verify_hex(SystemTime::now(), certificate_hex))
    }

    /// Same as [`Verifier::verify`] for a PEM `CERTIFICATE` block.
    pub fn verify_pem(&self, pem: &str) -> VerifyResult {
        let outcome = decode_pem_certificate(pem)
            .and_then(|der| self.verify_mra_cert(SystemTime::now(), &der));
        self.finish(outcome)
    }

    fn finish(&self, outcome: Result<DecodedQuote>) -> VerifyResult {
        if let Err(err) = &outcome {
            info!(kind = ?err.kind(), "RA certificate rejected: {err}");
        }
        VerifyResult::from(outcome)
    }
}

fn decode_pem_certificate(pem: &str) -> Result<Vec<u8>> {
    let block = pem::parse(pem).map_err(|e| VerifyError::Decode(format!("invalid PEM: {e}")))?;
    if block.tag() != "CERTIFICATE" {
        return Err(VerifyError::Decode(format!(
            "expected a CERTIFICATE PEM block, found {}",
            block.tag()
        )));
    }
    Ok(block.into_contents())
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        time::{Duration, UNIX_EPOCH},
    };

    use super::*;

    const CERT_OK: &[u8] = include_bytes!("../data/mra_cert_ok.der");
    const CERT_GROUP_OUT_OF_DATE: &[u8] = include_bytes!("../data/mra_cert_group_out_of_date.der");
    const CERT_UNBOUND: &[u8] = include_bytes!("../data/mra_cert_unbound.der");

    const OK_PUBLIC_KEY: &str = "91aa9ee55d5fab6b7d34479ac8ed9f9c97027d16bff5af77ad26047eb7f7805547d94e65d1da9e5f1d5f0d30e242ecf64400973977d54773bd7d6ca03118e6a2";
    const GROUP_OUT_OF_DATE_PUBLIC_KEY: &str = "8232b4758155079a68eb4dffe39802214d895a054ccb4ccebd40c7038b8d57a26feb89959fff2566e2c1f83225f2f4fa925adf9bc8d003b62d3dca1962317c5a";

    fn now() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_714_568_400)
    }

    fn store(pem: &str) -> TrustStore {
        TrustStore::from_pem_bundle(pem, &HashSet::new()).unwrap()
    }

    fn verifier(policy: VerificationPolicy) -> Verifier {
        Verifier::from_trust_store(store(include_str!("../data/test_root_ca.pem")), policy)
    }

    #[test]
    fn verifies_ok_certificate() {
        let quote = verifier(VerificationPolicy::default()).verify_mra_cert(now(), CERT_OK).unwrap();
        assert_eq!(quote.version, 2);
        assert_eq!(quote.sign_type, 1);
        assert_eq!(quote.quote_report_body.report_data, OK_PUBLIC_KEY);
        assert_eq!(
            quote.quote_report_body.mr_enclave,
            "c09cceb63cd069a276f470bf860a2af71f7c06c3a084ac1e6b66c81e3b755aef"
        );
        assert_eq!(
            quote.quote_report_body.mr_signer,
            "612220147cfd744a6fcee8e1b5bb6754b2a523f31f7e71387713e95202f0f07c"
        );
    }

    #[test]
    fn verifies_group_out_of_date_certificate() {
        let quote = verifier(VerificationPolicy::default())
            .verify_mra_cert(now(), CERT_GROUP_OUT_OF_DATE)
            .unwrap();
        assert_eq!(quote.quote_report_body.report_data, GROUP_OUT_OF_DATE_PUBLIC_KEY);
    }

    #[test]
    fn stages_compose_like_the_pipeline() {
        let policy = VerificationPolicy::default();
        let identity = extract_identity(CERT_GROUP_OUT_OF_DATE).unwrap();
        let envelope = parse_envelope(&identity.attestation_payload).unwrap();
        let report = verify_envelope(now(), &envelope, &store(include_str!("../data/test_root_ca.pem")), &policy)
            .unwrap();
        assert_eq!(report, envelope.report_bytes.as_slice());

        let assessment = evaluate_report(report, now(), &policy).unwrap();
        let pib = assessment.platform_info.unwrap();
        assert_eq!(pib.sgx_epid_group_flags, 0x04);
        assert_eq!(pib.sgx_tcb_evaluation_flags.get(), 0x0201);
        assert_eq!(pib.gid.get(), 2925);

        let quote = decode_quote(&assessment.quote_body, &identity.public_key).unwrap();
        assert!(quote.binds(&identity.public_key));
    }

    #[test]
    fn unbound_report_data_follows_policy() {
        let err = verifier(VerificationPolicy::default())
            .verify_mra_cert(now(), CERT_UNBOUND)
            .unwrap_err();
        assert!(matches!(err, VerifyError::Policy(PolicyError::ReportDataMismatch)));

        let quote = verifier(VerificationPolicy::permissive())
            .verify_mra_cert(now(), CERT_UNBOUND)
            .unwrap();
        let identity = extract_identity(CERT_UNBOUND).unwrap();
        assert_ne!(quote.quote_report_body.report_data, identity.public_key_hex());
    }

    #[test]
    fn enclave_key_off_the_curve_is_a_format_error() {
        let mut cert = CERT_OK.to_vec();
        let key = hex::decode(OK_PUBLIC_KEY).unwrap();
        let pos = cert.windows(key.len()).position(|w| w == key).unwrap();
        cert[pos..pos + key.len()].fill(0xFF);

        let err = verifier(VerificationPolicy::default()).verify_mra_cert(now(), &cert).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CertFormat);
        assert!(err.to_string().contains("invalid enclave public key"), "{err}");

        // Permissive mode only warns, and the quote no longer binds the altered key.
        let quote = verifier(VerificationPolicy::permissive()).verify_mra_cert(now(), &cert).unwrap();
        assert_eq!(quote.quote_report_body.report_data, OK_PUBLIC_KEY);
    }

    #[test]
    fn untrusted_root_is_rejected_before_the_report() {
        let verifier = Verifier::from_trust_store(
            store(include_str!("../data/untrusted_root_ca.pem")),
            VerificationPolicy::default(),
        );
        let err = verifier.verify_mra_cert(now(), CERT_OK).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Trust);

        let intel = Verifier::from_trust_store(TrustStore::intel().unwrap(), VerificationPolicy::default());
        assert_eq!(intel.verify_mra_cert(now(), CERT_OK).unwrap_err().kind(), ErrorKind::Trust);
    }

    #[test]
    fn tampered_report_is_a_signature_error() {
        let mut cert = CERT_OK.to_vec();
        let pos = cert
            .windows(6)
            .position(|w| w == b"\"id\":\"")
            .unwrap();
        cert[pos + 6] ^= 0x01;
        let err = verifier(VerificationPolicy::default()).verify_mra_cert(now(), &cert).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Signature);
    }

    #[test]
    fn stale_report_is_rejected_by_default() {
        let later = now() + Duration::from_secs(3 * 86_400);
        let err = verifier(VerificationPolicy::default()).verify_mra_cert(later, CERT_OK).unwrap_err();
        assert!(matches!(err, VerifyError::Policy(PolicyError::StaleReport { .. })));
        assert!(verifier(VerificationPolicy::permissive()).verify_mra_cert(later, CERT_OK).is_ok());
    }

    #[test]
    fn malformed_inputs_fail_with_typed_errors() {
        let verifier = verifier(VerificationPolicy::default());
        assert_eq!(verifier.verify_hex(now(), "zz").unwrap_err().kind(), ErrorKind::Decode);
        assert_eq!(verifier.verify_hex(now(), "abc").unwrap_err().kind(), ErrorKind::Decode);
        assert_eq!(verifier.verify_hex(now(), "3000").unwrap_err().kind(), ErrorKind::CertFormat);
        assert_eq!(
            verifier.verify_mra_cert(now(), &CERT_OK[..CERT_OK.len() / 2]).unwrap_err().kind(),
            ErrorKind::CertFormat
        );
    }

    #[test]
    fn host_entrypoint_returns_json_envelope() {
        let permissive = verifier(VerificationPolicy::permissive());
        let result = permissive.verify(&hex::encode(CERT_OK));
        assert!(result.is_success());
        let quote: DecodedQuote = serde_json::from_str(&result.data).unwrap();
        assert_eq!(quote.quote_report_body.report_data, OK_PUBLIC_KEY);

        let json: serde_json::Value = serde_json::from_str(&permissive.verify("xyz").to_json()).unwrap();
        assert_eq!(json["result"], "error");
        assert!(json["data"].as_str().unwrap().starts_with("decode error"));

        // The fixture report is dated 2024; the default policy judges it against the wall clock.
        let strict = verifier(VerificationPolicy::default()).verify(&hex::encode(CERT_OK));
        assert!(!strict.is_success());
        assert!(strict.data.contains("stale"));
    }

    #[test]
    fn pem_entrypoints() {
        let pem = pem::encode(&pem::Pem::new("CERTIFICATE", CERT_OK.to_vec()));
        assert!(is_valid_pem(&pem));
        assert!(!is_valid_pem("not a pem"));

        let result = verifier(VerificationPolicy::permissive()).verify_pem(&pem);
        assert!(result.is_success(), "{}", result.data);

        let key = pem::encode(&pem::Pem::new("PUBLIC KEY", vec![1, 2, 3]));
        let result = verifier(VerificationPolicy::permissive()).verify_pem(&key);
        assert!(result.data.starts_with("decode error"));
    }

    #[test]
    fn verifier_loads_embedded_root_by_default() {
        let verifier = Verifier::new(&VerifierConfig::default()).unwrap();
        assert_eq!(verifier.trust_store().trusted.len(), 1);
        assert!(verifier.policy().enforce_report_data_binding);
    }
}
