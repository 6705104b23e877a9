use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    path::PathBuf,
    time::SystemTime,
};

use anyhow::Context;
use tracing::debug;
use x509_cert::{
    der::{Decode, Encode},
    ext::pkix::BasicConstraints,
    Certificate,
};
use x509_verify::{Signature, VerifyInfo, VerifyingKey};

use crate::config::VerificationPolicy;
use crate::constants::{BASIC_CONSTRAINTS, INTEL_ATTESTATION_REPORT_SIGNING_CA};
use crate::error::{Result, VerifyError};
use crate::utils::{hash::sha256_fingerprint, Expireable};

/// Pinned set of report signing roots.
///
/// Built once at process start and only read afterwards, so a single store can
/// be shared across concurrent verifications without locking.
pub struct TrustStore {
    /// Trusted CAs, keyed by subject DN.
    pub trusted: BTreeMap<String, TrustedIdentity>,
}

/// Wrapper for pre-parsed trusted identity for verification.
pub struct TrustedIdentity {
    pub cert: Certificate,
    pub pk: VerifyingKey,
    /// SHA-256 of the DER certificate, uppercase hex with colons.
    pub fingerprint: String,
}

impl TrustedIdentity {
    fn new(cert: Certificate, fingerprint: String) -> Result<Self> {
        let pk = VerifyingKey::try_from(&cert)
            .map_err(|e| VerifyError::Trust(format!("failed to decode key from certificate: {e}")))?;
        Ok(Self { cert, pk, fingerprint })
    }

    fn from_cert(cert: &Certificate) -> Result<Self> {
        let fingerprint = der_fingerprint(cert)
            .map_err(|e| VerifyError::Trust(format!("failed to encode certificate: {e}")))?;
        Self::new(cert.clone(), fingerprint)
    }

    pub fn subject(&self) -> String {
        self.cert.tbs_certificate.subject.to_string()
    }

    /// Verifies `signature` over the exact `message` bytes with this identity's key.
    ///
    /// The algorithm is the one the certificate declares, and it must be in the
    /// policy allow-list.
    pub fn verify_report_signature(
        &self,
        message: &[u8],
        signature: &[u8],
        policy: &VerificationPolicy,
    ) -> Result<()> {
        let algorithm = &self.cert.signature_algorithm;
        if !policy.allows_signature_algorithm(&algorithm.oid) {
            return Err(VerifyError::Signature(format!(
                "signature algorithm {} is not allowed",
                algorithm.oid
            )));
        }

        let info = VerifyInfo::new(message.to_vec().into(), Signature::new(algorithm, signature));
        self.pk
            .verify(&info)
            .map_err(|e| VerifyError::Signature(format!("failed to verify report signature: {e}")))
    }
}

impl fmt::Debug for TrustedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedIdentity")
            .field("subject", &self.subject())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

fn der_fingerprint(cert: &Certificate) -> std::result::Result<String, x509_cert::der::Error> {
    Ok(sha256_fingerprint(&cert.to_der()?))
}

impl TrustStore {
    /// Creates a new trust store with the given root certificates.
    pub fn new(trusted_certs: Vec<Certificate>) -> anyhow::Result<Self> {
        let mut trusted = BTreeMap::new();

        for cert in trusted_certs {
            let fingerprint = der_fingerprint(&cert).context("failed to encode root certificate")?;
            let identity = TrustedIdentity::new(cert, fingerprint)?;
            debug!(subject = %identity.subject(), fingerprint = %identity.fingerprint, "trusting root");
            trusted.insert(identity.subject(), identity);
        }

        anyhow::ensure!(!trusted.is_empty(), "no roots loaded");
        Ok(Self { trusted })
    }

    /// Parses every `CERTIFICATE` block of a PEM bundle.
    ///
    /// A non-empty `allowed_fingerprints` skips roots whose fingerprint is not listed.
    pub fn from_pem_bundle(bundle: &str, allowed_fingerprints: &HashSet<String>) -> anyhow::Result<Self> {
        Self::new(parse_pem_roots(bundle, allowed_fingerprints)?)
    }

    /// Store holding only the embedded Intel SGX Attestation Report Signing CA.
    pub fn intel() -> anyhow::Result<Self> {
        Self::from_pem_bundle(INTEL_ATTESTATION_REPORT_SIGNING_CA, &HashSet::new())
    }

    /// Loads roots from PEM bundles on disk, or the embedded Intel CA when `paths` is empty.
    pub fn load(paths: &[PathBuf], allowed_fingerprints: &HashSet<String>) -> anyhow::Result<Self> {
        if paths.is_empty() {
            return Self::from_pem_bundle(INTEL_ATTESTATION_REPORT_SIGNING_CA, allowed_fingerprints);
        }

        let mut roots = Vec::new();
        for path in paths {
            let bundle = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
            roots.extend(
                parse_pem_roots(&bundle, allowed_fingerprints)
                    .with_context(|| format!("parse PEM in {:?}", path))?,
            );
        }
        Self::new(roots)
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &str> {
        self.trusted.values().map(|identity| identity.fingerprint.as_str())
    }

    /// Verify the leaf node in a certificate chain is rooted in the trust store.
    ///
    /// # Parameters
    /// * `current_time` - Time reference for validity checks.
    /// * `chain` - The certificate chain to verify, leaf first.
    pub fn verify_chain_leaf(&self, current_time: SystemTime, chain: &[Certificate]) -> Result<TrustedIdentity> {
        if chain.is_empty() {
            return Err(VerifyError::Trust("certificate chain is empty".into()));
        }

        if !chain.valid_at(current_time) {
            return Err(VerifyError::Trust("certificate chain is expired".into()));
        }

        // Work through the certificate chain from the root (last) certificate.
        let mut chain = chain.iter().rev().peekable();
        let mut intermediary = BTreeMap::new();

        while let Some(cert) = chain.next() {
            let issuer = cert.tbs_certificate.issuer.to_string();
            let subject = cert.tbs_certificate.subject.to_string();

            let signer = self.find_issuer(&issuer, &intermediary)?;
            if !signer.cert.valid_at(current_time) {
                return Err(VerifyError::Trust(format!("issuer {issuer} is expired")));
            }
            if !is_ca(&signer.cert)? {
                return Err(VerifyError::Trust(format!("issuer {issuer} is not a CA")));
            }

            signer
                .pk
                .verify_strict(cert)
                .map_err(|e| VerifyError::Trust(format!("failed to verify issuer signature: {e}")))?;

            let identity = TrustedIdentity::from_cert(cert)?;

            if chain.peek().is_none() {
                if is_ca(cert)? {
                    return Err(VerifyError::Trust(format!("leaf certificate {subject} is a CA")));
                }
                debug!(%subject, %issuer, "signing certificate chains to a trusted root");
                return Ok(identity);
            }
            intermediary.insert(subject, identity);
        }

        Err(VerifyError::Trust("certificate chain has no leaf".into()))
    }

    /// Find an issuer in the trusted or intermediary stores
    fn find_issuer<'a>(
        &'a self,
        issuer: &str,
        intermediary: &'a BTreeMap<String, TrustedIdentity>,
    ) -> Result<&'a TrustedIdentity> {
        self.trusted
            .get(issuer)
            .or_else(|| intermediary.get(issuer))
            .ok_or_else(|| VerifyError::Trust(format!("failed to find trusted issuer {issuer}")))
    }
}

fn parse_pem_roots(bundle: &str, allowed_fingerprints: &HashSet<String>) -> anyhow::Result<Vec<Certificate>> {
    let blocks = pem::parse_many(bundle).context("invalid PEM bundle")?;

    let mut roots = Vec::new();
    for block in blocks.iter().filter(|block| block.tag() == "CERTIFICATE") {
        let fingerprint = sha256_fingerprint(block.contents());
        if !allowed_fingerprints.is_empty() && !allowed_fingerprints.contains(&fingerprint) {
            debug!(%fingerprint, "skipping root not in the fingerprint allow-list");
            continue;
        }
        roots.push(Certificate::from_der(block.contents()).context("failed to parse root certificate")?);
    }
    Ok(roots)
}

/// Reads the basicConstraints `cA` flag; a certificate without the extension is not a CA.
fn is_ca(cert: &Certificate) -> Result<bool> {
    let Some(extensions) = cert.tbs_certificate.extensions.as_ref() else {
        return Ok(false);
    };

    match extensions.iter().find(|ext| ext.extn_id == BASIC_CONSTRAINTS) {
        Some(ext) => BasicConstraints::from_der(ext.extn_value.as_bytes())
            .map(|constraints| constraints.ca)
            .map_err(|e| VerifyError::Trust(format!("invalid basicConstraints: {e}"))),
        None => Ok(false),
    }
}
