use std::{
    collections::HashSet,
    env,
    path::PathBuf,
    time::Duration,
};

use anyhow::Context;
use x509_cert::der::asn1::ObjectIdentifier;

use crate::constants::{DEFAULT_MAX_REPORT_AGE_SECS, ECDSA_WITH_SHA256, SHA256_WITH_RSA_ENCRYPTION};

pub const ENV_ROOT_PEM_PATHS: &str = "MRA_ROOT_PEM_PATHS";
pub const ENV_ALLOWED_ROOT_FINGERPRINTS: &str = "MRA_ALLOWED_ROOT_FINGERPRINTS";
pub const ENV_MAX_REPORT_AGE_SECS: &str = "MRA_MAX_REPORT_AGE_SECS";
pub const ENV_ENFORCE_REPORT_DATA_BINDING: &str = "MRA_ENFORCE_REPORT_DATA_BINDING";

/// Trust decisions applied to a report once its signature checks out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPolicy {
    /// Reject reports older than this. `None` only logs the age.
    pub max_report_age: Option<Duration>,
    /// Require the quote report data to equal the certificate public key.
    pub enforce_report_data_binding: bool,
    /// Signature algorithms accepted for the report signature.
    pub allowed_signature_algorithms: Vec<ObjectIdentifier>,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            max_report_age: Some(Duration::from_secs(DEFAULT_MAX_REPORT_AGE_SECS)),
            enforce_report_data_binding: true,
            allowed_signature_algorithms: vec![SHA256_WITH_RSA_ENCRYPTION, ECDSA_WITH_SHA256],
        }
    }
}

impl VerificationPolicy {
    /// Freshness and identity binding are computed and logged but never fail verification.
    pub fn permissive() -> Self {
        Self {
            max_report_age: None,
            enforce_report_data_binding: false,
            ..Self::default()
        }
    }

    pub fn allows_signature_algorithm(&self, oid: &ObjectIdentifier) -> bool {
        self.allowed_signature_algorithms.contains(oid)
    }
}

/// Process-start configuration for a [`crate::Verifier`].
#[derive(Debug, Clone, Default)]
pub struct VerifierConfig {
    /// PEM bundles holding trusted roots. Empty selects the embedded Intel
    /// Attestation Report Signing CA.
    pub root_pem_paths: Vec<PathBuf>,
    /// Optional SHA-256 fingerprints you accept for roots (uppercase hex with colons).
    pub allowed_root_fingerprints: HashSet<String>,
    pub policy: VerificationPolicy,
}

impl VerifierConfig {
    /// Builds a configuration from `MRA_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = Self::default();

        if let Some(paths) = env::var_os(ENV_ROOT_PEM_PATHS) {
            cfg.root_pem_paths = env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }

        if let Ok(fps) = env::var(ENV_ALLOWED_ROOT_FINGERPRINTS) {
            cfg.allowed_root_fingerprints = parse_fingerprints(&fps);
        }

        if let Ok(secs) = env::var(ENV_MAX_REPORT_AGE_SECS) {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_REPORT_AGE_SECS} must be a number of seconds"))?;
            cfg.policy.max_report_age = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Ok(flag) = env::var(ENV_ENFORCE_REPORT_DATA_BINDING) {
            cfg.policy.enforce_report_data_binding = flag
                .trim()
                .parse()
                .with_context(|| format!("{ENV_ENFORCE_REPORT_DATA_BINDING} must be true or false"))?;
        }

        Ok(cfg)
    }
}

fn parse_fingerprints(list: &str) -> HashSet<String> {
    list.split(',')
        .map(|fp| fp.trim().to_ascii_uppercase())
        .filter(|fp| !fp.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_fails_closed() {
        let policy = VerificationPolicy::default();
        assert_eq!(policy.max_report_age, Some(Duration::from_secs(86_400)));
        assert!(policy.enforce_report_data_binding);
        assert!(policy.allows_signature_algorithm(&SHA256_WITH_RSA_ENCRYPTION));
        assert!(policy.allows_signature_algorithm(&ECDSA_WITH_SHA256));
        assert!(!policy.allows_signature_algorithm(&ObjectIdentifier::new_unwrap(
            "1.2.840.113549.1.1.5"
        )));
    }

    #[test]
    fn permissive_policy_keeps_allow_list() {
        let policy = VerificationPolicy::permissive();
        assert_eq!(policy.max_report_age, None);
        assert!(!policy.enforce_report_data_binding);
        assert_eq!(
            policy.allowed_signature_algorithms,
            VerificationPolicy::default().allowed_signature_algorithms
        );
    }

    #[test]
    fn fingerprints_are_normalized() {
        let fps = parse_fingerprints(" ab:cd , ,EF:01");
        assert!(fps.contains("AB:CD"));
        assert!(fps.contains("EF:01"));
        assert_eq!(fps.len(), 2);
    }
}
