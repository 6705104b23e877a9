// Layouts follow the Intel EPID attestation API and the RA-TLS certificate format:
// https://api.trustedservices.intel.com/documents/sgx-attestation-api-spec.pdf

use x509_cert::der::asn1::ObjectIdentifier;

/// DER encoding of the prime256v1 named-curve OID (1.2.840.10045.3.1.7), tag and length included.
pub const PRIME256V1_OID_MARKER: [u8; 10] = [0x06, 0x08, 0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];

/// DER encoding of the Netscape comment OID (2.16.840.1.113730.1.13), tag and length included.
pub const NS_COMMENT_OID_MARKER: [u8; 11] = [0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x86, 0xF8, 0x42, 0x01, 0x0D];

pub const DER_TAG_BIT_STRING: u8 = 0x03;
pub const DER_TAG_OCTET_STRING: u8 = 0x04;

/// Unused-bits byte of the BIT STRING followed by the uncompressed point tag (`00 04`).
pub const EC_POINT_PREFIX_LEN: usize = 2;

/// Separator between report, signature and signing certificate in the RA payload.
pub const ENVELOPE_DELIMITER: u8 = b'|';
pub const ENVELOPE_SEGMENTS: usize = 3;

pub const QUOTE_STATUS_OK: &str = "OK";
pub const QUOTE_STATUS_GROUP_OUT_OF_DATE: &str = "GROUP_OUT_OF_DATE";
pub const QUOTE_STATUS_GROUP_REVOKED: &str = "GROUP_REVOKED";
pub const QUOTE_STATUS_CONFIGURATION_NEEDED: &str = "CONFIGURATION_NEEDED";

/// Hex-decoded length of the platformInfoBlob, TLV header included.
pub const PLATFORM_INFO_BLOB_LEN: usize = 105;
pub const PLATFORM_INFO_HEADER_LEN: usize = 4;

pub const QUOTE_HEADER_LEN: usize = 48;
pub const ENCLAVE_REPORT_LEN: usize = 384;
pub const QUOTE_BODY_MIN_LEN: usize = QUOTE_HEADER_LEN + ENCLAVE_REPORT_LEN;

pub const SHA256_WITH_RSA_ENCRYPTION: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
pub const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
pub const BASIC_CONSTRAINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");

/// Default report freshness window.
pub const DEFAULT_MAX_REPORT_AGE_SECS: u64 = 24 * 60 * 60;

/// How far a report timestamp may run ahead of the local clock.
pub const MAX_CLOCK_SKEW_SECS: u64 = 5 * 60;

/// Intel SGX Attestation Report Signing CA, the root of every IAS report signature.
pub const INTEL_ATTESTATION_REPORT_SIGNING_CA: &str =
    include_str!("../data/intel_attestation_report_signing_ca.pem");
