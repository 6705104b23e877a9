use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zerocopy::{little_endian, AsBytes, FromBytes, FromZeroes};

use crate::constants::QUOTE_BODY_MIN_LEN;
use crate::error::{Result, VerifyError};
use crate::utils;

/// An EPID quote as embedded in `isvEnclaveQuoteBody`.
///
/// IAS strips the signature, so only the header and the enclave report remain.
#[derive(Debug, Clone)]
pub struct SgxQuote {
    pub header: QuoteHeader,
    pub report_body: EnclaveReportBody,
}

/// Header of the EPID quote data structure.
#[derive(Debug, Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct QuoteHeader {
    /// Version of the quote data structure.
    /// [2 bytes]
    pub version: little_endian::U16,

    /// 0 (unlinkable) or 1 (linkable) EPID signature.
    /// [2 bytes]
    pub sign_type: little_endian::U16,

    /// [4 bytes]
    pub epid_group_id: [u8; 4],

    /// Security version of the quoting enclave.
    /// [2 bytes]
    pub qe_svn: little_endian::U16,

    /// Security version of the provisioning certification enclave.
    /// [2 bytes]
    pub pce_svn: little_endian::U16,

    /// Extended EPID group id.
    /// [4 bytes]
    pub xeid: little_endian::U32,

    /// [32 bytes]
    pub basename: [u8; 32],
}

/// `sgx_report_body_t` of the attested enclave.
#[derive(Debug, Clone, Copy, FromBytes, FromZeroes, AsBytes)]
#[repr(C)]
pub struct EnclaveReportBody {
    /// [16 bytes]
    pub cpu_svn: [u8; 16],

    /// [4 bytes]
    pub misc_select: little_endian::U32,

    /// [28 bytes]
    pub reserved1: [u8; 28],

    /// [16 bytes]
    pub attributes: [u8; 16],

    /// Measurement of the enclave code and initial data.
    /// [32 bytes]
    pub mr_enclave: [u8; 32],

    /// [32 bytes]
    pub reserved2: [u8; 32],

    /// Hash of the enclave signing key.
    /// [32 bytes]
    pub mr_signer: [u8; 32],

    /// [96 bytes]
    pub reserved3: [u8; 96],

    /// [2 bytes]
    pub isv_prod_id: little_endian::U16,

    /// [2 bytes]
    pub isv_svn: little_endian::U16,

    /// [60 bytes]
    pub reserved4: [u8; 60],

    /// Enclave supplied data; RA certificates put their public key here.
    /// [64 bytes]
    pub report_data: [u8; 64],
}

impl SgxQuote {
    pub fn read(bytes: &mut &[u8]) -> Result<Self> {
        if bytes.len() < QUOTE_BODY_MIN_LEN {
            return Err(VerifyError::QuoteFormat(format!(
                "quote is {} bytes, expected at least {QUOTE_BODY_MIN_LEN}",
                bytes.len()
            )));
        }

        let header = utils::read_from_bytes::<QuoteHeader>(bytes)
            .ok_or_else(|| VerifyError::QuoteFormat("underflow reading quote header".into()))?;
        let report_body = utils::read_from_bytes::<EnclaveReportBody>(bytes)
            .ok_or_else(|| VerifyError::QuoteFormat("underflow reading enclave report body".into()))?;

        Ok(Self { header, report_body })
    }
}

/// Caller-facing summary of the attested enclave.
///
/// `version` and `sign_type` carry only the byte at offset 0 and 2 of the
/// quote, the form the established JSON output reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedQuote {
    pub version: u8,
    #[serde(rename = "signType")]
    pub sign_type: u8,
    #[serde(rename = "quoteReportBody")]
    pub quote_report_body: QuoteReportBody,
}

/// Hex encoded measurements; field names follow the established JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteReportBody {
    #[serde(rename = "mrEnclave")]
    pub mr_enclave: String,
    #[serde(rename = "mrsigner")]
    pub mr_signer: String,
    #[serde(rename = "reportData")]
    pub report_data: String,
}

impl From<&SgxQuote> for DecodedQuote {
    fn from(quote: &SgxQuote) -> Self {
        let [version, _] = quote.header.version.get().to_le_bytes();
        let [sign_type, _] = quote.header.sign_type.get().to_le_bytes();
        Self {
            version,
            sign_type,
            quote_report_body: QuoteReportBody {
                mr_enclave: hex::encode(quote.report_body.mr_enclave),
                mr_signer: hex::encode(quote.report_body.mr_signer),
                report_data: hex::encode(quote.report_body.report_data),
            },
        }
    }
}

impl DecodedQuote {
    /// Decodes the base64 quote body and compares its report data with `public_key`.
    ///
    /// A mismatch is only logged; whether it fails verification is up to the caller.
    pub fn decode(quote_body_b64: &str, public_key: &[u8]) -> Result<Self> {
        let raw = Base64::decode_vec(quote_body_b64)
            .map_err(|e| VerifyError::Decode(format!("isvEnclaveQuoteBody is not valid base64: {e}")))?;
        let quote = SgxQuote::read(&mut raw.as_slice())?;
        let decoded = Self::from(&quote);

        debug!(
            version = decoded.version,
            sign_type = decoded.sign_type,
            mr_enclave = %decoded.quote_report_body.mr_enclave,
            mr_signer = %decoded.quote_report_body.mr_signer,
            isv_svn = quote.report_body.isv_svn.get(),
            "decoded enclave quote"
        );
        if !decoded.binds(public_key) {
            debug!(
                report_data = %decoded.quote_report_body.report_data,
                public_key = %hex::encode(public_key),
                "quote report data does not match certificate public key"
            );
        }

        Ok(decoded)
    }

    /// True when the quote report data is exactly the certificate public key.
    pub fn binds(&self, public_key: &[u8]) -> bool {
        self.quote_report_body.report_data == hex::encode(public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// Quote buffer with a distinct marker byte at the start of each decoded field.
    fn marked_quote() -> Vec<u8> {
        let mut quote = vec![0u8; QUOTE_BODY_MIN_LEN];
        quote[0] = 0x02;
        quote[2] = 0x01;
        quote[112] = 0xE1;
        quote[176] = 0x51;
        quote[368] = 0xDA;
        quote
    }

    #[test]
    fn layouts_match_intel_sizes() {
        assert_eq!(std::mem::size_of::<QuoteHeader>(), 48);
        assert_eq!(std::mem::size_of::<EnclaveReportBody>(), 384);
    }

    #[test]
    fn decodes_fields_at_fixed_offsets() {
        let quote = marked_quote();
        let decoded = DecodedQuote::decode(&Base64::encode_string(&quote), &[]).unwrap();

        assert_eq!(decoded.version, 2);
        assert_eq!(decoded.sign_type, 1);

        let quote_hex = hex::encode(&quote);
        let body = &decoded.quote_report_body;
        assert_eq!(body.mr_enclave, quote_hex[224..288]);
        assert_eq!(body.mr_signer, quote_hex[352..416]);
        assert_eq!(body.report_data, quote_hex[736..864]);
        assert!(body.mr_enclave.starts_with("e100"));
        assert!(body.mr_signer.starts_with("5100"));
        assert!(body.report_data.starts_with("da00"));
        assert_eq!(body.report_data.len(), 128);
    }

    #[test]
    fn version_and_sign_type_take_the_low_byte() {
        let mut quote = marked_quote();
        quote[1] = 0x01;
        quote[3] = 0x07;
        let decoded = DecodedQuote::decode(&Base64::encode_string(&quote), &[]).unwrap();
        assert_eq!((decoded.version, decoded.sign_type), (2, 1));

        let header = SgxQuote::read(&mut quote.as_slice()).unwrap().header;
        assert_eq!(header.version.get(), 0x0102);
        assert_eq!(header.sign_type.get(), 0x0701);
    }

    #[test]
    fn report_data_binds_public_key() {
        let key: Vec<u8> = (0..64).map(|i| i as u8 ^ 0x5A).collect();
        let mut quote = marked_quote();
        quote[368..432].copy_from_slice(&key);

        let decoded = DecodedQuote::decode(&Base64::encode_string(&quote), &key).unwrap();
        assert_eq!(decoded.quote_report_body.report_data, hex::encode(&key));
        assert!(decoded.binds(&key));
        assert!(!decoded.binds(&key[..63]));
    }

    #[test]
    fn short_quote_is_rejected() {
        let quote = vec![0u8; 384];
        let err = DecodedQuote::decode(&Base64::encode_string(&quote), &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuoteFormat);

        let err = DecodedQuote::decode("%%%", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[test]
    fn serializes_with_established_field_names() {
        let decoded = DecodedQuote::decode(&Base64::encode_string(&marked_quote()), &[]).unwrap();
        let json = serde_json::to_value(&decoded).unwrap();
        assert_eq!(json["version"], 2);
        assert_eq!(json["signType"], 1);
        assert!(json["quoteReportBody"]["mrEnclave"].is_string());
        assert!(json["quoteReportBody"]["mrsigner"].is_string());
        assert!(json["quoteReportBody"]["reportData"].is_string());
    }
}
