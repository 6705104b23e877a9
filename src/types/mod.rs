use serde::{Deserialize, Serialize};

pub mod envelope;
pub mod identity;
pub mod platform_info;
pub mod quote;
pub mod report;

pub use envelope::AttestationEnvelope;
pub use identity::ExtractedIdentity;
pub use platform_info::PlatformInfoBlob;
pub use quote::{DecodedQuote, QuoteReportBody, SgxQuote};
pub use report::{QuoteReport, QuoteStatus, ReportAssessment};

use crate::error::VerifyError;

pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_ERROR: &str = "error";

/// Envelope handed back to the host: `{"result": "success"|"error", "data": ...}`.
///
/// On success `data` holds the [`DecodedQuote`] as JSON, otherwise the error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub result: String,
    pub data: String,
}

impl VerifyResult {
    pub fn success(data: String) -> Self {
        Self {
            result: RESULT_SUCCESS.to_string(),
            data,
        }
    }

    pub fn error(err: &VerifyError) -> Self {
        Self {
            result: RESULT_ERROR.to_string(),
            data: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == RESULT_SUCCESS
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "result": self.result, "data": self.data }).to_string()
    }
}

impl From<crate::error::Result<DecodedQuote>> for VerifyResult {
    fn from(outcome: crate::error::Result<DecodedQuote>) -> Self {
        match outcome.and_then(|quote| {
            serde_json::to_string(&quote)
                .map_err(|e| VerifyError::QuoteFormat(format!("Failed to stringify result: {e}")))
        }) {
            Ok(data) => Self::success(data),
            Err(err) => Self::error(&err),
        }
    }
}
