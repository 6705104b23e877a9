use std::{fmt, time::{Duration, SystemTime}};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::VerificationPolicy;
use crate::constants::{
    MAX_CLOCK_SKEW_SECS, QUOTE_STATUS_CONFIGURATION_NEEDED, QUOTE_STATUS_GROUP_OUT_OF_DATE,
    QUOTE_STATUS_GROUP_REVOKED, QUOTE_STATUS_OK,
};
use crate::error::{PolicyError, Result, VerifyError};
use crate::types::PlatformInfoBlob;

/// IAS attestation verification report, as signed by the report signing key.
///
/// Mandatory fields are optional here so that a missing field surfaces as a
/// report format error instead of a generic JSON error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteReport {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epid_pseudonym: Option<String>,
    #[serde(default)]
    pub isv_enclave_quote_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_info_blob: Option<String>,
    #[serde(default)]
    pub isv_enclave_quote_body: Option<String>,
    #[serde(default, rename = "advisoryURL", skip_serializing_if = "Option::is_none")]
    pub advisory_url: Option<String>,
    #[serde(default, rename = "advisoryIDs", skip_serializing_if = "Vec::is_empty")]
    pub advisory_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteStatus {
    Ok,
    GroupOutOfDate,
    GroupRevoked,
    ConfigurationNeeded,
    Other(String),
}

impl QuoteStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ok => QUOTE_STATUS_OK,
            Self::GroupOutOfDate => QUOTE_STATUS_GROUP_OUT_OF_DATE,
            Self::GroupRevoked => QUOTE_STATUS_GROUP_REVOKED,
            Self::ConfigurationNeeded => QUOTE_STATUS_CONFIGURATION_NEEDED,
            Self::Other(status) => status,
        }
    }

    /// Statuses for which IAS attaches a platform info blob.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            Self::GroupOutOfDate | Self::GroupRevoked | Self::ConfigurationNeeded
        )
    }
}

impl From<&str> for QuoteStatus {
    fn from(status: &str) -> Self {
        match status {
            QUOTE_STATUS_OK => Self::Ok,
            QUOTE_STATUS_GROUP_OUT_OF_DATE => Self::GroupOutOfDate,
            QUOTE_STATUS_GROUP_REVOKED => Self::GroupRevoked,
            QUOTE_STATUS_CONFIGURATION_NEEDED => Self::ConfigurationNeeded,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating a signature-verified report against a policy.
#[derive(Debug, Clone)]
pub struct ReportAssessment {
    pub report: QuoteReport,
    pub issued_at: DateTime<Utc>,
    /// Zero when the timestamp is ahead of the local clock within tolerance.
    pub age: Duration,
    pub status: QuoteStatus,
    pub platform_info: Option<PlatformInfoBlob>,
    /// Base64 `isvEnclaveQuoteBody`.
    pub quote_body: String,
}

impl QuoteReport {
    pub fn from_slice(report_bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(report_bytes)
            .map_err(|e| VerifyError::ReportFormat(format!("failed to parse attestation report: {e}")))
    }

    /// Parses the report and applies quote status and freshness policy.
    ///
    /// The quote status is judged before anything else, so an unacceptable
    /// status is reported as such even when other fields are missing. Missing
    /// mandatory fields are reported next, ahead of the remaining policy checks.
    pub fn evaluate(
        report_bytes: &[u8],
        current_time: SystemTime,
        policy: &VerificationPolicy,
    ) -> Result<ReportAssessment> {
        let report = Self::from_slice(report_bytes)?;

        let status = QuoteStatus::from(required(
            &report.isv_enclave_quote_status,
            "isvEnclaveQuoteStatus",
        )?);
        debug!(%status, "isvEnclaveQuoteStatus");

        if let QuoteStatus::Other(other) = &status {
            return Err(PolicyError::UnexpectedStatus(other.clone()).into());
        }

        let timestamp = required(&report.timestamp, "timestamp")?;
        let quote_body = required(&report.isv_enclave_quote_body, "isvEnclaveQuoteBody")?.to_string();
        let issued_at = parse_timestamp(timestamp)?;

        let platform_info = if status.is_degraded() {
            Some(platform_info(&report, &status)?)
        } else {
            None
        };

        let age = check_freshness(issued_at, current_time, policy)?;

        Ok(ReportAssessment {
            report,
            issued_at,
            age,
            status,
            platform_info,
            quote_body,
        })
    }
}

/// Degraded statuses must come with a well-formed platform info blob.
fn platform_info(report: &QuoteReport, status: &QuoteStatus) -> Result<PlatformInfoBlob> {
    let blob = report
        .platform_info_blob
        .as_deref()
        .filter(|blob| !blob.is_empty())
        .ok_or(PolicyError::MissingPlatformInfoBlob)?;
    let pib = PlatformInfoBlob::from_hex(blob)?;
    match serde_json::to_string(&pib) {
        Ok(json) => debug!(%status, platform_info = %json, "platform info"),
        Err(e) => debug!("failed to render platform info: {e}"),
    }
    Ok(pib)
}

fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str> {
    field
        .as_deref()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| VerifyError::ReportFormat(format!("Failed to fetch {name} from attestation report")))
}

/// IAS timestamps are UTC without an offset; a trailing `Z` is appended before parsing.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&format!("{raw}Z"))
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| VerifyError::ReportFormat(format!("invalid report timestamp {raw:?}: {e}")))
}

fn check_freshness(
    issued_at: DateTime<Utc>,
    current_time: SystemTime,
    policy: &VerificationPolicy,
) -> Result<Duration> {
    let now = DateTime::<Utc>::from(current_time);

    let age = match (now - issued_at).to_std() {
        Ok(age) => age,
        Err(_) => {
            let ahead = (issued_at - now).to_std().unwrap_or_default();
            if policy.max_report_age.is_some() && ahead > Duration::from_secs(MAX_CLOCK_SKEW_SECS) {
                return Err(PolicyError::FutureReport { ahead }.into());
            }
            warn!(ahead_secs = ahead.as_secs(), "report timestamp is ahead of the local clock");
            Duration::ZERO
        }
    };
    debug!(age_secs = age.as_secs(), "attestation report age");

    match policy.max_report_age {
        Some(max_age) if age > max_age => Err(PolicyError::StaleReport { age, max_age }.into()),
        Some(_) => Ok(age),
        None => {
            if age > Duration::from_secs(crate::constants::DEFAULT_MAX_REPORT_AGE_SECS) {
                warn!(age_secs = age.as_secs(), "accepting stale report, freshness is not enforced");
            }
            Ok(age)
        }
    }
}
