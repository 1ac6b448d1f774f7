//! Service-reported warnings, errors and job failure reasons.
//!
//! The service encodes each of these as an object with a single tag key,
//! e.g. `{"compileWarning": {"warningMessage": "..."}}`. They are decoded
//! into closed sum types here and described by [`describe_warning`],
//! [`describe_service_error`] and [`describe_failure`], which are shared by
//! the synchronous and background query paths.
//!
//! The describe functions match every variant explicitly. Shapes the client
//! does not recognise decode into the `Unknown`/`Other` variants instead of
//! being dropped.

use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Prefix used by the fallback description for unrecognised warnings.
pub const UNKNOWN_WARNING: &str = "Unknown warning type";

/// A warning attached to an otherwise successful query or job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum Warning {
    #[serde(rename = "compileWarning")]
    Compile {
        #[serde(default, rename = "warningMessage", deserialize_with = "lenient_string")]
        message: String,
    },
    #[serde(rename = "timeRangeWarning")]
    TimeRange {
        #[serde(default, rename = "warningMessage", deserialize_with = "lenient_string")]
        message: String,
        #[serde(default, rename = "startDate")]
        start: Option<String>,
        #[serde(default, rename = "endDate")]
        end: Option<String>,
    },
    #[serde(rename = "numberOfResultsLimitWarning")]
    ResultsLimit {
        #[serde(
            default,
            rename = "numberOfResultsLimit",
            deserialize_with = "lenient_u64"
        )]
        limit: Option<u64>,
    },
    #[serde(rename = "bytesScannedLimitWarning")]
    BytesScannedLimit {},
    #[serde(rename = "deprecationWarning")]
    Deprecation {
        #[serde(default, rename = "warningMessage", deserialize_with = "lenient_string")]
        message: String,
    },
    #[serde(rename = "blocksLimitWarning")]
    BlocksLimit {},
    #[serde(rename = "aggregationBucketsLimitWarning")]
    AggregationBucketsLimit {
        #[serde(
            default,
            rename = "aggregationBucketsLimit",
            deserialize_with = "lenient_u64"
        )]
        limit: Option<u64>,
    },
    #[serde(rename = "archiveWarning")]
    Archive(ArchiveWarning),
    #[serde(rename = "scrollTimeoutWarning")]
    ScrollTimeout {},
    #[serde(rename = "fieldCountLimitWarning")]
    FieldCountLimit {},
    #[serde(rename = "shuffleFileSizeLimitReachedWarning")]
    ShuffleFileSizeLimit {},
    #[serde(rename = "filesReadLimitWarning")]
    FilesReadLimit {},
    #[serde(rename = "sidebarFilterCardinalityLimitWarning")]
    SidebarCardinalityLimit {
        #[serde(default, rename = "fieldNames")]
        field_names: Vec<String>,
    },
    /// Any shape the client does not know, kept verbatim.
    #[serde(skip)]
    Unknown { raw: Value },
}

/// Sub-kinds of an archive access warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArchiveWarning {
    NoMetastoreData {},
    BucketAccessDenied {},
    BucketReadFailed {},
    MissingData {},
}

impl Warning {
    /// Decode one tagged warning object. Never fails.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Warning>(value.clone()) {
            Ok(warning) => warning,
            Err(_) => Warning::Unknown { raw: value },
        }
    }

    /// Decode a list of tagged warning objects, keeping order.
    pub fn from_values(values: Vec<Value>) -> Vec<Self> {
        values.into_iter().map(Warning::from_value).collect()
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe_warning(self))
    }
}

/// Describe a warning in one human-readable line.
pub fn describe_warning(warning: &Warning) -> String {
    match warning {
        Warning::Compile { message } => with_message("Compile warning", message),
        Warning::TimeRange {
            message,
            start,
            end,
        } => {
            let base = with_message("Time range warning", message);
            match (start, end) {
                (Some(start), Some(end)) => format!("{} (effective range {} to {})", base, start, end),
                _ => base,
            }
        }
        Warning::ResultsLimit { limit: Some(limit) } => format!(
            "Results limit reached: output was truncated to {} results",
            limit
        ),
        Warning::ResultsLimit { limit: None } => {
            "Results limit reached: output was truncated".to_string()
        }
        Warning::BytesScannedLimit {} => "Bytes scanned limit reached: results may be incomplete; \
             add filters to reduce the data scanned"
            .to_string(),
        Warning::Deprecation { message } => with_message("Deprecation warning", message),
        Warning::BlocksLimit {} => {
            "Blocks limit reached: too many storage blocks were read; results may be incomplete"
                .to_string()
        }
        Warning::AggregationBucketsLimit { limit: Some(limit) } => format!(
            "Aggregation buckets limit reached ({} buckets): some groups were dropped",
            limit
        ),
        Warning::AggregationBucketsLimit { limit: None } => {
            "Aggregation buckets limit reached: some groups were dropped".to_string()
        }
        Warning::Archive(kind) => describe_archive_warning(*kind).to_string(),
        Warning::ScrollTimeout {} => {
            "Scroll timeout: the query session expired before all results were read".to_string()
        }
        Warning::FieldCountLimit {} => {
            "Field count limit reached: some fields were omitted from the results".to_string()
        }
        Warning::ShuffleFileSizeLimit {} => {
            "Shuffle file size limit reached: intermediate data exceeded the allowed size"
                .to_string()
        }
        Warning::FilesReadLimit {} => {
            "Files read limit reached: not all archive files were scanned".to_string()
        }
        Warning::SidebarCardinalityLimit { field_names } if field_names.is_empty() => {
            "Cardinality limit reached for sidebar filters".to_string()
        }
        Warning::SidebarCardinalityLimit { field_names } => format!(
            "Cardinality limit reached for sidebar filters on: {}",
            field_names.join(", ")
        ),
        Warning::Unknown { raw } => format!("{}: {}", UNKNOWN_WARNING, raw),
    }
}

fn describe_archive_warning(kind: ArchiveWarning) -> &'static str {
    match kind {
        ArchiveWarning::NoMetastoreData {} => {
            "Archive warning: no archive metadata found for the requested time range"
        }
        ArchiveWarning::BucketAccessDenied {} => {
            "Archive warning: access to the archive bucket was denied; check the integration permissions"
        }
        ArchiveWarning::BucketReadFailed {} => {
            "Archive warning: reading from the archive bucket failed"
        }
        ArchiveWarning::MissingData {} => {
            "Archive warning: some archived data is missing for the requested time range"
        }
    }
}

fn with_message(label: &str, message: &str) -> String {
    if message.trim().is_empty() {
        label.to_string()
    } else {
        format!("{}: {}", label, message.trim())
    }
}

/// An error reported inside a query response body.
///
/// This is the service answering, not a transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    RateLimitReached { message: String },
    Generic { message: String },
}

impl ServiceError {
    /// Decode `{"message": "...", "code": {"rateLimitReached": {}}}`. Never fails.
    pub fn from_value(value: &Value) -> Self {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string());

        let rate_limited = value
            .get("code")
            .and_then(Value::as_object)
            .map(|code| code.contains_key("rateLimitReached"))
            .unwrap_or(false);

        if rate_limited {
            ServiceError::RateLimitReached { message }
        } else {
            ServiceError::Generic { message }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ServiceError::RateLimitReached { message } | ServiceError::Generic { message } => {
                message
            }
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&describe_service_error(self))
    }
}

pub fn describe_service_error(error: &ServiceError) -> String {
    match error {
        ServiceError::RateLimitReached { message } => format!(
            "Rate limit reached: {}. Wait before retrying or reduce query frequency",
            non_empty(message, "too many queries")
        ),
        ServiceError::Generic { message } => {
            format!("Query error: {}", non_empty(message, "unspecified error"))
        }
    }
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value.trim()
    }
}

/// Why the service terminated a background job with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    ResultsLimitExceeded,
    BytesScannedLimitExceeded,
    ArchiveMetadataMissing,
    StorageAccessDenied,
    StorageReadFailed,
    ScrollTimeout,
    /// A reason the client does not know, kept verbatim.
    Other(String),
}

impl FailureReason {
    /// Map a reason code onto the known set. Accepts SCREAMING_SNAKE,
    /// kebab and camelCase spellings.
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "resultslimitexceeded" | "numberofresultslimitexceeded" | "maxresultsreached" => {
                FailureReason::ResultsLimitExceeded
            }
            "bytesscannedlimitexceeded" | "scannedbyteslimitexceeded" => {
                FailureReason::BytesScannedLimitExceeded
            }
            "missingarchivemetadata" | "archivemetadatamissing" | "nometastoredata" => {
                FailureReason::ArchiveMetadataMissing
            }
            "storageaccessdenied" | "bucketaccessdenied" => FailureReason::StorageAccessDenied,
            "storagereadfailed" | "bucketreadfailed" => FailureReason::StorageReadFailed,
            "scrolltimeout" | "sessiontimeout" | "scrolltimeoutexceeded" => {
                FailureReason::ScrollTimeout
            }
            _ => FailureReason::Other(raw.to_string()),
        }
    }
}

/// Category and remediation for a failed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureDescription {
    pub category: &'static str,
    pub remediation: String,
}

impl fmt::Display for FailureDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.category, self.remediation)
    }
}

pub fn describe_failure(reason: &FailureReason) -> FailureDescription {
    let (category, remediation) = match reason {
        FailureReason::ResultsLimitExceeded => (
            "Exceeded the maximum number of results",
            "Narrow the time range or add a limit to the query.".to_string(),
        ),
        FailureReason::BytesScannedLimitExceeded => (
            "Exceeded the scanned-bytes budget",
            "Add filters (application, subsystem, severity) so less data is scanned.".to_string(),
        ),
        FailureReason::ArchiveMetadataMissing => (
            "Archive metadata is missing",
            "Check that the requested time range was actually archived.".to_string(),
        ),
        FailureReason::StorageAccessDenied => (
            "Archive storage access was denied",
            "Check the archive bucket integration permissions.".to_string(),
        ),
        FailureReason::StorageReadFailed => (
            "Reading from archive storage failed",
            "Check the archive bucket integration permissions and try again.".to_string(),
        ),
        FailureReason::ScrollTimeout => (
            "The query session timed out",
            "Split the work into smaller queries over shorter time ranges.".to_string(),
        ),
        FailureReason::Other(raw) => (
            "Query failed",
            format!(
                "The service reported: {}",
                non_empty(raw, "no reason given")
            ),
        ),
    };
    FailureDescription {
        category,
        remediation,
    }
}

/// Treat an explicit `null` like a missing key.
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept integers encoded as JSON numbers or decimal strings.
pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_u64))
}

pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
