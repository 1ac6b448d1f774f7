use thiserror::Error;

/// Convenient result alias for the query library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
///
/// Every variant describes a failure to *ask* the remote service something.
/// A job that the service reports as failed is not an error; it arrives as a
/// successfully decoded [`crate::JobOutcome::Failed`].
#[derive(Debug, Error)]
pub enum Error {
    /// No API key was configured, so no authenticated call can be made.
    #[error("no API key configured; set OBSQUERY_API_KEY")]
    MissingApiKey,

    /// The service rejected the call because the caller is over its rate limit.
    #[error("rate limited by the query service{}", format_retry_after(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// The service rejected the credentials.
    #[error("authentication failed (HTTP {status}): {body}")]
    Unauthorized { status: u16, body: String },

    /// Any other non-2xx response.
    #[error("query service returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// A 2xx response whose body did not have the expected shape.
    #[error("malformed {context} response: {reason}")]
    MalformedResponse { context: String, reason: String },

    /// The request was rejected locally before any I/O happened.
    #[error("invalid {field}: {reason}")]
    InvalidRequest { field: String, reason: String },

    /// The shared HTTP client could not be constructed.
    #[error("failed to initialise HTTP client: {message}")]
    ClientInit { message: String },

    /// Installing the diagnostics subscriber failed.
    #[error("failed to initialise diagnostics: {message}")]
    Diagnostics { message: String },

    /// Wrapper for HTTP client errors (connect failures, timeouts, ...).
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Wrapper for JSON serialization errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedResponse {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidRequest {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True when the caller should back off before retrying.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    /// True for failures that happened while talking to the service.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::RateLimited { .. }
                | Error::Unauthorized { .. }
                | Error::HttpStatus { .. }
                | Error::Http(_)
        )
    }
}

fn format_retry_after(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!("; retry after {} seconds", secs),
        None => String::new(),
    }
}
