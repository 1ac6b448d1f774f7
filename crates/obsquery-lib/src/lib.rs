//! Background and synchronous query execution against a remote log query
//! service.
//!
//! This crate holds the parts of the query tooling with real protocol
//! semantics: the NDJSON response decoder, the warning/error classifier and
//! the background-query lifecycle (submit → poll → fetch / cancel). Hosts
//! (the stdio MCP server) hand these functions an [`ApiTransport`] and turn
//! the typed results into text.
//!
//! Diagnostics go through `tracing`; [`diagnostics::init_logging`] is the
//! only subscriber constructor and it writes to stderr, leaving stdout to
//! the host's protocol transport.

pub mod background;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod http;
pub mod ndjson;
pub mod query;
pub mod warnings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use background::{
    cancel_background_query, fetch_background_query_result, poll_background_query_status,
    submit_background_query, BackgroundJobHandle, BackgroundResult, CancelAcknowledgement,
    JobOutcome, JobState, JobStatus, StatusTracker, Submission,
};
pub use config::ApiConfig;
pub use diagnostics::{init_logging, LogFormat, LoggingConfig};
pub use error::{Error, Result};
pub use http::{ApiTransport, HttpApiClient};
pub use ndjson::{
    decode_ndjson, decode_streaming_query_response, DecodedRecord, NdjsonDocuments,
    QueryResponse, StreamFrame,
};
pub use query::{
    parse_timestamp, run_query, QueryRequest, QuerySyntax, QueryTier, TimeWindow,
};
pub use warnings::{
    describe_failure, describe_service_error, describe_warning, ArchiveWarning,
    FailureDescription, FailureReason, ServiceError, Warning,
};
