//! Query requests and the synchronous query path.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::http::ApiTransport;
use crate::ndjson::{decode_streaming_query_response, QueryResponse};

pub const QUERY_PATH: &str = "/api/v1/dataprime/query";

/// Largest result limit the service accepts for a single query.
pub const MAX_RESULT_LIMIT: u32 = 50_000;

/// Query language of [`QueryRequest::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuerySyntax {
    #[default]
    DataPrime,
    Lucene,
}

impl QuerySyntax {
    pub fn wire_name(self) -> &'static str {
        match self {
            QuerySyntax::DataPrime => "QUERY_SYNTAX_DATAPRIME",
            QuerySyntax::Lucene => "QUERY_SYNTAX_LUCENE",
        }
    }
}

impl fmt::Display for QuerySyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuerySyntax::DataPrime => "dataprime",
            QuerySyntax::Lucene => "lucene",
        })
    }
}

impl FromStr for QuerySyntax {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dataprime" => Ok(QuerySyntax::DataPrime),
            "lucene" => Ok(QuerySyntax::Lucene),
            other => Err(Error::invalid(
                "syntax",
                format!("unknown syntax '{}'. Valid: dataprime, lucene", other),
            )),
        }
    }
}

/// Storage tier a query reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryTier {
    /// Recently indexed data.
    #[default]
    Frequent,
    /// Colder archival storage.
    Archive,
}

impl QueryTier {
    pub fn wire_name(self) -> &'static str {
        match self {
            QueryTier::Frequent => "TIER_FREQUENT_SEARCH",
            QueryTier::Archive => "TIER_ARCHIVE",
        }
    }
}

impl fmt::Display for QueryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryTier::Frequent => "frequent",
            QueryTier::Archive => "archive",
        })
    }
}

impl FromStr for QueryTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "frequent" | "frequent_search" | "frequent-search" => Ok(QueryTier::Frequent),
            "archive" => Ok(QueryTier::Archive),
            other => Err(Error::invalid(
                "tier",
                format!("unknown tier '{}'. Valid: frequent, archive", other),
            )),
        }
    }
}

/// Inclusive start, exclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(Error::invalid(
                "time window",
                format!("start {} must be before end {}", start, end),
            ));
        }
        Ok(Self { start, end })
    }
}

/// Parse an RFC 3339 timestamp as used by tool arguments.
pub fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::invalid(field, format!("'{}' is not an RFC 3339 timestamp: {}", value, e)))
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One query, built per call and consumed by the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub text: String,
    pub syntax: QuerySyntax,
    pub tier: QueryTier,
    pub time_window: Option<TimeWindow>,
    pub result_limit: Option<u32>,
    pub default_source: Option<String>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>, syntax: QuerySyntax) -> Self {
        Self {
            text: text.into(),
            syntax,
            tier: QueryTier::default(),
            time_window: None,
            result_limit: None,
            default_source: None,
        }
    }

    pub fn dataprime(text: impl Into<String>) -> Self {
        Self::new(text, QuerySyntax::DataPrime)
    }

    pub fn lucene(text: impl Into<String>) -> Self {
        Self::new(text, QuerySyntax::Lucene)
    }

    pub fn with_tier(mut self, tier: QueryTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_result_limit(mut self, limit: u32) -> Self {
        self.result_limit = Some(limit);
        self
    }

    pub fn with_default_source(mut self, source: impl Into<String>) -> Self {
        self.default_source = Some(source.into());
        self
    }

    /// Reject requests the service would refuse anyway, before any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::invalid("query", "cannot be empty"));
        }
        if let Some(window) = &self.time_window {
            if window.start >= window.end {
                return Err(Error::invalid(
                    "time window",
                    "start must be before end",
                ));
            }
        }
        if let Some(limit) = self.result_limit {
            if limit == 0 || limit > MAX_RESULT_LIMIT {
                return Err(Error::invalid(
                    "limit",
                    format!("must be between 1 and {}", MAX_RESULT_LIMIT),
                ));
            }
        }
        if matches!(&self.default_source, Some(source) if source.trim().is_empty()) {
            return Err(Error::invalid("default source", "cannot be blank"));
        }
        Ok(())
    }

    fn start_date(&self) -> Option<String> {
        self.time_window.as_ref().map(|w| format_timestamp(&w.start))
    }

    fn end_date(&self) -> Option<String> {
        self.time_window.as_ref().map(|w| format_timestamp(&w.end))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncQueryBody<'a> {
    query: &'a str,
    metadata: SyncQueryMetadata<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncQueryMetadata<'a> {
    tier: &'static str,
    syntax: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_source: Option<&'a str>,
}

pub(crate) fn sync_query_body(request: &QueryRequest) -> Result<serde_json::Value> {
    let body = SyncQueryBody {
        query: &request.text,
        metadata: SyncQueryMetadata {
            tier: request.tier.wire_name(),
            syntax: request.syntax.wire_name(),
            start_date: request.start_date(),
            end_date: request.end_date(),
            limit: request.result_limit,
            default_source: request.default_source.as_deref(),
        },
    };
    Ok(serde_json::to_value(body)?)
}

/// Run a query inline and decode its NDJSON body.
///
/// Warnings and service errors reported in the body are part of the returned
/// [`QueryResponse`]; only transport failures are returned as `Err`.
pub async fn run_query<T>(transport: &T, request: &QueryRequest) -> Result<QueryResponse>
where
    T: ApiTransport + ?Sized,
{
    request.validate()?;
    let body = sync_query_body(request)?;

    let text = transport.call(Method::POST, QUERY_PATH, Some(&body)).await?;
    let response = decode_streaming_query_response(&text);

    info!(
        syntax = %request.syntax,
        tier = %request.tier,
        frames = response.frames.len(),
        records = response.records().len(),
        warnings = response.warnings().len(),
        skipped_lines = response.skipped_lines,
        "query completed"
    );

    Ok(response)
}
