//! Background (server-side asynchronous) queries.
//!
//! The lifecycle is submit → poll → fetch, with cancel available until the
//! job terminates:
//!
//! ```text
//! WaitingForExecution → Running → Terminated(Success | Failed(reason) | Cancelled | TimedOut)
//! ```
//!
//! Every function here performs exactly one HTTP call and keeps no state
//! between calls. Pacing a poll loop, deadlines across polls and retry are
//! the caller's business. [`StatusTracker`] is an optional caller-owned
//! helper that enforces monotonic progress over a sequence of snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::http::ApiTransport;
use crate::ndjson::{decode_streaming_query_response, QueryResponse};
use crate::query::{format_timestamp, QueryRequest};
use crate::warnings::{describe_failure, describe_warning, value_as_u64, FailureReason, Warning};

pub const SUBMIT_PATH: &str = "/api/v1/dataprime/background-query";
pub const STATUS_PATH: &str = "/api/v1/dataprime/background-query/status";
pub const DATA_PATH: &str = "/api/v1/dataprime/background-query/data";
pub const CANCEL_PATH: &str = "/api/v1/dataprime/background-query/cancel";

/// Opaque identity of a submitted job.
///
/// Created by [`submit_background_query`], or re-created from an id the
/// caller was previously given with [`BackgroundJobHandle::resume`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackgroundJobHandle {
    job_id: String,
}

impl BackgroundJobHandle {
    pub fn resume(job_id: impl Into<String>) -> Result<Self> {
        let job_id = job_id.into();
        if job_id.trim().is_empty() {
            return Err(Error::invalid("job id", "cannot be empty"));
        }
        Ok(Self { job_id })
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    fn body(&self) -> Value {
        json!({ "queryId": self.job_id })
    }
}

impl fmt::Display for BackgroundJobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.job_id)
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub handle: BackgroundJobHandle,
    /// Warnings raised while compiling the query, before execution starts.
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    query: &'a str,
    syntax: &'static str,
    tier: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    now_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(default)]
    query_id: Option<String>,
    #[serde(default)]
    warnings: Vec<Value>,
}

pub(crate) fn submit_body(request: &QueryRequest, now: Option<DateTime<Utc>>) -> Result<Value> {
    let body = SubmitBody {
        query: &request.text,
        syntax: request.syntax.wire_name(),
        tier: request.tier.wire_name(),
        start_date: request.time_window.as_ref().map(|w| format_timestamp(&w.start)),
        end_date: request.time_window.as_ref().map(|w| format_timestamp(&w.end)),
        now_date: now.as_ref().map(format_timestamp),
        limit: request.result_limit,
    };
    Ok(serde_json::to_value(body)?)
}

/// Submit `request` for server-side execution.
///
/// `now` pins the reference time relative expressions in the query are
/// evaluated against; `None` lets the service use its own clock.
pub async fn submit_background_query<T>(
    transport: &T,
    request: &QueryRequest,
    now: Option<DateTime<Utc>>,
) -> Result<Submission>
where
    T: ApiTransport + ?Sized,
{
    request.validate()?;
    let body = submit_body(request, now)?;
    let text = transport.call(Method::POST, SUBMIT_PATH, Some(&body)).await?;

    let response: SubmitResponse = serde_json::from_str(non_empty_body(&text))
        .map_err(|e| Error::malformed("submit", e.to_string()))?;
    let job_id = response
        .query_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| Error::malformed("submit", "response did not contain a queryId"))?;

    let submission = Submission {
        handle: BackgroundJobHandle { job_id },
        warnings: Warning::from_values(response.warnings),
    };
    info!(
        job_id = %submission.handle,
        warnings = submission.warnings.len(),
        "background query submitted"
    );
    Ok(submission)
}

fn non_empty_body(text: &str) -> &str {
    if text.trim().is_empty() {
        "{}"
    } else {
        text
    }
}

/// How a terminated job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failed(FailureReason),
    Cancelled,
    TimedOut,
}

impl JobOutcome {
    pub fn describe(&self) -> String {
        match self {
            JobOutcome::Success => "Completed successfully".to_string(),
            JobOutcome::Failed(reason) => format!("Failed: {}", describe_failure(reason)),
            JobOutcome::Cancelled => "Cancelled".to_string(),
            JobOutcome::TimedOut => "Timed out before completing. Narrow the time range or \
                 add filters and resubmit."
                .to_string(),
        }
    }
}

/// Lifecycle position of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    WaitingForExecution,
    Running {
        since: Option<DateTime<Utc>>,
    },
    Terminated {
        since: Option<DateTime<Utc>>,
        at: Option<DateTime<Utc>>,
        outcome: JobOutcome,
    },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Terminated { .. })
    }

    pub fn outcome(&self) -> Option<&JobOutcome> {
        match self {
            JobState::Terminated { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::WaitingForExecution => "waiting for execution",
            JobState::Running { .. } => "running",
            JobState::Terminated { .. } => "terminated",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            JobState::WaitingForExecution => 0,
            JobState::Running { .. } => 1,
            JobState::Terminated { .. } => 2,
        }
    }
}

/// A full snapshot of a job, re-fetched on every poll.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    pub submitted_at: Option<DateTime<Utc>>,
    pub bytes_scanned: Option<u64>,
    pub warnings: Vec<Warning>,
}

impl JobStatus {
    /// Decode a status response body.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(non_empty_body(text))
            .map_err(|e| Error::malformed("status", e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        // The lifecycle oneof may sit at the top level or under "state".
        let lifecycle = value.get("state").filter(|s| s.is_object()).unwrap_or(value);

        let state = if let Some(terminated) = lifecycle.get("terminated") {
            JobState::Terminated {
                since: timestamp(terminated.get("runningSince")),
                at: timestamp(terminated.get("terminatedAt")),
                outcome: parse_outcome(terminated),
            }
        } else if let Some(running) = lifecycle.get("running") {
            JobState::Running {
                since: timestamp(running.get("runningSince")),
            }
        } else if lifecycle.get("waitingForExecution").is_some() {
            JobState::WaitingForExecution
        } else {
            return Err(Error::malformed(
                "status",
                "response did not contain a lifecycle state",
            ));
        };

        let warnings = value
            .get("warnings")
            .and_then(Value::as_array)
            .cloned()
            .map(Warning::from_values)
            .unwrap_or_default();

        Ok(Self {
            state,
            submitted_at: timestamp(value.get("submittedAt")),
            bytes_scanned: bytes_scanned(value),
            warnings,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Multi-line human-readable summary.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        match &self.state {
            JobState::WaitingForExecution => lines.push("State: waiting for execution".to_string()),
            JobState::Running { since } => lines.push(match since {
                Some(since) => format!("State: running since {}", format_timestamp(since)),
                None => "State: running".to_string(),
            }),
            JobState::Terminated { at, outcome, .. } => {
                lines.push(match at {
                    Some(at) => format!("State: terminated at {}", format_timestamp(at)),
                    None => "State: terminated".to_string(),
                });
                lines.push(format!("Outcome: {}", outcome.describe()));
            }
        }
        if let Some(bytes) = self.bytes_scanned {
            lines.push(format!("Bytes scanned: {}", bytes));
        }
        for warning in &self.warnings {
            lines.push(format!("Warning: {}", describe_warning(warning)));
        }
        lines.join("\n")
    }
}

fn parse_outcome(terminated: &Value) -> JobOutcome {
    if terminated.get("success").is_some() {
        return JobOutcome::Success;
    }
    let Some(error) = terminated.get("error") else {
        return JobOutcome::Failed(FailureReason::Other(
            "terminated without a reported outcome".to_string(),
        ));
    };

    if error.get("timedOut").is_some() {
        JobOutcome::TimedOut
    } else if error.get("cancelled").is_some() {
        JobOutcome::Cancelled
    } else if let Some(failed) = error.get("failed") {
        JobOutcome::Failed(parse_failure_reason(failed.get("reason")))
    } else {
        JobOutcome::Failed(FailureReason::Other(error.to_string()))
    }
}

fn parse_failure_reason(reason: Option<&Value>) -> FailureReason {
    match reason {
        Some(Value::String(code)) => FailureReason::parse(code),
        // Tagged form: {"reason": {"bytesScannedLimitExceeded": {}}}
        Some(Value::Object(map)) if map.len() == 1 => map
            .keys()
            .next()
            .map(|code| FailureReason::parse(code))
            .unwrap_or_else(|| FailureReason::Other(Value::Object(map.clone()).to_string())),
        Some(other) => FailureReason::Other(other.to_string()),
        None => FailureReason::Other("no reason given".to_string()),
    }
}

fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value?.as_str()?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            debug!(value = raw, error = %e, "ignoring unparsable timestamp");
            None
        }
    }
}

/// Largest `bytesScanned` reported under `metadata[].statistics` or `statistics`.
fn bytes_scanned(value: &Value) -> Option<u64> {
    let from_metadata = value
        .get("metadata")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("statistics"));

    let from_statistics: Vec<&Value> = match value.get("statistics") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => Vec::new(),
    };

    from_metadata
        .chain(from_statistics)
        .filter_map(|stats| stats.get("bytesScanned").and_then(value_as_u64))
        .max()
}

/// Fetch the current status of a job. A pure read.
pub async fn poll_background_query_status<T>(
    transport: &T,
    handle: &BackgroundJobHandle,
) -> Result<JobStatus>
where
    T: ApiTransport + ?Sized,
{
    let text = transport
        .call(Method::POST, STATUS_PATH, Some(&handle.body()))
        .await?;
    let status = JobStatus::parse(&text)?;
    debug!(
        job_id = %handle,
        state = status.state.label(),
        bytes_scanned = ?status.bytes_scanned,
        warnings = status.warnings.len(),
        "background query status"
    );
    Ok(status)
}

/// Data for a job, or the absence of it.
#[derive(Debug, Clone, PartialEq)]
pub enum BackgroundResult {
    /// The service returned an empty body (still running, or no data).
    NotReady,
    /// Anything the body carried, including warnings without rows.
    Ready(QueryResponse),
}

/// Fetch the results of a job.
///
/// Meaningful once the job terminated successfully. Earlier calls get
/// [`BackgroundResult::NotReady`] when the service returns an empty body.
/// A body with content, even if every line is malformed, is `Ready`.
pub async fn fetch_background_query_result<T>(
    transport: &T,
    handle: &BackgroundJobHandle,
) -> Result<BackgroundResult>
where
    T: ApiTransport + ?Sized,
{
    let text = transport
        .call(Method::POST, DATA_PATH, Some(&handle.body()))
        .await?;

    let response = decode_streaming_query_response(&text);
    if response.frames.is_empty() && response.skipped_lines == 0 {
        debug!(job_id = %handle, "background query data not ready");
        return Ok(BackgroundResult::NotReady);
    }

    info!(
        job_id = %handle,
        records = response.records().len(),
        skipped_lines = response.skipped_lines,
        "background query data fetched"
    );
    Ok(BackgroundResult::Ready(response))
}

/// Acknowledgement of a cancel request. Says nothing about the final outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelAcknowledgement {
    pub handle: BackgroundJobHandle,
}

/// Ask the service to stop a job. Best effort: the job may already have
/// terminated, which is not an error. Observe the effect by polling.
pub async fn cancel_background_query<T>(
    transport: &T,
    handle: &BackgroundJobHandle,
) -> Result<CancelAcknowledgement>
where
    T: ApiTransport + ?Sized,
{
    let text = transport
        .call(Method::POST, CANCEL_PATH, Some(&handle.body()))
        .await?;
    debug!(job_id = %handle, bytes = text.len(), "cancel acknowledged");
    Ok(CancelAcknowledgement {
        handle: handle.clone(),
    })
}

/// Caller-owned record of the latest snapshot for one job.
///
/// Snapshots never move backwards: once a terminal state has been observed
/// it sticks, and a lower-ranked state after a higher one is ignored.
#[derive(Debug, Default)]
pub struct StatusTracker {
    last: Option<JobStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `snapshot` and return the snapshot the caller should act on.
    pub fn observe(&mut self, snapshot: JobStatus) -> &JobStatus {
        match self.last.take() {
            Some(previous) if !advances(&previous, &snapshot) => {
                warn!(
                    kept = previous.state.label(),
                    ignored = snapshot.state.label(),
                    "ignoring status snapshot that moves backwards"
                );
                self.last.insert(previous)
            }
            _ => self.last.insert(snapshot),
        }
    }

    pub fn last(&self) -> Option<&JobStatus> {
        self.last.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.last.as_ref().is_some_and(JobStatus::is_terminal)
    }
}

fn advances(previous: &JobStatus, next: &JobStatus) -> bool {
    if previous.state.is_terminal() {
        previous.state == next.state
    } else {
        next.state.rank() >= previous.state.rank()
    }
}
