//! MCP tool implementations for log queries and background query jobs
//!
//! This module defines the five tools exposed by the MCP server:
//! - query_logs: Run a query inline and return the matching records
//! - submit_background_query: Start a long-running query on the server
//! - get_background_query_status: Poll a background job
//! - get_background_query_data: Fetch the results of a finished job
//! - cancel_background_query: Ask the server to stop a job
//!
//! Argument problems are returned as JSON-RPC errors. Failures of the query
//! service itself become tool results with `is_error` set, so the client can
//! read the explanation.

use obsquery_lib::{
    cancel_background_query, fetch_background_query_result, parse_timestamp,
    poll_background_query_status, run_query, submit_background_query, ApiTransport,
    BackgroundJobHandle, QueryRequest, QuerySyntax, QueryTier, TimeWindow,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::format;
use crate::types::*;
use crate::Error;

pub const QUERY_LOGS: &str = "query_logs";
pub const SUBMIT_BACKGROUND_QUERY: &str = "submit_background_query";
pub const GET_BACKGROUND_QUERY_STATUS: &str = "get_background_query_status";
pub const GET_BACKGROUND_QUERY_DATA: &str = "get_background_query_data";
pub const CANCEL_BACKGROUND_QUERY: &str = "cancel_background_query";

/// Tool descriptors for `tools/list`
pub fn tool_definitions() -> Vec<Value> {
    vec![
        definition::<QueryLogsInput>(
            QUERY_LOGS,
            "Run a DataPrime or Lucene query and return the matching log records, \
             warnings and errors.",
        ),
        definition::<SubmitBackgroundQueryInput>(
            SUBMIT_BACKGROUND_QUERY,
            "Submit a long-running query (typically against the archive) and return a job ID.",
        ),
        definition::<BackgroundJobInput>(
            GET_BACKGROUND_QUERY_STATUS,
            "Report whether a background query is waiting, running or terminated, \
             and how it ended.",
        ),
        definition::<BackgroundJobInput>(
            GET_BACKGROUND_QUERY_DATA,
            "Fetch the results of a background query that finished successfully.",
        ),
        definition::<BackgroundJobInput>(
            CANCEL_BACKGROUND_QUERY,
            "Request cancellation of a background query. Poll its status to see the outcome.",
        ),
    ]
}

fn definition<T: JsonSchema>(name: &str, description: &str) -> Value {
    let schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| json!({ "type": "object" }));
    json!({
        "name": name,
        "description": description,
        "inputSchema": schema,
    })
}

/// Route a `tools/call` to its handler
pub async fn call_tool(
    transport: &dyn ApiTransport,
    name: &str,
    arguments: Value,
) -> crate::Result<ToolOutput> {
    debug!(tool = name, "tool call");
    match name {
        QUERY_LOGS => QueryLogsTool::execute(transport, parse_arguments(arguments)?).await,
        SUBMIT_BACKGROUND_QUERY => {
            SubmitBackgroundQueryTool::execute(transport, parse_arguments(arguments)?).await
        }
        GET_BACKGROUND_QUERY_STATUS => {
            BackgroundQueryStatusTool::execute(transport, parse_arguments(arguments)?).await
        }
        GET_BACKGROUND_QUERY_DATA => {
            BackgroundQueryDataTool::execute(transport, parse_arguments(arguments)?).await
        }
        CANCEL_BACKGROUND_QUERY => {
            CancelBackgroundQueryTool::execute(transport, parse_arguments(arguments)?).await
        }
        _ => Err(Error::unknown_tool(name)),
    }
}

fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> crate::Result<T> {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| Error::invalid_params("arguments", e.to_string()))
}

/// Local validation problems are the caller's fault; everything else is
/// reported in the tool result.
fn service_failure(tool: &str, err: obsquery_lib::Error) -> crate::Result<ToolOutput> {
    if let obsquery_lib::Error::InvalidRequest { .. } = err {
        return Err(err.into());
    }
    warn!(tool, error = %err, "tool call failed");
    Ok(ToolOutput::failure(format::render_failure(&err)))
}

struct RequestArgs<'a> {
    query: &'a str,
    syntax: Option<&'a str>,
    tier: Option<&'a str>,
    default_tier: QueryTier,
    start_date: Option<&'a str>,
    end_date: Option<&'a str>,
    limit: Option<u32>,
}

fn build_request(args: RequestArgs<'_>) -> crate::Result<QueryRequest> {
    let syntax = match args.syntax {
        Some(s) => s.parse::<QuerySyntax>()?,
        None => QuerySyntax::default(),
    };
    let tier = match args.tier {
        Some(t) => t.parse::<QueryTier>()?,
        None => args.default_tier,
    };

    let mut request = QueryRequest::new(args.query, syntax).with_tier(tier);

    match (args.start_date, args.end_date) {
        (Some(start), Some(end)) => {
            let window = TimeWindow::new(
                parse_timestamp("start_date", start)?,
                parse_timestamp("end_date", end)?,
            )?;
            request = request.with_time_window(window);
        }
        (None, None) => {}
        (Some(_), None) => {
            return Err(Error::invalid_params(
                "end_date",
                "Required when start_date is given",
            ))
        }
        (None, Some(_)) => {
            return Err(Error::invalid_params(
                "start_date",
                "Required when end_date is given",
            ))
        }
    }

    if let Some(limit) = args.limit {
        request = request.with_result_limit(limit);
    }

    Ok(request)
}

/// Inline query tool handler
pub struct QueryLogsTool;

impl QueryLogsTool {
    pub async fn execute(
        transport: &dyn ApiTransport,
        input: QueryLogsInput,
    ) -> crate::Result<ToolOutput> {
        let mut request = build_request(RequestArgs {
            query: &input.query,
            syntax: input.syntax.as_deref(),
            tier: input.tier.as_deref(),
            default_tier: QueryTier::Frequent,
            start_date: input.start_date.as_deref(),
            end_date: input.end_date.as_deref(),
            limit: input.limit,
        })?;
        if let Some(source) = input.default_source {
            request = request.with_default_source(source);
        }
        request.validate()?;

        info!(syntax = %request.syntax, tier = %request.tier, "Running query");
        match run_query(transport, &request).await {
            Ok(response) => Ok(ToolOutput::success(format::render_query_response(
                &response,
            ))),
            Err(err) => service_failure(QUERY_LOGS, err),
        }
    }
}

/// Background submission tool handler
pub struct SubmitBackgroundQueryTool;

impl SubmitBackgroundQueryTool {
    pub async fn execute(
        transport: &dyn ApiTransport,
        input: SubmitBackgroundQueryInput,
    ) -> crate::Result<ToolOutput> {
        let request = build_request(RequestArgs {
            query: &input.query,
            syntax: input.syntax.as_deref(),
            tier: input.tier.as_deref(),
            default_tier: QueryTier::Archive,
            start_date: input.start_date.as_deref(),
            end_date: input.end_date.as_deref(),
            limit: input.limit,
        })?;
        request.validate()?;
        let now = input
            .now_date
            .as_deref()
            .map(|value| parse_timestamp("now_date", value))
            .transpose()?;

        match submit_background_query(transport, &request, now).await {
            Ok(submission) => Ok(ToolOutput::success(format::render_submission(
                &submission,
            ))),
            Err(err) => service_failure(SUBMIT_BACKGROUND_QUERY, err),
        }
    }
}

/// Background status tool handler
pub struct BackgroundQueryStatusTool;

impl BackgroundQueryStatusTool {
    pub async fn execute(
        transport: &dyn ApiTransport,
        input: BackgroundJobInput,
    ) -> crate::Result<ToolOutput> {
        let handle = BackgroundJobHandle::resume(input.job_id)?;
        match poll_background_query_status(transport, &handle).await {
            Ok(status) => Ok(ToolOutput::success(format::render_status(&handle, &status))),
            Err(err) => service_failure(GET_BACKGROUND_QUERY_STATUS, err),
        }
    }
}

/// Background data tool handler
pub struct BackgroundQueryDataTool;

impl BackgroundQueryDataTool {
    pub async fn execute(
        transport: &dyn ApiTransport,
        input: BackgroundJobInput,
    ) -> crate::Result<ToolOutput> {
        let handle = BackgroundJobHandle::resume(input.job_id)?;
        match fetch_background_query_result(transport, &handle).await {
            Ok(result) => Ok(ToolOutput::success(format::render_background_result(
                &handle, &result,
            ))),
            Err(err) => service_failure(GET_BACKGROUND_QUERY_DATA, err),
        }
    }
}

/// Background cancellation tool handler
pub struct CancelBackgroundQueryTool;

impl CancelBackgroundQueryTool {
    pub async fn execute(
        transport: &dyn ApiTransport,
        input: BackgroundJobInput,
    ) -> crate::Result<ToolOutput> {
        let handle = BackgroundJobHandle::resume(input.job_id)?;
        match cancel_background_query(transport, &handle).await {
            Ok(ack) => Ok(ToolOutput::success(format::render_cancel(&ack))),
            Err(err) => service_failure(CANCEL_BACKGROUND_QUERY, err),
        }
    }
}
