//! Type definitions for MCP tool inputs and outputs
//!
//! Inputs derive `JsonSchema` so `tools/list` can advertise them; argument
//! validation beyond the schema happens in [`crate::tools`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ============================================================================
// TOOL INPUTS
// ============================================================================

/// Input for the query_logs tool
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct QueryLogsInput {
    /// Query text (required)
    pub query: String,

    /// Query language: "dataprime" or "lucene" (default: "dataprime")
    #[serde(default)]
    pub syntax: Option<String>,

    /// Storage tier: "frequent" or "archive" (default: "frequent")
    #[serde(default)]
    pub tier: Option<String>,

    /// Start of the time window, RFC 3339 (requires end_date)
    #[serde(default)]
    pub start_date: Option<String>,

    /// End of the time window, RFC 3339 (requires start_date)
    #[serde(default)]
    pub end_date: Option<String>,

    /// Maximum number of results (1-50000)
    #[serde(default)]
    pub limit: Option<u32>,

    /// Default data source for the query (e.g. "logs", "spans")
    #[serde(default)]
    pub default_source: Option<String>,
}

/// Input for the submit_background_query tool
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SubmitBackgroundQueryInput {
    /// Query text (required)
    pub query: String,

    /// Query language: "dataprime" or "lucene" (default: "dataprime")
    #[serde(default)]
    pub syntax: Option<String>,

    /// Storage tier: "frequent" or "archive" (default: "archive")
    #[serde(default)]
    pub tier: Option<String>,

    /// Start of the time window, RFC 3339 (requires end_date)
    #[serde(default)]
    pub start_date: Option<String>,

    /// End of the time window, RFC 3339 (requires start_date)
    #[serde(default)]
    pub end_date: Option<String>,

    /// Reference time for relative expressions in the query, RFC 3339
    #[serde(default)]
    pub now_date: Option<String>,

    /// Maximum number of results (1-50000)
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Input for the status, data and cancel tools
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BackgroundJobInput {
    /// Job ID returned by submit_background_query
    pub job_id: String,
}

// ============================================================================
// TOOL OUTPUTS
// ============================================================================

/// Text returned to the client for one tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub text: String,

    /// The call reached a handler but the operation failed
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}
