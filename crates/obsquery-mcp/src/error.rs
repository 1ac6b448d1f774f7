//! JSON-RPC error objects for the MCP server
//!
//! Protocol-level failures (bad frames, unknown methods, bad tool arguments)
//! become [`Error`] values and are written back as the `error` member of a
//! JSON-RPC response. Failures of the remote query service are not protocol
//! errors; tools report them as results with `isError: true`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Result type for MCP operations
pub type Result<T> = std::result::Result<T, Error>;

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// MCP server error carrying a JSON-RPC error code
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq)]
#[error("{message}")]
pub struct Error {
    /// JSON-RPC error code (e.g., -32601, -32602)
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Machine-readable problem type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Additional error context (e.g., parameter name, reason)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl Error {
    /// Create a new error with a code and message
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            r#type: None,
            context: None,
        }
    }

    /// Add a problem type
    pub fn with_type(mut self, problem_type: impl Into<String>) -> Self {
        self.r#type = Some(problem_type.into());
        self
    }

    /// Add context information as JSON
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// A frame that is not valid JSON
    pub fn parse_error(reason: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, "Parse error")
            .with_type("parse-error")
            .with_context(json!({ "reason": reason.into() }))
    }

    /// Valid JSON that is not a JSON-RPC request
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, format!("Invalid request: {}", reason.into()))
            .with_type("invalid-request")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Unknown method: {}", method))
            .with_type("method-not-found")
            .with_context(json!({ "method": method }))
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(INVALID_PARAMS, format!("Unknown tool: {}", name))
            .with_type("unknown-tool")
            .with_context(json!({ "tool": name }))
    }

    /// Invalid parameter error
    pub fn invalid_params(param: impl Into<String>, reason: impl Into<String>) -> Self {
        let p = param.into();
        Self::new(INVALID_PARAMS, format!("Invalid parameter: {}", p))
            .with_type("invalid-parameter")
            .with_context(json!({
                "parameter": p,
                "reason": reason.into()
            }))
    }

    /// Internal server error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(
            INTERNAL_ERROR,
            format!("Internal server error: {}", reason.into()),
        )
        .with_type("internal-error")
    }

    /// The `error` member of a JSON-RPC response
    pub fn to_json_rpc(&self) -> Value {
        let mut error = json!({
            "code": self.code,
            "message": self.message,
        });
        if self.r#type.is_some() || self.context.is_some() {
            error["data"] = json!({
                "type": self.r#type,
                "context": self.context,
            });
        }
        error
    }
}

impl From<obsquery_lib::Error> for Error {
    fn from(err: obsquery_lib::Error) -> Self {
        match err {
            obsquery_lib::Error::InvalidRequest { field, reason } => {
                Error::invalid_params(field, reason)
            }
            other => Error::internal(other.to_string()),
        }
    }
}
