//! JSON-RPC dispatch and the stdio server loop
//!
//! Requests are handled one at a time in arrival order. A request that
//! fails produces an error response; it never ends the loop. The loop ends
//! on EOF, on a broken pipe or on Ctrl-C.

use anyhow::Result;
use obsquery_lib::ApiTransport;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::{select, signal};
use tracing::{debug, error, info, warn};

use crate::tools;
use crate::transport::{is_broken_pipe, FrameTransport, Inbound};
use crate::Error;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "obsquery";

/// Server state shared by every request: the query service client.
pub struct McpServer<'a> {
    transport: &'a dyn ApiTransport,
}

impl<'a> McpServer<'a> {
    pub fn new(transport: &'a dyn ApiTransport) -> Self {
        Self { transport }
    }

    /// Handle one decoded frame. Returns None for notifications.
    pub async fn handle_message(&self, message: Value) -> Option<Value> {
        let Some(object) = message.as_object() else {
            return Some(failure(
                Value::Null,
                &Error::invalid_request("expected a JSON object"),
            ));
        };

        let id = object.get("id").cloned();
        let Some(method) = object.get("method").and_then(Value::as_str) else {
            return Some(failure(
                id.unwrap_or(Value::Null),
                &Error::invalid_request("missing method"),
            ));
        };

        let Some(id) = id else {
            debug!(method, "notification received");
            return None;
        };

        let params = object.get("params").cloned().unwrap_or(Value::Null);
        match self.dispatch(method, params).await {
            Ok(result) => Some(success(id, result)),
            Err(e) => {
                warn!(method, code = e.code, "request failed: {}", e);
                Some(failure(id, &e))
            }
        }
    }

    async fn dispatch(&self, method: &str, params: Value) -> crate::Result<Value> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")},
                "capabilities": {"tools": {}}
            })),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": tools::tool_definitions() })),
            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::invalid_params("name", "Missing tool name"))?;
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

                let output = tools::call_tool(self.transport, name, arguments).await?;
                Ok(json!({
                    "content": [{"type": "text", "text": output.text}],
                    "isError": output.is_error
                }))
            }
            other => Err(Error::method_not_found(other)),
        }
    }
}

fn success(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn failure(id: Value, error: &Error) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": error.to_json_rpc()})
}

/// Run the server loop: read frames from the transport and answer each one.
pub async fn run_server_loop<R, W>(
    transport: &mut FrameTransport<R, W>,
    server: &McpServer<'_>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!("MCP server initialized, waiting for requests...");

    loop {
        let inbound = select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal, exiting gracefully");
                break;
            }
            inbound = transport.read_message() => inbound,
        };

        let response = match inbound {
            Ok(Some(Inbound::Message(message))) => server.handle_message(message).await,
            Ok(Some(Inbound::Malformed(reason))) => {
                warn!("Discarding unparsable frame: {}", reason);
                Some(failure(Value::Null, &Error::parse_error(reason)))
            }
            Ok(None) => {
                info!("stdin closed, shutting down");
                break;
            }
            Err(e) => {
                error!("Transport error: {}", e);
                return Err(e);
            }
        };

        let Some(response) = response else {
            continue;
        };
        if let Err(e) = transport.write_message(&response).await {
            if is_broken_pipe(&e) {
                info!("client pipe closed, shutting down");
                break;
            }
            return Err(e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}
