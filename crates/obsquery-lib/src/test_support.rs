//! Scripted in-memory [`ApiTransport`] for tests.
//!
//! Replies are consumed in order. Each call is recorded so tests can assert
//! on the path and body that would have been sent.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::http::{check_status, ApiTransport};

/// A canned reply for one call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// 200 with this body.
    Body(String),
    /// Arbitrary status and body, mapped exactly as the real client maps them.
    Status(u16, String),
    /// 429 with an optional `Retry-After`.
    RateLimited(Option<u64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, body: impl Into<String>) -> Self {
        self.with_reply(Reply::Body(body.into()))
    }

    pub fn with_reply(self, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ApiTransport for ScriptedTransport {
    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                method,
                path: path.to_string(),
                body: body.cloned(),
            });

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Status(code, body)) => {
                let status = StatusCode::from_u16(code).map_err(|e| Error::HttpStatus {
                    status: code,
                    body: e.to_string(),
                })?;
                check_status(status, None, body)
            }
            Some(Reply::RateLimited(retry_after)) => {
                check_status(StatusCode::TOO_MANY_REQUESTS, retry_after, String::new())
            }
            None => Err(Error::HttpStatus {
                status: 500,
                body: format!("no scripted reply left for {}", path),
            }),
        }
    }
}
