use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use obsquery_lib::background::{CANCEL_PATH, DATA_PATH, STATUS_PATH, SUBMIT_PATH};
use obsquery_lib::{ApiTransport, Error, Result};
use reqwest::Method;
use serde_json::{json, Value};

/// In-memory stand-in for the remote service's background-query endpoints.
///
/// Status polls walk through `progression`; once it is exhausted the last
/// state repeats, mirroring the service's sticky terminal state. Data is
/// only served after a successful termination has been reported.
pub struct FakeQueryService {
    submit_warnings: Vec<Value>,
    progression: Mutex<VecDeque<Value>>,
    current: Mutex<Option<Value>>,
    data: String,
    paths: Mutex<Vec<String>>,
}

impl FakeQueryService {
    pub fn new(progression: Vec<Value>, data: impl Into<String>) -> Self {
        Self {
            submit_warnings: Vec::new(),
            progression: Mutex::new(progression.into()),
            current: Mutex::new(None),
            data: data.into(),
            paths: Mutex::new(Vec::new()),
        }
    }

    pub fn with_submit_warnings(mut self, warnings: Vec<Value>) -> Self {
        self.submit_warnings = warnings;
        self
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }

    fn next_status(&self) -> Value {
        let mut current = self.current.lock().unwrap();
        if let Some(next) = self.progression.lock().unwrap().pop_front() {
            *current = Some(next);
        }
        current.clone().unwrap_or_else(|| json!({"waitingForExecution": {}}))
    }

    fn succeeded(&self) -> bool {
        self.current
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s["terminated"].get("success").is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl ApiTransport for FakeQueryService {
    async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<String> {
        assert_eq!(method, Method::POST);
        self.paths.lock().unwrap().push(path.to_string());

        match path {
            SUBMIT_PATH => Ok(json!({
                "queryId": "job-1",
                "warnings": self.submit_warnings,
            })
            .to_string()),
            STATUS_PATH | DATA_PATH | CANCEL_PATH => {
                let id = body.and_then(|b| b["queryId"].as_str()).unwrap_or_default();
                if id != "job-1" {
                    return Err(Error::HttpStatus {
                        status: 404,
                        body: format!("unknown query {}", id),
                    });
                }
                match path {
                    STATUS_PATH => Ok(self.next_status().to_string()),
                    DATA_PATH if self.succeeded() => Ok(self.data.clone()),
                    DATA_PATH => Ok(String::new()),
                    _ => Ok("{}".to_string()),
                }
            }
            other => Err(Error::HttpStatus {
                status: 404,
                body: format!("no route {}", other),
            }),
        }
    }
}
