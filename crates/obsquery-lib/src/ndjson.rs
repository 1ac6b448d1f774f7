//! Newline-delimited JSON decoding for query responses.
//!
//! Every non-blank line is decoded independently. A line that is not valid
//! JSON is skipped with a WARN diagnostic and decoding carries on; the output
//! keeps the input order because callers number records positionally.

use serde_json::Value;
use tracing::warn;

use crate::diagnostics::excerpt;
use crate::warnings::{ServiceError, Warning};

const DIAGNOSTIC_LINE_LIMIT: usize = 200;

/// The JSON documents found in an NDJSON body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NdjsonDocuments {
    pub documents: Vec<Value>,
    pub skipped_lines: usize,
}

/// Split `body` into lines and parse each one. Never fails.
pub fn decode_ndjson(body: &str) -> NdjsonDocuments {
    let mut decoded = NdjsonDocuments::default();

    for (index, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(document) => decoded.documents.push(document),
            Err(e) => {
                decoded.skipped_lines += 1;
                warn!(
                    line_number = index + 1,
                    line = %excerpt(line, DIAGNOSTIC_LINE_LIMIT),
                    error = %e,
                    "skipping malformed NDJSON line"
                );
            }
        }
    }

    decoded
}

/// One row of query output.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub metadata: Vec<(String, String)>,
    pub labels: Vec<(String, String)>,
    /// The raw `userData` text.
    pub payload: String,
    /// `payload` parsed as JSON, when it is JSON.
    pub payload_parsed: Option<Value>,
}

impl DecodedRecord {
    pub fn from_value(value: &Value) -> Self {
        let (payload, payload_parsed) = match value.get("userData") {
            Some(Value::String(text)) => (text.clone(), serde_json::from_str(text).ok()),
            Some(Value::Null) | None => (String::new(), None),
            Some(other) => (other.to_string(), Some(other.clone())),
        };

        Self {
            metadata: key_value_pairs(value.get("metadata")),
            labels: key_value_pairs(value.get("labels")),
            payload,
            payload_parsed,
        }
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        lookup(&self.metadata, key)
    }

    pub fn label_value(&self, key: &str) -> Option<&str> {
        lookup(&self.labels, key)
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn key_value_pairs(value: Option<&Value>) -> Vec<(String, String)> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let key = entry.get("key")?.as_str()?.to_string();
            let value = match entry.get("value") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            Some((key, value))
        })
        .collect()
}

fn decode_results(value: Option<&Value>) -> Vec<DecodedRecord> {
    value
        .and_then(|v| v.get("results"))
        .and_then(Value::as_array)
        .map(|rows| rows.iter().map(DecodedRecord::from_value).collect())
        .unwrap_or_default()
}

/// One decoded line of a query response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    QueryId(String),
    Result(Vec<DecodedRecord>),
    Warning(Warning),
    Error(ServiceError),
    /// Valid JSON that is none of the known frame kinds.
    Unrecognized(Value),
}

impl StreamFrame {
    pub fn from_value(value: Value) -> Self {
        if let Some(error) = value.get("error") {
            return StreamFrame::Error(ServiceError::from_value(error));
        }
        if let Some(warning) = value.get("warning") {
            return StreamFrame::Warning(Warning::from_value(warning.clone()));
        }
        if let Some(result) = value.get("result") {
            return StreamFrame::Result(decode_results(Some(result)));
        }
        // Background data frames nest one level deeper.
        if let Some(response) = value.get("response") {
            return StreamFrame::Result(decode_results(response.get("results")));
        }
        if let Some(id) = query_id_of(&value) {
            return StreamFrame::QueryId(id);
        }
        StreamFrame::Unrecognized(value)
    }
}

/// Accepts both `{"queryId": "id"}` and `{"queryId": {"queryId": "id"}}`.
fn query_id_of(value: &Value) -> Option<String> {
    match value.get("queryId")? {
        Value::String(id) => Some(id.clone()),
        nested => nested
            .get("queryId")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// A fully decoded streaming query response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub frames: Vec<StreamFrame>,
    pub skipped_lines: usize,
    query_id: Option<String>,
}

impl QueryResponse {
    /// The query id, whether it came on its own line or tagged onto another.
    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    /// All result records, flattened in order of appearance.
    pub fn records(&self) -> Vec<&DecodedRecord> {
        self.frames
            .iter()
            .filter_map(|frame| match frame {
                StreamFrame::Result(records) => Some(records.iter()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn warnings(&self) -> Vec<&Warning> {
        self.frames
            .iter()
            .filter_map(|frame| match frame {
                StreamFrame::Warning(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<&ServiceError> {
        self.frames
            .iter()
            .filter_map(|frame| match frame {
                StreamFrame::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn has_results(&self) -> bool {
        self.frames
            .iter()
            .any(|frame| matches!(frame, StreamFrame::Result(_)))
    }
}

/// Decode a streaming query body into frames. Never fails.
pub fn decode_streaming_query_response(body: &str) -> QueryResponse {
    let NdjsonDocuments {
        documents,
        skipped_lines,
    } = decode_ndjson(body);

    let mut query_id = None;
    let frames = documents
        .into_iter()
        .map(|document| {
            if query_id.is_none() {
                query_id = query_id_of(&document);
            }
            StreamFrame::from_value(document)
        })
        .collect();

    QueryResponse {
        frames,
        skipped_lines,
        query_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn empty_body_yields_nothing() {
        let decoded = decode_ndjson("");
        assert!(decoded.documents.is_empty());
        assert_eq!(decoded.skipped_lines, 0);

        let blank = decode_ndjson("\n  \n\r\n");
        assert!(blank.documents.is_empty());
        assert_eq!(blank.skipped_lines, 0);
    }

    #[test]
    fn malformed_lines_are_skipped_in_order() {
        let body = "{\"n\":1}\nnot json\n{\"n\":2}\n{\"truncated\":\n{\"n\":3}";
        let decoded = decode_ndjson(body);
        assert_eq!(decoded.skipped_lines, 2);
        let ns: Vec<_> = decoded.documents.iter().map(|d| d["n"].as_i64()).collect();
        assert_eq!(ns, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn record_payload_parsing_is_best_effort() {
        let parsed = DecodedRecord::from_value(&json!({
            "metadata": [{"key": "timestamp", "value": "2024-05-01T10:00:00Z"}],
            "labels": [{"key": "applicationname", "value": "checkout"}, {"key": "n", "value": 7}],
            "userData": "{\"level\":\"error\"}"
        }));
        assert_eq!(parsed.metadata_value("timestamp"), Some("2024-05-01T10:00:00Z"));
        assert_eq!(parsed.label_value("applicationname"), Some("checkout"));
        assert_eq!(parsed.label_value("n"), Some("7"));
        assert_eq!(parsed.payload_parsed, Some(json!({"level": "error"})));

        let raw = DecodedRecord::from_value(&json!({"userData": "plain text line"}));
        assert_eq!(raw.payload, "plain text line");
        assert!(raw.payload_parsed.is_none());
        assert!(raw.metadata.is_empty());
    }

    #[test]
    fn frames_are_classified_by_tag() {
        assert!(matches!(
            StreamFrame::from_value(json!({"queryId": {"queryId": "q-1"}})),
            StreamFrame::QueryId(id) if id == "q-1"
        ));
        assert!(matches!(
            StreamFrame::from_value(json!({"error": {"message": "boom"}})),
            StreamFrame::Error(ServiceError::Generic { .. })
        ));
        assert!(matches!(
            StreamFrame::from_value(json!({"response": {"results": {"results": [{"userData": "{}"}]}}})),
            StreamFrame::Result(records) if records.len() == 1
        ));
        assert!(matches!(
            StreamFrame::from_value(json!({"somethingElse": true})),
            StreamFrame::Unrecognized(_)
        ));
    }

    #[test]
    fn mixed_body_keeps_warnings_and_records() {
        let body = "{\"result\":{\"results\":[{\"userData\":\"{\\\"a\\\":1}\"}]}}\n garbage\n{\"warning\":{\"deprecationWarning\":{\"warningMessage\":\"x\"}}}\n";
        let response = decode_streaming_query_response(body);

        assert_eq!(response.frames.len(), 2);
        assert_eq!(response.skipped_lines, 1);
        assert_eq!(response.records().len(), 1);
        assert_eq!(response.records()[0].payload_parsed, Some(json!({"a": 1})));
        assert_eq!(
            response.warnings(),
            vec![&Warning::Deprecation {
                message: "x".into()
            }]
        );
        assert!(response.errors().is_empty());
    }

    #[test]
    fn query_id_tagged_on_result_line_is_captured() {
        let body = "{\"queryId\":\"q-42\",\"result\":{\"results\":[]}}\n";
        let response = decode_streaming_query_response(body);
        assert_eq!(response.query_id(), Some("q-42"));
        assert!(response.has_results());
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn skipped_line_is_reported_with_its_parse_error() {
        let body = "{\"result\":{\"results\":[{\"userData\":\"{\\\"a\\\":1}\"}]}}\n garbage\n{\"warning\":{\"deprecationWarning\":{\"warningMessage\":\"x\"}}}\n";
        let captured = CapturedLog::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        let decoded = tracing::subscriber::with_default(subscriber, || decode_ndjson(body));
        assert_eq!(decoded.skipped_lines, 1);

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let parse_error = serde_json::from_str::<Value>("garbage")
            .unwrap_err()
            .to_string();
        assert!(output.contains("skipping malformed NDJSON line"), "{output}");
        assert!(output.contains("line_number=2"), "{output}");
        assert!(output.contains("garbage"), "{output}");
        assert!(output.contains(&parse_error), "{output}");
        assert_eq!(output.lines().count(), 1, "{output}");
    }
}
