//! Plain-text rendering of query results for tool output.

use std::fmt::Write as _;

use obsquery_lib::{
    describe_service_error, describe_warning, BackgroundJobHandle, BackgroundResult,
    CancelAcknowledgement, DecodedRecord, Error, JobOutcome, JobStatus, QueryResponse,
    Submission, Warning,
};

/// Records beyond this are counted but not printed.
pub const MAX_RENDERED_RECORDS: usize = 100;

pub fn render_query_response(response: &QueryResponse) -> String {
    let mut out = String::new();
    if let Some(query_id) = response.query_id() {
        let _ = writeln!(out, "Query ID: {}", query_id);
    }

    let records = response.records();
    if records.is_empty() {
        out.push_str("No records matched.\n");
    } else {
        let _ = writeln!(out, "Records: {}", records.len());
        for (index, record) in records.iter().take(MAX_RENDERED_RECORDS).enumerate() {
            render_record(&mut out, index + 1, record);
        }
        if records.len() > MAX_RENDERED_RECORDS {
            let _ = writeln!(
                out,
                "... {} more records not shown. Add a limit or narrow the query.",
                records.len() - MAX_RENDERED_RECORDS
            );
        }
    }

    render_warnings(&mut out, &response.warnings());

    let errors = response.errors();
    if !errors.is_empty() {
        out.push_str("\nErrors:\n");
        for error in errors {
            let _ = writeln!(out, "- {}", describe_service_error(error));
        }
    }

    if response.skipped_lines > 0 {
        let _ = writeln!(
            out,
            "\nSkipped {} malformed line(s) in the response.",
            response.skipped_lines
        );
    }

    out.trim_end().to_string()
}

fn render_record(out: &mut String, position: usize, record: &DecodedRecord) {
    let fields: Vec<String> = record
        .metadata
        .iter()
        .chain(record.labels.iter())
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    let _ = writeln!(out, "\n#{} {}", position, fields.join(" "));

    let payload = record
        .payload_parsed
        .as_ref()
        .and_then(|value| serde_json::to_string_pretty(value).ok())
        .unwrap_or_else(|| record.payload.clone());
    if !payload.is_empty() {
        let _ = writeln!(out, "{}", payload);
    }
}

fn render_warnings(out: &mut String, warnings: &[&Warning]) {
    if warnings.is_empty() {
        return;
    }
    out.push_str("\nWarnings:\n");
    for warning in warnings {
        let _ = writeln!(out, "- {}", describe_warning(warning));
    }
}

pub fn render_submission(submission: &Submission) -> String {
    let mut out = format!(
        "Background query submitted.\nJob ID: {}\n",
        submission.handle
    );
    let warnings: Vec<&Warning> = submission.warnings.iter().collect();
    render_warnings(&mut out, &warnings);
    out.push_str("\nPoll get_background_query_status with this job ID until it terminates.");
    out
}

pub fn render_status(handle: &BackgroundJobHandle, status: &JobStatus) -> String {
    let next = match status.state.outcome() {
        None => "Not finished yet. Poll again later.",
        Some(JobOutcome::Success) => "Fetch the results with get_background_query_data.",
        Some(_) => "The job will not produce results.",
    };
    format!("Job {}\n{}\n\n{}", handle, status.describe(), next)
}

pub fn render_background_result(handle: &BackgroundJobHandle, result: &BackgroundResult) -> String {
    match result {
        BackgroundResult::NotReady => format!(
            "No data available yet for job {}. Check get_background_query_status; \
             data is only served once the job has succeeded.",
            handle
        ),
        BackgroundResult::Ready(response) => {
            format!("Job {}\n{}", handle, render_query_response(response))
        }
    }
}

pub fn render_cancel(ack: &CancelAcknowledgement) -> String {
    format!(
        "Cancellation requested for job {}. The job may already have finished; \
         poll its status to see the final outcome.",
        ack.handle
    )
}

/// Text for a call that could not be completed.
pub fn render_failure(err: &Error) -> String {
    match err {
        Error::MissingApiKey => {
            "No API key configured. Set OBSQUERY_API_KEY and restart the server.".to_string()
        }
        Error::RateLimited { .. } => format!(
            "{}. Wait before retrying and reduce how often queries are sent.",
            err
        ),
        Error::Unauthorized { .. } => format!(
            "{}. Check that OBSQUERY_API_KEY is valid for the configured OBSQUERY_API_URL.",
            err
        ),
        Error::Http(_) => format!(
            "Could not reach the query service: {}. Check OBSQUERY_API_URL and network connectivity.",
            err
        ),
        other => format!("Request failed: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obsquery_lib::decode_streaming_query_response;

    #[test]
    fn records_are_numbered_in_order() {
        let body = concat!(
            r#"{"result":{"results":[{"metadata":[{"key":"severity","value":"ERROR"}],"labels":[{"key":"applicationname","value":"api"}],"userData":"{\"msg\":\"first\"}"}]}}"#,
            "\n",
            r#"{"result":{"results":[{"metadata":[],"labels":[],"userData":"plain second"}]}}"#,
        );
        let text = render_query_response(&decode_streaming_query_response(body));

        assert!(text.starts_with("Records: 2"));
        let first = text.find("#1 severity=ERROR applicationname=api").unwrap();
        let second = text.find("#2").unwrap();
        assert!(first < second);
        assert!(text.contains("\"msg\": \"first\""));
        assert!(text.contains("plain second"));
    }

    #[test]
    fn warnings_errors_and_skips_are_reported() {
        let body = concat!(
            r#"{"warning":{"numberOfResultsLimitWarning":{"numberOfResultsLimit":1000}}}"#,
            "\n",
            "garbage\n",
            r#"{"error":{"message":"slow down","code":{"rateLimitReached":{}}}}"#,
        );
        let text = render_query_response(&decode_streaming_query_response(body));

        assert!(text.contains("No records matched."));
        assert!(text.contains("Warnings:"));
        assert!(text.contains("1000"));
        assert!(text.contains("Errors:"));
        assert!(text.contains("Skipped 1 malformed line(s)"));
    }

    #[test]
    fn long_results_are_truncated() {
        let line = r#"{"result":{"results":[{"metadata":[],"labels":[],"userData":"x"}]}}"#;
        let body = vec![line; MAX_RENDERED_RECORDS + 5].join("\n");
        let text = render_query_response(&decode_streaming_query_response(&body));

        assert!(text.contains(&format!("#{}", MAX_RENDERED_RECORDS)));
        assert!(!text.contains(&format!("#{}", MAX_RENDERED_RECORDS + 1)));
        assert!(text.contains("5 more records not shown"));
    }

    #[test]
    fn failures_carry_remediation() {
        assert!(render_failure(&Error::MissingApiKey).contains("OBSQUERY_API_KEY"));

        let limited = render_failure(&Error::RateLimited {
            retry_after_secs: Some(30),
        });
        assert!(limited.contains("Wait before retrying"));

        let status = render_failure(&Error::HttpStatus {
            status: 502,
            body: "bad gateway".to_string(),
        });
        assert!(status.starts_with("Request failed"));
        assert!(status.contains("502"));
    }
}
