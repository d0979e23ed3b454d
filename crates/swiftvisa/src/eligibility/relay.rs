use super::domain::EligibilityResult;
use super::service::EligibilityError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::warn;

/// Message shown to callers for every failure kind.
pub const FAILURE_MESSAGE: &str = "Eligibility check failed";

/// Status and body handed back across the HTTP boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl BoundaryResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl IntoResponse for BoundaryResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn relay(outcome: Result<EligibilityResult, EligibilityError>) -> BoundaryResponse {
    match outcome {
        Ok(result) => BoundaryResponse {
            status: StatusCode::OK,
            body: Value::Object(result.into_map()),
        },
        Err(err) => failure(err.kind(), err.details()),
    }
}

fn failure(kind: &str, details: String) -> BoundaryResponse {
    warn!(kind, details = details.as_str(), "eligibility check failed");
    BoundaryResponse {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: json!({ "error": FAILURE_MESSAGE, "details": details }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eligibility::backend::InvocationError;
    use crate::eligibility::normalizer::NormalizationError;
    use std::time::Duration;

    fn verdict() -> EligibilityResult {
        EligibilityResult::new("Likely Eligible", "Acceptance and funds documented [1].")
            .with_field("confidence", json!(87))
            .with_field("missing_information", json!([]))
            .with_field("query_text", json!("F1 Student eligibility"))
    }

    #[test]
    fn success_forwards_the_verdict() {
        let response = relay(Ok(verdict()));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.body,
            json!({
                "decision": "Likely Eligible",
                "explanation": "Acceptance and funds documented [1].",
                "confidence": 87,
                "missing_information": [],
                "query_text": "F1 Student eligibility"
            })
        );
    }

    #[test]
    fn success_body_keeps_nulls_and_worker_key_order() {
        let raw = json!({
            "explanation": "Offer letter on file.",
            "decision": "likely eligible",
            "confidence": null,
            "citations": [1.0]
        });
        let verdict = EligibilityResult::from_value(raw.clone()).expect("shape");

        let response = relay(Ok(verdict));
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, raw);
        let keys: Vec<&str> = response
            .body
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["explanation", "decision", "confidence", "citations"]);
    }

    #[test]
    fn every_failure_shares_one_message() {
        let failures = vec![
            EligibilityError::from(NormalizationError::UnrecognizedCategory {
                visa_type: "O1 Talent".to_string(),
            }),
            EligibilityError::from(InvocationError::Spawn {
                program: "python3".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
            EligibilityError::from(InvocationError::NonZeroExit {
                code: Some(1),
                stderr: "model unavailable".to_string(),
            }),
            EligibilityError::from(InvocationError::MalformedOutput {
                source: serde_json::from_str::<Value>("nope").expect_err("invalid json"),
                stderr: String::new(),
            }),
            EligibilityError::from(InvocationError::Timeout {
                after: Duration::from_secs(60),
            }),
        ];

        for failure in failures {
            let response = relay(Err(failure));
            assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(response.body["error"], json!(FAILURE_MESSAGE));
            assert!(response.body["details"].is_string());
        }
    }

    #[test]
    fn non_zero_exit_details_carry_stderr() {
        let response = relay(Err(EligibilityError::from(InvocationError::NonZeroExit {
            code: Some(1),
            stderr: "model unavailable\n".to_string(),
        })));
        let details = response.body["details"].as_str().expect("details");
        assert!(details.contains("model unavailable"));
    }

    #[test]
    fn non_zero_exit_without_stderr_describes_the_status() {
        let response = relay(Err(EligibilityError::from(InvocationError::NonZeroExit {
            code: Some(2),
            stderr: String::new(),
        })));
        assert_eq!(response.body["details"], json!("worker exited with status 2"));
    }
}
