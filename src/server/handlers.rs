//! HTTP handlers for the liveness and execution routes.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::runner::executor::CodeRunner;

/// Body returned by the liveness route.
pub const LIVENESS_MESSAGE: &str = "Code Runner API is running!";

/// Output for a request body that is not valid JSON.
pub const INVALID_JSON: &str = "Invalid JSON input";

/// Output for a request body above the configured size cap.
pub const BODY_TOO_LARGE: &str = "Request body too large";

/// Output for a language identifier outside the registry.
pub const UNSUPPORTED_LANGUAGE: &str = "Unsupported language";

/// Output when the concurrency limit rejects a request.
pub const BUSY: &str = "Too many concurrent executions";

/// Body of `POST /run`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    /// Language identifier, matched exactly.
    #[serde(default)]
    pub language: String,
    /// Source code, staged verbatim.
    #[serde(default)]
    pub code: String,
    /// Optional text piped to the program's standard input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

/// Body of every `POST /run` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    /// Captured output or an error narrative.
    pub output: String,
}

fn reply(status: StatusCode, output: impl Into<String>) -> (StatusCode, Json<RunResponse>) {
    (
        status,
        Json(RunResponse {
            output: output.into(),
        }),
    )
}

/// `GET /`
pub async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}

/// `POST /run`
///
/// Execution failures of the submitted code are normal outcomes and come
/// back with `200 OK`; only malformed or oversized requests, unknown
/// languages and refused admissions use error statuses.
pub async fn run_code(
    State(runner): State<CodeRunner>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> (StatusCode, Json<RunResponse>) {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            tracing::warn!(error = %rejection, "request body over size limit");
            return reply(StatusCode::PAYLOAD_TOO_LARGE, BODY_TOO_LARGE);
        }
        Err(rejection) => {
            tracing::debug!(error = %rejection, "rejected request body");
            return reply(StatusCode::BAD_REQUEST, INVALID_JSON);
        }
    };

    match runner
        .run_with_input(&request.language, &request.code, request.stdin.as_deref())
        .await
    {
        Ok(result) => reply(StatusCode::OK, result.output),
        Err(RunnerError::UnsupportedLanguage(language)) => {
            tracing::debug!(language = %language, "unsupported language");
            reply(StatusCode::BAD_REQUEST, UNSUPPORTED_LANGUAGE)
        }
        Err(e) if e.is_busy() => {
            tracing::warn!(error = %e, "execution rejected");
            reply(StatusCode::SERVICE_UNAVAILABLE, BUSY)
        }
        Err(e) => {
            tracing::error!(error = %e, "execution could not start");
            reply(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
