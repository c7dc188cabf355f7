//! HTTP endpoint handlers
//!
//! Implements `GET /health` and `POST /analyze`.

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

use crate::compose::compose;
use crate::error::ApiError;
use crate::extract::extract;
use crate::health::{self, HealthResponse};
use crate::state::AppState;

/// Body of `POST /analyze`.
///
/// Only `answer` and `actor` carry content; the remaining fields keep the
/// response schema stable for clients and are always empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub reasoning: Vec<String>,
    pub answer: String,
    pub confidence: f64,
    pub timestamp: String,
    pub actor: String,
    #[serde(default)]
    pub events: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub summary: Option<serde_json::Map<String, serde_json::Value>>,
}

impl AnalyzeResponse {
    pub fn new(answer: String, actor: String) -> Self {
        Self {
            reasoning: Vec::new(),
            answer,
            confidence: 0.0,
            timestamp: String::new(),
            actor,
            events: Some(Vec::new()),
            summary: Some(serde_json::Map::new()),
        }
    }
}

/// Fields of an analysis upload.
#[derive(Debug)]
struct AnalyzeForm {
    prompt: String,
    system_prompt: Option<String>,
    filename: String,
    video: Bytes,
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::report(&state.sessions).await)
}

/// Handle POST /analyze - answer a prompt about an uploaded video
pub async fn analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let form = parse_analyze_form(multipart).await?;
    info!(
        "Analyze request: {} ({} bytes), prompt {} chars",
        form.filename,
        form.video.len(),
        form.prompt.len()
    );

    // Moves into the generation task, which releases the scratch file
    let upload = state.scratch.ingest(&form.filename, &form.video).await?;
    let message = compose(&form.prompt, form.system_prompt.as_deref(), upload.path());

    let session = state.sessions.get_session().await?;
    let actor = session.config().model_name();

    let start = Instant::now();
    let output = state
        .invoker
        .invoke(session, message, state.max_new_tokens, upload)
        .await?;
    debug!("Raw pipeline output: {}", output);

    let answer = extract(&output);
    info!(
        "Analyze finished in {:.1}s, answer {} chars",
        start.elapsed().as_secs_f64(),
        answer.len()
    );

    Ok(Json(AnalyzeResponse::new(answer, actor)))
}

async fn parse_analyze_form(mut multipart: Multipart) -> Result<AnalyzeForm, ApiError> {
    let mut prompt: Option<String> = None;
    let mut system_prompt: Option<String> = None;
    let mut file: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed reading multipart field: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prompt" => {
                let text = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed reading multipart 'prompt' field: {e}"))
                })?;
                prompt = Some(text);
            }
            "system_prompt" => {
                let text = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!(
                        "Failed reading multipart 'system_prompt' field: {e}"
                    ))
                })?;
                if !text.is_empty() {
                    system_prompt = Some(text);
                }
            }
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed reading multipart 'file' field: {e}"))
                })?;
                file = Some((filename, bytes));
            }
            _ => {}
        }
    }

    let prompt = prompt
        .ok_or_else(|| ApiError::bad_request("Missing 'prompt' field in multipart request"))?;
    let (filename, video) = file.ok_or_else(|| {
        ApiError::bad_request("Missing video upload in multipart request (expected 'file' field)")
    })?;

    Ok(AnalyzeForm {
        prompt,
        system_prompt,
        filename,
        video,
    })
}
