use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{check_verdict, Scorer, ScoringError, ScoringRequest};
use crate::config::ScoringConfig;
use crate::workflows::screening::domain::ScreeningVerdict;

const SYSTEM_PROMPT: &str = "You are an experienced technical recruiter. Compare the candidate CV \
with the job requirements and reply with a single JSON object with the keys \
overall_score (integer 0-100), summary (string), strengths (array of strings), \
weaknesses (array of strings), and detailed_analysis (string). Do not add any other text.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Verdict as the model spells it; scores arrive as any JSON number.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    overall_score: f64,
    summary: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    detailed_analysis: String,
}

/// Chat-completions scorer for OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct HttpScoringClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    max_cv_chars: usize,
}

impl HttpScoringClient {
    pub fn new(config: &ScoringConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: config.timeout(),
            max_cv_chars: config.max_cv_chars,
        })
    }

    fn prompt(&self, request: &ScoringRequest) -> String {
        let cv_text: String = request.cv_text.chars().take(self.max_cv_chars).collect();
        format!(
            "Job title: {}\n\nJob description:\n{}\n\nRequired skills:\n{}\n\nCandidate CV:\n{}",
            request.job_title, request.job_description, request.required_skills, cv_text
        )
    }

    async fn call(&self, request: &ScoringRequest) -> Result<ScreeningVerdict, ScoringError> {
        let prompt = self.prompt(request);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: 0.2,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                ScoringError::timed_out()
            } else {
                ScoringError::Transient(format!("scoring request failed: {err}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .map(|envelope| envelope.error.message)
                .unwrap_or_default();
            return Err(classify_status(status, &message));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|err| {
            ScoringError::Permanent(format!("scoring response is not valid JSON: {err}"))
        })?;
        parse_completion(completion)
    }
}

#[async_trait]
impl Scorer for HttpScoringClient {
    async fn score(&self, request: &ScoringRequest) -> Result<ScreeningVerdict, ScoringError> {
        debug!(model = %self.model, cv_chars = request.cv_text.chars().count(), "requesting CV score");
        match tokio::time::timeout(self.timeout, self.call(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "scoring request timed out");
                Err(ScoringError::timed_out())
            }
        }
    }
}

fn classify_status(status: StatusCode, message: &str) -> ScoringError {
    let detail = if message.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {message}")
    };

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ScoringError::Transient(format!("scorer unavailable ({detail})"))
    } else {
        ScoringError::Permanent(format!("scorer rejected the request ({detail})"))
    }
}

fn parse_completion(completion: ChatCompletionResponse) -> Result<ScreeningVerdict, ScoringError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ScoringError::Permanent("scorer returned no choices".to_string()))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(ScoringError::Permanent(
            "scorer refused the content under its content policy".to_string(),
        ));
    }

    let content = choice.message.content.unwrap_or_default();
    parse_verdict(&content)
}

pub(super) fn parse_verdict(content: &str) -> Result<ScreeningVerdict, ScoringError> {
    let json = strip_code_fence(content);
    let raw: RawVerdict = serde_json::from_str(json).map_err(|err| {
        ScoringError::Permanent(format!("scoring response could not be parsed: {err}"))
    })?;

    if !raw.overall_score.is_finite() || !(0.0..=100.0).contains(&raw.overall_score) {
        return Err(ScoringError::Permanent(format!(
            "scorer returned out-of-range score {}",
            raw.overall_score
        )));
    }

    check_verdict(ScreeningVerdict {
        overall_score: raw.overall_score.round() as u8,
        summary: raw.summary.trim().to_string(),
        strengths: clean_list(raw.strengths),
        weaknesses: clean_list(raw.weaknesses),
        detailed_analysis: raw.detailed_analysis.trim().to_string(),
    })
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Models sometimes wrap JSON in a markdown fence despite being told not to.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
