//! Gemini integration for the study chat.
//!
//! A thin client: one prompt per question, no conversation memory beyond a
//! question counter carried in [`StudySession`].

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

const ENCOURAGING_PHRASES: &[&str] = &[
    "Great question!",
    "I love your curiosity!",
    "Let's explore this together!",
    "Excellent thinking!",
    "That's a thoughtful question!",
    "I can help you understand this!",
    "Let's break this down step by step!",
    "Perfect topic to dive into!",
];

/// LLM client errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provided API key was invalid.
    #[error("invalid API key: {reason}")]
    InvalidApiKey { reason: &'static str },
    /// The question was empty after trimming.
    #[error("question cannot be empty")]
    EmptyQuestion,
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error: {message}")]
    Api { message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Progress of the current study conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudySession {
    pub started_at: Option<DateTime<Utc>>,
    pub questions_asked: u32,
}

impl StudySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a new question and returns its 1-based number.
    pub fn record_question(&mut self, now: DateTime<Utc>) -> u32 {
        if self.started_at.is_none() {
            tracing::debug!(%now, "study session started");
            self.started_at = Some(now);
        }
        self.questions_asked = self.questions_asked.saturating_add(1);
        self.questions_asked
    }
}

/// Gemini API client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    api_key: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or whitespace-only, or if
    /// the HTTP client fails to build.
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();

        if api_key.is_empty() {
            return Err(LlmError::InvalidApiKey {
                reason: "API key cannot be empty",
            });
        }
        if api_key.trim().is_empty() {
            return Err(LlmError::InvalidApiKey {
                reason: "API key cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(LlmError::ClientBuild)?;

        Ok(Self {
            http,
            api_key: api_key.trim().to_string(),
        })
    }

    /// Asks the tutor a question and returns its answer text.
    pub async fn ask(
        &self,
        model: &str,
        session: &mut StudySession,
        question: &str,
    ) -> Result<String, LlmError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(LlmError::EmptyQuestion);
        }
        let number = session.record_question(Utc::now());
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_tutor_prompt(question, number),
                }],
            }],
        };

        tracing::debug!(model, question_number = number, "asking study question");
        let response = self
            .http
            .post(format!("{GEMINI_API_BASE}/{model}:generateContent"))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(&body).unwrap_or_else(|| LlmError::Api {
                message: format!("status {status}: {body}"),
            }));
        }
        extract_answer(&body)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Pulls the first candidate's text out of a `generateContent` body.
fn extract_answer(body: &str) -> Result<String, LlmError> {
    if let Some(err) = parse_api_error(body) {
        return Err(err);
    }
    let payload: GenerateResponse =
        serde_json::from_str(body).map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
    let text = payload
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().map(|part| part.text).collect::<String>())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(LlmError::InvalidResponse(
            "missing text content".to_string(),
        ));
    }
    Ok(text)
}

fn parse_api_error(body: &str) -> Option<LlmError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        #[serde(default)]
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| LlmError::Api {
            message: if payload.error.message.is_empty() {
                "Unknown error".to_string()
            } else {
                payload.error.message
            },
        })
}

fn encouraging_phrase(question_number: u32) -> &'static str {
    let index = usize::try_from(question_number).unwrap_or(0) % ENCOURAGING_PHRASES.len();
    ENCOURAGING_PHRASES[index]
}

fn build_tutor_prompt(question: &str, question_number: u32) -> String {
    let mut lines = Vec::new();
    lines.push(
        "You are Professor StudyBot, an experienced and caring academic tutor who helps students truly understand concepts."
            .to_string(),
    );
    lines.push("Your mission: help students learn and understand, not just get answers.".to_string());
    lines.push(String::new());
    lines.push("Teaching approach by subject:".to_string());
    lines.push("- Math/Science: show step-by-step solutions and explain why each step works.".to_string());
    lines.push("- Literature/Writing: ask about themes and guide the analysis.".to_string());
    lines.push("- History: connect events to their causes and effects.".to_string());
    lines.push("- Programming: explain the logic flow and suggest debugging approaches.".to_string());
    lines.push("- Study skills: give proven techniques for memory and time management.".to_string());
    lines.push(String::new());
    lines.push("Response formula:".to_string());
    lines.push(format!(
        "1. Acknowledge: start with \"{}\"",
        encouraging_phrase(question_number)
    ));
    lines.push("2. Teach: break the concept down step by step.".to_string());
    lines.push("3. Example: give a relatable example or analogy when helpful.".to_string());
    lines.push("4. Engage: end with a follow-up question that deepens learning.".to_string());
    lines.push("5. Encourage: remind them they are making progress.".to_string());
    lines.push(String::new());
    lines.push("Rules:".to_string());
    lines.push("- For homework, guide toward the solution instead of giving the answer.".to_string());
    lines.push("- For unclear questions, ask a clarifying question.".to_string());
    lines.push("- For off-topic questions, gently steer back to studying.".to_string());
    lines.push("- Keep responses to 2-4 focused paragraphs.".to_string());
    lines.push(String::new());
    if question_number <= 1 {
        lines.push("Session start: welcome the student to the study session.".to_string());
    } else {
        lines.push(format!(
            "Session context: this is question #{question_number} in the study session."
        ));
    }
    lines.push(String::new());
    lines.push(format!("Student's question: \"{question}\""));
    lines.join("\n")
}
