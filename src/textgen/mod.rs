//! Optional generative text for the call flow and lead review.
//!
//! `TextGeneration` wraps an optional [`ChatBackend`]. With no backend, or when the backend
//! fails, every operation returns its fixed fallback text; callers never see an error.

pub mod openai;

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::TextGenConfig;
use crate::errors::TextGenError;
use crate::store::TranscriptEntry;

pub use openai::OpenAiBackend;

static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

pub const GREETING_TAIL: &str =
    "I am your AI assistant. I have a few questions to better understand your needs. Let's get started.";

pub const CLOSING_FALLBACK: &str = "Perfect! That was the last question. Thank you for your time. A team member will review your responses and contact you shortly. Have a great day!";

/// A single chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, TextGenError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadAssessment {
    pub quality: String,
    pub score: u8,
    pub notes: String,
    pub next_steps: String,
}

impl LeadAssessment {
    fn fallback(notes: &str) -> Self {
        Self {
            quality: "medium".to_string(),
            score: 5,
            notes: notes.to_string(),
            next_steps: "Manual review recommended".to_string(),
        }
    }

    /// Parse the first `{...}` span of generated output.
    fn parse(raw: &str) -> Result<Self, TextGenError> {
        let span = JSON_OBJECT
            .find(raw)
            .ok_or_else(|| TextGenError::Parse("no JSON object in output".into()))?;
        let value: serde_json::Value = serde_json::from_str(span.as_str())
            .map_err(|e| TextGenError::Parse(e.to_string()))?;

        let quality = value["quality"]
            .as_str()
            .map(|q| q.trim().to_ascii_lowercase())
            .filter(|q| matches!(q.as_str(), "high" | "medium" | "low"))
            .unwrap_or_else(|| "medium".to_string());
        let score = value["score"]
            .as_f64()
            .or_else(|| value["score"].as_str().and_then(|s| s.trim().parse().ok()))
            .unwrap_or(5.0)
            .round()
            .clamp(1.0, 10.0) as u8;
        let text = |key: &str, alt: &str| {
            value[key]
                .as_str()
                .or_else(|| value[alt].as_str())
                .map(str::to_string)
        };

        Ok(Self {
            quality,
            score,
            notes: text("notes", "explanation").unwrap_or_default(),
            next_steps: text("nextSteps", "next_steps")
                .unwrap_or_else(|| "Manual review recommended".to_string()),
        })
    }
}

#[derive(Clone, Default)]
pub struct TextGeneration {
    backend: Option<Arc<dyn ChatBackend>>,
}

fn format_transcript(transcript: &[TranscriptEntry]) -> String {
    transcript
        .iter()
        .map(|t| format!("Q: {}\nA: {}", t.question, t.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

impl TextGeneration {
    /// Always uses fallbacks.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn from_config(config: &TextGenConfig) -> Self {
        match OpenAiBackend::from_config(config) {
            Some(backend) => {
                tracing::info!(model = %config.model, "Text generation enabled");
                Self::new(Arc::new(backend))
            }
            None => {
                tracing::info!("OPENAI_API_KEY not set, text generation disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Run a completion; `None` when disabled, failed, or blank.
    async fn generate(&self, op: &'static str, request: ChatRequest) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match backend.complete(&request).await {
            Ok(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Err(e) => {
                tracing::warn!(op, error = %e, "Text generation failed, using fallback");
                None
            }
        }
    }

    pub async fn greeting(&self, name: Option<&str>, company: Option<&str>) -> String {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let request = ChatRequest {
            system: "You are a friendly, professional AI sales assistant. Keep responses concise and natural.".into(),
            prompt: format!(
                "Generate a friendly, professional greeting for a sales call.\nLead name: {}\nCompany: {}\n\nKeep it under 2 sentences and make it sound natural and conversational.",
                name.unwrap_or("Prospect"),
                company.unwrap_or("Not specified"),
            ),
            max_tokens: 100,
            temperature: 0.7,
        };
        if let Some(text) = self.generate("greeting", request).await {
            return text;
        }
        match name {
            Some(n) => format!("Hello {}. {}", n, GREETING_TAIL),
            None => format!("Hello. {}", GREETING_TAIL),
        }
    }

    /// A generated follow-up question, or `None` to stay on the static catalog.
    pub async fn follow_up_question(&self, transcript: &[TranscriptEntry]) -> Option<String> {
        let request = ChatRequest {
            system: "You are a sales qualification AI. Generate relevant follow-up questions based on conversation context.".into(),
            prompt: format!(
                "Based on the conversation history below, generate a relevant follow-up question that would help qualify this lead better.\n\nConversation History:\n{}\n\nGenerate ONE follow-up question that:\n1. Is relevant to their previous answers\n2. Helps qualify them as a lead\n3. Is conversational and natural\n4. Can be answered in 1-2 sentences\n\nQuestion:",
                format_transcript(transcript),
            ),
            max_tokens: 150,
            temperature: 0.7,
        };
        self.generate("follow_up_question", request).await
    }

    /// Acknowledge an answer. The spoken text always repeats the answer verbatim.
    pub async fn acknowledge(&self, question: &str, answer: &str) -> String {
        let fallback = format!("Thank you. You said: {}", answer);
        let request = ChatRequest {
            system: "You are a conversational AI assistant. Keep responses brief and natural.".into(),
            prompt: format!(
                "Generate a brief, natural response to acknowledge the user's answer and transition to the next question.\n\nQuestion: {}\nAnswer: {}\n\nGenerate a response that:\n1. Acknowledges their answer\n2. Repeats their answer word for word\n3. Is under 2 sentences\n\nResponse:",
                question, answer,
            ),
            max_tokens: 100,
            temperature: 0.7,
        };
        match self.generate("acknowledge", request).await {
            Some(text) if text.contains(answer) => text,
            Some(_) => {
                tracing::debug!("Generated acknowledgement dropped the answer, using fallback");
                fallback
            }
            None => fallback,
        }
    }

    pub async fn closing(&self, transcript: &[TranscriptEntry]) -> String {
        let request = ChatRequest {
            system: "You are a professional sales assistant. Generate personalized closing messages.".into(),
            prompt: format!(
                "Generate a personalized closing message for this sales call based on the conversation.\n\nConversation Summary:\n{}\n\nGenerate a closing message that:\n1. Thanks them for their time\n2. Mentions next steps\n3. Is personalized based on their answers\n4. Is professional and friendly\n5. Is under 3 sentences\n\nClosing message:",
                format_transcript(transcript),
            ),
            max_tokens: 150,
            temperature: 0.7,
        };
        self.generate("closing", request)
            .await
            .unwrap_or_else(|| CLOSING_FALLBACK.to_string())
    }

    pub async fn assess(&self, transcript: &[TranscriptEntry]) -> LeadAssessment {
        let Some(backend) = &self.backend else {
            return LeadAssessment::fallback("AI analysis not available");
        };
        let request = ChatRequest {
            system: "You are a sales lead qualification expert. Analyze conversations and provide quality assessments.".into(),
            prompt: format!(
                "Analyze this sales conversation and provide a lead quality assessment.\n\nConversation:\n{}\n\nProvide a JSON response with:\n- quality: \"high\", \"medium\", or \"low\"\n- score: 1-10 rating\n- notes: brief explanation of the assessment\n- nextSteps: recommended follow-up actions\n\nResponse:",
                format_transcript(transcript),
            ),
            max_tokens: 300,
            temperature: 0.3,
        };
        let outcome = backend
            .complete(&request)
            .await
            .and_then(|raw| LeadAssessment::parse(&raw));
        match outcome {
            Ok(assessment) => assessment,
            Err(e) => {
                tracing::warn!(op = "assess", error = %e, "Lead assessment failed, using fallback");
                LeadAssessment::fallback("Analysis failed")
            }
        }
    }
}
