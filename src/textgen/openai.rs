use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{ChatBackend, ChatRequest};
use crate::config::TextGenConfig;
use crate::errors::TextGenError;

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI chat-completions client.
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn from_config(config: &TextGenConfig) -> Option<Self> {
        Some(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone()?,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, TextGenError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(TextGenError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = resp.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(TextGenError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::HeaderMap, routing::post};
    use serde_json::Value;

    async fn completions(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
        let authed = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer sk-test");
        let reply = if authed {
            format!("model={}", body["model"].as_str().unwrap_or(""))
        } else {
            String::new()
        };
        Json(json!({ "choices": [ { "message": { "role": "assistant", "content": reply } } ] }))
    }

    async fn start_fake() -> Option<String> {
        let app = Router::new().route("/v1/chat/completions", post(completions));
        let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Skipping openai test (sandbox): {:?}", e);
                return None;
            }
        };
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Some(format!("http://{}/v1", addr))
    }

    fn request() -> ChatRequest {
        ChatRequest {
            system: "sys".into(),
            prompt: "hi".into(),
            max_tokens: 10,
            temperature: 0.1,
        }
    }

    #[test]
    fn test_requires_api_key() {
        assert!(OpenAiBackend::from_config(&TextGenConfig::default()).is_none());
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let Some(base) = start_fake().await else { return };
        let backend = OpenAiBackend::from_config(&TextGenConfig {
            api_key: Some("sk-test".into()),
            api_base: base,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(backend.complete(&request()).await.unwrap(), "model=gpt-3.5-turbo");
    }

    #[tokio::test]
    async fn test_blank_content_is_empty_response() {
        let Some(base) = start_fake().await else { return };
        let backend = OpenAiBackend::from_config(&TextGenConfig {
            api_key: Some("sk-wrong".into()),
            api_base: base,
            ..Default::default()
        })
        .unwrap();
        let err = backend.complete(&request()).await.unwrap_err();
        assert!(matches!(err, TextGenError::EmptyResponse));
    }
}
