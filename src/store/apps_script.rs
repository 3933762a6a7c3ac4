//! Lead store proxied through a Google Apps Script web app.
//!
//! Reads are `GET {url}?action=...`; writes are `POST {url}` with a JSON body of the form
//! `{"action": "...", "data": {...}}`. Payload fields use camelCase.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::models::{
    Lead, LeadWithAnswers, Question, STATUS_ACTIVE, active_in_order, clamp_confidence,
    normalize_name, sort_answers,
};
use super::{LeadStore, StoreResult};
use crate::config::AppsScriptConfig;
use crate::errors::StoreError;

pub const BACKEND: &str = "apps_script";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct LeadsBody {
    #[serde(default)]
    leads: Vec<Lead>,
}

#[derive(Debug, Deserialize)]
struct LeadBody {
    #[serde(default)]
    lead: Option<LeadWithAnswers>,
}

#[derive(Debug, Deserialize)]
struct QuestionsBody {
    #[serde(default)]
    questions: Vec<WireQuestion>,
}

#[derive(Debug, Deserialize)]
struct SaveBody {
    #[serde(default)]
    id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Empty {}

/// Script-side question rows; the script may send text under either key and
/// `active` as a bool or a sheet string.
#[derive(Debug, Deserialize)]
struct WireQuestion {
    id: i64,
    #[serde(alias = "questionText", alias = "question_text")]
    text: String,
    #[serde(default)]
    order: i32,
    #[serde(default)]
    active: Option<serde_json::Value>,
}

impl From<WireQuestion> for Question {
    fn from(w: WireQuestion) -> Self {
        let active = match w.active {
            None => true,
            Some(serde_json::Value::Bool(b)) => b,
            Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
            Some(_) => false,
        };
        Question {
            id: w.id,
            text: w.text,
            order: w.order,
            active,
        }
    }
}

pub struct AppsScriptStore {
    client: reqwest::Client,
    url: String,
}

impl AppsScriptStore {
    pub fn from_config(config: &AppsScriptConfig) -> StoreResult<Self> {
        let (Some(url), Some(_sheet_id)) = (&config.url, &config.sheet_id) else {
            return Err(StoreError::NotConfigured {
                backend: BACKEND,
                reason: "set GOOGLE_APPS_SCRIPT_URL and GOOGLE_SHEET_ID".to_string(),
            });
        };
        Ok(Self {
            client: reqwest::Client::new(),
            url: url.clone(),
        })
    }

    async fn read<T: DeserializeOwned>(
        &self,
        action: &str,
        extra: &[(&str, &str)],
    ) -> StoreResult<T> {
        let mut query = vec![("action", action)];
        query.extend_from_slice(extra);
        self.send(self.client.get(&self.url).query(&query)).await
    }

    async fn write<T: DeserializeOwned>(
        &self,
        action: &str,
        data: serde_json::Value,
    ) -> StoreResult<T> {
        self.send(
            self.client
                .post(&self.url)
                .json(&json!({ "action": action, "data": data })),
        )
        .await
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> StoreResult<T> {
        let resp = request.send().await.map_err(|source| StoreError::Http {
            backend: BACKEND,
            source,
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Backend {
                backend: BACKEND,
                message: format!("status {}", status.as_u16()),
            });
        }
        let envelope: Envelope<T> = resp.json().await.map_err(|source| StoreError::Http {
            backend: BACKEND,
            source,
        })?;
        if !envelope.success {
            return Err(StoreError::Backend {
                backend: BACKEND,
                message: envelope.error.unwrap_or_else(|| "script reported failure".into()),
            });
        }
        Ok(envelope.body)
    }
}

#[async_trait]
impl LeadStore for AppsScriptStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn initialize(&self) -> StoreResult<()> {
        let _: Empty = self.read("test", &[]).await?;
        Ok(())
    }

    async fn create_lead(&self, phone_number: &str, name: Option<&str>) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let _: Empty = self
            .write(
                "createLead",
                json!({
                    "leadId": id,
                    "phoneNumber": phone_number,
                    "name": normalize_name(name).unwrap_or_default(),
                    "callSid": "",
                    "status": STATUS_ACTIVE,
                    "createdAt": chrono::Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        Ok(id)
    }

    async fn get_questions(&self) -> StoreResult<Vec<Question>> {
        let body: QuestionsBody = self.read("getQuestions", &[]).await?;
        Ok(active_in_order(
            body.questions.into_iter().map(Question::from).collect(),
        ))
    }

    async fn save_response(
        &self,
        lead_id: &str,
        question_id: i64,
        answer: &str,
        confidence: Option<f64>,
    ) -> StoreResult<i64> {
        if self.get_lead_with_responses(lead_id).await?.is_none() {
            return Err(StoreError::LeadNotFound {
                id: lead_id.to_string(),
            });
        }
        let question_text = self
            .get_questions()
            .await?
            .into_iter()
            .find(|q| q.id == question_id)
            .map(|q| q.text)
            .unwrap_or_default();
        let body: SaveBody = self
            .write(
                "saveResponse",
                json!({
                    "leadId": lead_id,
                    "questionId": question_id,
                    "questionText": question_text,
                    "answer": answer,
                    "confidence": clamp_confidence(confidence),
                    "createdAt": chrono::Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        Ok(body.id.unwrap_or(0))
    }

    async fn get_lead_with_responses(&self, lead_id: &str) -> StoreResult<Option<LeadWithAnswers>> {
        let body: LeadBody = self
            .read("getLeadWithResponses", &[("leadId", lead_id)])
            .await?;
        Ok(body.lead.map(|mut lead| {
            sort_answers(&mut lead.responses);
            lead
        }))
    }

    async fn get_all_leads(&self) -> StoreResult<Vec<Lead>> {
        let body: LeadsBody = self.read("getAllLeads", &[]).await?;
        let mut leads = body.leads;
        // Scripts return sheet order; present newest first.
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }
}
