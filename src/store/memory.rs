//! Process-local lead store.
//!
//! Each `MemoryStore` owns its own collections, so tests construct one per case and the
//! server constructs one per process. Answers for a lead are appended in the order their
//! callbacks are processed.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::models::{
    Answer, Lead, LeadWithAnswers, Question, UNKNOWN_QUESTION, active_in_order, clamp_confidence,
    default_questions, sort_answers,
};
use super::{LeadStore, StoreResult};
use crate::errors::StoreError;

pub const BACKEND: &str = "memory";

#[derive(Default)]
struct Collections {
    leads: Vec<Lead>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
}

pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store seeded with the default catalog.
    pub fn new() -> Self {
        Self::with_questions(default_questions())
    }

    pub fn with_questions(questions: Vec<Question>) -> Self {
        Self {
            inner: RwLock::new(Collections {
                questions,
                ..Default::default()
            }),
        }
    }

    /// Replace the catalog. The flow must cope with the catalog changing mid-call.
    pub async fn set_questions(&self, questions: Vec<Question>) {
        self.inner.write().await.questions = questions;
    }

    /// Insert a lead created elsewhere, keeping its id. A lead with the same id is left as is.
    pub async fn insert_lead(&self, lead: Lead) {
        let mut inner = self.inner.write().await;
        if !inner.leads.iter().any(|l| l.id == lead.id) {
            inner.leads.push(lead);
        }
    }

    pub async fn answer_count(&self) -> usize {
        self.inner.read().await.answers.len()
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn initialize(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_lead(&self, phone_number: &str, name: Option<&str>) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let lead = Lead::new(id.clone(), phone_number, name);
        self.inner.write().await.leads.push(lead);
        Ok(id)
    }

    async fn get_questions(&self) -> StoreResult<Vec<Question>> {
        let questions = self.inner.read().await.questions.clone();
        Ok(active_in_order(questions))
    }

    async fn save_response(
        &self,
        lead_id: &str,
        question_id: i64,
        answer: &str,
        confidence: Option<f64>,
    ) -> StoreResult<i64> {
        let mut inner = self.inner.write().await;
        if !inner.leads.iter().any(|l| l.id == lead_id) {
            return Err(StoreError::LeadNotFound {
                id: lead_id.to_string(),
            });
        }
        let id = inner.answers.len() as i64 + 1;
        inner.answers.push(Answer {
            id,
            lead_id: lead_id.to_string(),
            question_id,
            answer: answer.to_string(),
            confidence: clamp_confidence(confidence),
            created_at: chrono::Utc::now().to_rfc3339(),
            question_text: String::new(),
            question_order: 0,
        });
        Ok(id)
    }

    async fn get_lead_with_responses(&self, lead_id: &str) -> StoreResult<Option<LeadWithAnswers>> {
        let inner = self.inner.read().await;
        let Some(lead) = inner.leads.iter().find(|l| l.id == lead_id) else {
            return Ok(None);
        };

        let mut responses: Vec<Answer> = inner
            .answers
            .iter()
            .filter(|a| a.lead_id == lead_id)
            .map(|a| {
                let question = inner.questions.iter().find(|q| q.id == a.question_id);
                Answer {
                    question_text: question
                        .map(|q| q.text.clone())
                        .unwrap_or_else(|| UNKNOWN_QUESTION.to_string()),
                    question_order: question.map(|q| q.order).unwrap_or(0),
                    ..a.clone()
                }
            })
            .collect();
        sort_answers(&mut responses);

        Ok(Some(LeadWithAnswers {
            lead: lead.clone(),
            responses,
        }))
    }

    async fn get_all_leads(&self) -> StoreResult<Vec<Lead>> {
        // Insertion order is creation order; reverse for newest first.
        Ok(self.inner.read().await.leads.iter().rev().cloned().collect())
    }
}
