//! Composite store: a remote primary backed by an in-memory secondary.
//!
//! Leads created on the primary are mirrored into the secondary under the same id, so a
//! later write can land there if the primary goes away mid-call. Reads prefer the primary
//! and consult the secondary when the primary errors or does not know the lead. A write
//! that neither store accepts is logged and dropped; the surrounding call carries on.

use std::sync::Arc;

use async_trait::async_trait;

use super::memory::MemoryStore;
use super::models::{Lead, LeadWithAnswers, Question};
use super::{LeadStore, SharedStore, StoreResult};

pub struct FallbackStore {
    primary: SharedStore,
    secondary: Arc<MemoryStore>,
}

impl FallbackStore {
    pub fn new(primary: SharedStore, secondary: Arc<MemoryStore>) -> Self {
        Self { primary, secondary }
    }

    fn primary_failed(&self, op: &'static str, error: &dyn std::fmt::Display) {
        tracing::warn!(
            op,
            primary = self.primary.backend(),
            secondary = self.secondary.backend(),
            error = %error,
            "Primary store failed, using secondary"
        );
    }
}

#[async_trait]
impl LeadStore for FallbackStore {
    fn backend(&self) -> &'static str {
        self.primary.backend()
    }

    async fn initialize(&self) -> StoreResult<()> {
        if let Err(e) = self.primary.initialize().await {
            self.primary_failed("initialize", &e);
            return self.secondary.initialize().await;
        }
        Ok(())
    }

    async fn create_lead(&self, phone_number: &str, name: Option<&str>) -> StoreResult<String> {
        match self.primary.create_lead(phone_number, name).await {
            Ok(id) => {
                self.secondary
                    .insert_lead(Lead::new(id.clone(), phone_number, name))
                    .await;
                Ok(id)
            }
            Err(e) => {
                self.primary_failed("create_lead", &e);
                self.secondary.create_lead(phone_number, name).await
            }
        }
    }

    async fn get_questions(&self) -> StoreResult<Vec<Question>> {
        match self.primary.get_questions().await {
            Ok(questions) => Ok(questions),
            Err(e) => {
                self.primary_failed("get_questions", &e);
                self.secondary.get_questions().await
            }
        }
    }

    async fn save_response(
        &self,
        lead_id: &str,
        question_id: i64,
        answer: &str,
        confidence: Option<f64>,
    ) -> StoreResult<i64> {
        let primary_error = match self
            .primary
            .save_response(lead_id, question_id, answer, confidence)
            .await
        {
            Ok(id) => return Ok(id),
            Err(e) => e,
        };
        self.primary_failed("save_response", &primary_error);
        match self
            .secondary
            .save_response(lead_id, question_id, answer, confidence)
            .await
        {
            Ok(id) => Ok(id),
            Err(e) => {
                tracing::error!(
                    lead_id,
                    question_id,
                    primary_error = %primary_error,
                    error = %e,
                    "Answer dropped, no store accepted it"
                );
                Ok(0)
            }
        }
    }

    async fn get_lead_with_responses(&self, lead_id: &str) -> StoreResult<Option<LeadWithAnswers>> {
        match self.primary.get_lead_with_responses(lead_id).await {
            Ok(Some(lead)) => Ok(Some(lead)),
            Ok(None) => self.secondary.get_lead_with_responses(lead_id).await,
            Err(e) => {
                self.primary_failed("get_lead_with_responses", &e);
                self.secondary.get_lead_with_responses(lead_id).await
            }
        }
    }

    /// Primary leads plus any the secondary took while the primary was down, newest first.
    async fn get_all_leads(&self) -> StoreResult<Vec<Lead>> {
        let mut leads = match self.primary.get_all_leads().await {
            Ok(leads) => leads,
            Err(e) => {
                self.primary_failed("get_all_leads", &e);
                return self.secondary.get_all_leads().await;
            }
        };
        for lead in self.secondary.get_all_leads().await? {
            if !leads.iter().any(|l| l.id == lead.id) {
                leads.push(lead);
            }
        }
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }
}
