//! Call-flow state machine.
//!
//! ```text
//! GREETING ──> ASKING(0) ──> RECORDING(0) ──> ASKING(1) ──> ... ──> COMPLETE
//!                 ^              │
//!                 └── retry ─────┘   (empty speech; capped by flow.max_retries)
//! ```
//!
//! Every transition is driven by one webhook request. State is reconstructed from the
//! request's [`CallState`]; the store is the only thing consulted between requests.

use crate::config::FlowConfig;
use crate::store::{SharedStore, StoreResult};
use crate::textgen::TextGeneration;

use super::state::CallState;
use super::twiml::VoiceResponse;

pub const LEAD_NOT_FOUND: &str = "Error: Lead ID not found. Goodbye!";
pub const QUESTION_NOT_FOUND: &str = "Error: Question not found. Goodbye!";
pub const RETRY: &str = "I didn't catch that. Let me ask the question again.";
pub const SKIP: &str = "Let's move on.";
pub const ALL_ANSWERED: &str = "Thank you for answering all the questions. A team member will review your responses and contact you shortly. Have a great day!";
pub const APOLOGY: &str = "Sorry, there was an error. Please try again later. Goodbye!";

#[derive(Clone)]
pub struct CallFlow {
    store: SharedStore,
    textgen: TextGeneration,
    config: FlowConfig,
}

impl CallFlow {
    pub fn new(store: SharedStore, textgen: TextGeneration, config: FlowConfig) -> Self {
        Self {
            store,
            textgen,
            config,
        }
    }

    /// Terminal document for internal failures; the call never ends silently.
    pub fn apology() -> VoiceResponse {
        VoiceResponse::new().say(APOLOGY)
    }

    /// GREETING: welcome the caller and move to the first question.
    pub async fn greeting(&self, state: &CallState) -> VoiceResponse {
        if state.lead_id.is_none() {
            tracing::warn!("Voice entry without lead id");
            return VoiceResponse::new().say(LEAD_NOT_FOUND);
        }
        let greeting = self.textgen.greeting(state.name.as_deref(), None).await;
        VoiceResponse::new()
            .say(greeting)
            .redirect(state.at(0).question_path())
    }

    /// ASKING(i): speak question `i` inside a speech gather, or finish if the catalog is exhausted.
    pub async fn ask(&self, state: &CallState) -> StoreResult<VoiceResponse> {
        let Some(lead_id) = state.lead_id.as_deref() else {
            return Ok(VoiceResponse::new().say(LEAD_NOT_FOUND));
        };
        let questions = self.store.get_questions().await?;
        let Some(question) = questions.get(state.question_index) else {
            tracing::info!(lead_id, question_index = state.question_index, "All questions asked");
            return Ok(VoiceResponse::new().say(ALL_ANSWERED));
        };

        tracing::debug!(
            lead_id,
            question_index = state.question_index,
            attempt = state.attempt,
            "Asking question"
        );
        Ok(VoiceResponse::new()
            .gather(
                state.answer_path(),
                self.config.gather_timeout_secs,
                format!("Question {}: {}", state.question_index.saturating_add(1), question.text),
            )
            .redirect(state.question_path()))
    }

    /// RECORDING(i): persist the utterance for question `i` and advance.
    pub async fn record(
        &self,
        state: &CallState,
        speech: Option<&str>,
        confidence: Option<f64>,
    ) -> StoreResult<VoiceResponse> {
        let Some(lead_id) = state.lead_id.as_deref() else {
            return Ok(VoiceResponse::new().say(LEAD_NOT_FOUND));
        };
        let index = state.question_index;
        let speech = speech.map(str::trim).unwrap_or("");

        if speech.is_empty() {
            return self.retry_or_skip(state).await;
        }

        let questions = self.store.get_questions().await?;
        let Some(question) = questions.get(index) else {
            tracing::warn!(lead_id, question_index = index, "Answer for unknown question");
            return Ok(VoiceResponse::new().say(QUESTION_NOT_FOUND));
        };

        let already_answered = self.config.dedupe_answers
            && self
                .store
                .get_lead_with_responses(lead_id)
                .await?
                .is_some_and(|lead| lead.has_answer_for(question.id));
        if already_answered {
            tracing::info!(lead_id, question_id = question.id, "Duplicate answer ignored");
        } else {
            let response_id = self
                .store
                .save_response(lead_id, question.id, speech, confidence)
                .await?;
            tracing::info!(lead_id, question_id = question.id, response_id, "Answer recorded");
        }

        let ack = self.textgen.acknowledge(&question.text, speech).await;
        let doc = VoiceResponse::new().say(ack);
        match next_index(index, questions.len()) {
            Some(next) => Ok(doc.redirect(state.at(next).question_path())),
            None => Ok(doc.say(self.closing(lead_id).await?)),
        }
    }

    async fn retry_or_skip(&self, state: &CallState) -> StoreResult<VoiceResponse> {
        let index = state.question_index;
        let capped = self
            .config
            .max_retries
            .is_some_and(|max| state.attempt >= max);
        if !capped {
            return Ok(VoiceResponse::new()
                .say(RETRY)
                .redirect(state.next_attempt().question_path()));
        }

        tracing::info!(
            lead_id = state.lead_id.as_deref().unwrap_or(""),
            question_index = index,
            attempt = state.attempt,
            "Retry limit reached, skipping question"
        );
        let questions = self.store.get_questions().await?;
        let doc = VoiceResponse::new().say(SKIP);
        match next_index(index, questions.len()) {
            Some(next) => Ok(doc.redirect(state.at(next).question_path())),
            None => Ok(doc.say(ALL_ANSWERED)),
        }
    }

    /// Closing line; only reads the transcript when it can be used.
    async fn closing(&self, lead_id: &str) -> StoreResult<String> {
        if !self.textgen.is_enabled() {
            return Ok(self.textgen.closing(&[]).await);
        }
        let transcript = self
            .store
            .get_lead_with_responses(lead_id)
            .await?
            .map(|lead| lead.transcript())
            .unwrap_or_default();
        Ok(self.textgen.closing(&transcript).await)
    }
}

/// The question after `index`, if any. `index` comes from the URL and can be any `usize`.
fn next_index(index: usize, len: usize) -> Option<usize> {
    index.checked_add(1).filter(|next| *next < len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::store::models::{Lead, LeadWithAnswers, Question, default_questions};
    use crate::store::{LeadStore, MemoryStore};
    use crate::textgen::CLOSING_FALLBACK;
    use crate::textgen::tests::CannedBackend;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn two_questions() -> Vec<Question> {
        vec![
            Question { id: 1, text: "What is your name?".into(), order: 1, active: true },
            Question { id: 2, text: "What is your email address?".into(), order: 2, active: true },
        ]
    }

    fn flow_with(store: Arc<MemoryStore>, config: FlowConfig) -> CallFlow {
        CallFlow::new(store, TextGeneration::disabled(), config)
    }

    /// Parse a relative redirect target back into state, as the next webhook would.
    fn follow(path: &str) -> CallState {
        let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");
        let params: HashMap<String, String> = query
            .split('&')
            .filter_map(|kv| kv.split_once('='))
            .map(|(k, v)| (k.to_string(), urlencoding::decode(v).unwrap().into_owned()))
            .collect();
        CallState::from_params(&params)
    }

    #[tokio::test]
    async fn test_two_question_walkthrough() {
        let store = Arc::new(MemoryStore::with_questions(two_questions()));
        let lead_id = store.create_lead("+14155552671", Some("Jane")).await.unwrap();
        let flow = flow_with(store.clone(), FlowConfig::default());

        let greet = flow.greeting(&CallState::new(&lead_id).with_name(Some("Jane"))).await;
        assert!(greet.spoken()[0].starts_with("Hello Jane. I am your AI assistant."));
        let asking = follow(greet.redirect_target().unwrap());
        assert_eq!(asking.question_index, 0);

        let ask0 = flow.ask(&asking).await.unwrap();
        assert_eq!(ask0.spoken(), vec!["Question 1: What is your name?"]);
        let rec0 = follow(ask0.gather_action().unwrap());

        let after0 = flow.record(&rec0, Some(" Jane Doe "), Some(0.91)).await.unwrap();
        assert_eq!(after0.spoken(), vec!["Thank you. You said: Jane Doe"]);
        let asking1 = follow(after0.redirect_target().unwrap());
        assert_eq!(asking1.question_index, 1);

        let ask1 = flow.ask(&asking1).await.unwrap();
        let rec1 = follow(ask1.gather_action().unwrap());
        let done = flow.record(&rec1, Some("jane@acme.test"), None).await.unwrap();
        assert_eq!(
            done.spoken(),
            vec!["Thank you. You said: jane@acme.test", CLOSING_FALLBACK]
        );
        assert!(done.is_terminal());

        let lead = store.get_lead_with_responses(&lead_id).await.unwrap().unwrap();
        let answers: Vec<(&str, f64)> = lead
            .responses
            .iter()
            .map(|a| (a.answer.as_str(), a.confidence))
            .collect();
        assert_eq!(answers, vec![("Jane Doe", 0.91), ("jane@acme.test", 0.0)]);
    }

    #[tokio::test]
    async fn test_full_run_stores_answers_in_order() {
        let store = Arc::new(MemoryStore::new());
        let lead_id = store.create_lead("+14155552671", None).await.unwrap();
        let flow = flow_with(store.clone(), FlowConfig::default());

        let mut state = CallState::new(&lead_id);
        for i in 0..8 {
            let asked = flow.ask(&state).await.unwrap();
            let recording = follow(asked.gather_action().unwrap());
            let answer = format!("answer {}", i);
            let doc = flow
                .record(&recording, Some(answer.as_str()), Some(0.5))
                .await
                .unwrap();
            match doc.redirect_target() {
                Some(next) => state = follow(next),
                None => assert_eq!(i, 7),
            }
        }

        let lead = store.get_lead_with_responses(&lead_id).await.unwrap().unwrap();
        assert_eq!(lead.responses.len(), 8);
        let ids: Vec<i64> = lead.responses.iter().map(|a| a.question_id).collect();
        assert_eq!(ids, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_empty_speech_reasks_same_question() {
        let store = Arc::new(MemoryStore::new());
        let lead_id = store.create_lead("+14155552671", None).await.unwrap();
        let flow = flow_with(store.clone(), FlowConfig::default());

        let state = CallState::new(&lead_id).at(2);
        for speech in [None, Some(""), Some("   ")] {
            let doc = flow.record(&state, speech, None).await.unwrap();
            assert_eq!(doc.spoken(), vec![RETRY]);
            let next = follow(doc.redirect_target().unwrap());
            assert_eq!(next.question_index, 2);
            assert_eq!(next.attempt, 1);
        }
        assert_eq!(store.answer_count().await, 0);
    }

    #[tokio::test]
    async fn test_retries_unbounded_by_default() {
        let store = Arc::new(MemoryStore::new());
        let lead_id = store.create_lead("+14155552671", None).await.unwrap();
        let flow = flow_with(store, FlowConfig::default());
        let mut state = CallState::new(&lead_id);
        state.attempt = 50;
        let doc = flow.record(&state, None, None).await.unwrap();
        assert_eq!(doc.spoken(), vec![RETRY]);
    }

    #[tokio::test]
    async fn test_retry_cap_skips_question() {
        let store = Arc::new(MemoryStore::with_questions(two_questions()));
        let lead_id = store.create_lead("+14155552671", None).await.unwrap();
        let config = FlowConfig {
            max_retries: Some(2),
            ..Default::default()
        };
        let flow = flow_with(store.clone(), config);

        let mut state = CallState::new(&lead_id);
        state.attempt = 1;
        let doc = flow.record(&state, None, None).await.unwrap();
        assert_eq!(doc.spoken(), vec![RETRY]);
        state = follow(doc.redirect_target().unwrap());
        assert_eq!(state.attempt, 2);

        let doc = flow.record(&state, None, None).await.unwrap();
        assert_eq!(doc.spoken(), vec![SKIP]);
        let next = follow(doc.redirect_target().unwrap());
        assert_eq!((next.question_index, next.attempt), (1, 0));

        let mut last = next.clone();
        last.attempt = 2;
        let doc = flow.record(&last, Some(""), None).await.unwrap();
        assert_eq!(doc.spoken(), vec![SKIP, ALL_ANSWERED]);
        assert!(doc.is_terminal());
        assert_eq!(store.answer_count().await, 0);
    }

    #[tokio::test]
    async fn test_out_of_range_index_at_retry_cap_ends_call() {
        let store = Arc::new(MemoryStore::with_questions(two_questions()));
        let lead_id = store.create_lead("+14155552671", None).await.unwrap();
        let config = FlowConfig {
            max_retries: Some(1),
            ..Default::default()
        };
        let flow = flow_with(store.clone(), config);

        let params: HashMap<String, String> = [
            ("leadId", lead_id.as_str()),
            ("questionIndex", "18446744073709551615"),
            ("attempt", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let state = CallState::from_params(&params);
        assert_eq!(state.question_index, usize::MAX);

        let doc = flow.record(&state, Some("  "), None).await.unwrap();
        assert_eq!(doc.spoken(), vec![SKIP, ALL_ANSWERED]);
        assert!(doc.is_terminal());

        let doc = flow.record(&state, Some("hello"), None).await.unwrap();
        assert_eq!(doc.spoken(), vec![QUESTION_NOT_FOUND]);
        let doc = flow.ask(&state).await.unwrap();
        assert_eq!(doc.spoken(), vec![ALL_ANSWERED]);
        assert_eq!(store.answer_count().await, 0);
    }

    #[test]
    fn test_next_index() {
        assert_eq!(next_index(0, 2), Some(1));
        assert_eq!(next_index(1, 2), None);
        assert_eq!(next_index(usize::MAX, 2), None);
    }

    #[tokio::test]
    async fn test_replay_stores_duplicate_by_default() {
        let store = Arc::new(MemoryStore::with_questions(two_questions()));
        let lead_id = store.create_lead("+14155552671", None).await.unwrap();
        let flow = flow_with(store.clone(), FlowConfig::default());
        let state = CallState::new(&lead_id);

        let first = flow.record(&state, Some("Jane"), None).await.unwrap();
        let replay = flow.record(&state, Some("Jane"), None).await.unwrap();
        assert_eq!(first, replay);
        assert_eq!(store.answer_count().await, 2);
    }

    #[tokio::test]
    async fn test_replay_with_dedupe_stores_once() {
        let store = Arc::new(MemoryStore::with_questions(two_questions()));
        let lead_id = store.create_lead("+14155552671", None).await.unwrap();
        let config = FlowConfig {
            dedupe_answers: true,
            ..Default::default()
        };
        let flow = flow_with(store.clone(), config);
        let state = CallState::new(&lead_id);

        let first = flow.record(&state, Some("Jane"), None).await.unwrap();
        let replay = flow.record(&state, Some("Jane"), None).await.unwrap();
        assert_eq!(first, replay);
        assert_eq!(store.answer_count().await, 1);
    }

    #[tokio::test]
    async fn test_catalog_shrinking_mid_call() {
        let store = Arc::new(MemoryStore::new());
        let lead_id = store.create_lead("+14155552671", None).await.unwrap();
        let flow = flow_with(store.clone(), FlowConfig::default());
        store.set_questions(two_questions()).await;

        let state = CallState::new(&lead_id).at(5);
        let doc = flow.record(&state, Some("Next month"), None).await.unwrap();
        assert_eq!(doc.spoken(), vec![QUESTION_NOT_FOUND]);
        assert_eq!(store.answer_count().await, 0);

        let doc = flow.ask(&state).await.unwrap();
        assert_eq!(doc.spoken(), vec![ALL_ANSWERED]);
    }

    #[tokio::test]
    async fn test_missing_lead_id_is_error_everywhere() {
        let store = Arc::new(MemoryStore::new());
        let flow = flow_with(store.clone(), FlowConfig::default());
        let state = CallState::default();

        assert_eq!(flow.greeting(&state).await.spoken(), vec![LEAD_NOT_FOUND]);
        assert_eq!(flow.ask(&state).await.unwrap().spoken(), vec![LEAD_NOT_FOUND]);
        let doc = flow.record(&state, Some("hi"), None).await.unwrap();
        assert_eq!(doc.spoken(), vec![LEAD_NOT_FOUND]);
        assert!(doc.is_terminal());
    }

    #[tokio::test]
    async fn test_unknown_lead_answer_is_store_error() {
        let store = Arc::new(MemoryStore::new());
        let flow = flow_with(store, FlowConfig::default());
        let err = flow
            .record(&CallState::new("ghost"), Some("hi"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LeadNotFound { .. }));
    }

    struct FailingStore;

    #[async_trait]
    impl LeadStore for FailingStore {
        fn backend(&self) -> &'static str {
            "failing"
        }
        async fn initialize(&self) -> StoreResult<()> {
            Ok(())
        }
        async fn create_lead(&self, _: &str, _: Option<&str>) -> StoreResult<String> {
            Ok("L1".into())
        }
        async fn get_questions(&self) -> StoreResult<Vec<Question>> {
            Err(StoreError::Backend {
                backend: "failing",
                message: "timeout".into(),
            })
        }
        async fn save_response(
            &self,
            _: &str,
            _: i64,
            _: &str,
            _: Option<f64>,
        ) -> StoreResult<i64> {
            unreachable!()
        }
        async fn get_lead_with_responses(&self, _: &str) -> StoreResult<Option<LeadWithAnswers>> {
            Ok(None)
        }
        async fn get_all_leads(&self) -> StoreResult<Vec<Lead>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let flow = CallFlow::new(
            Arc::new(FailingStore),
            TextGeneration::disabled(),
            FlowConfig::default(),
        );
        assert!(flow.ask(&CallState::new("L1")).await.is_err());
        assert!(flow.record(&CallState::new("L1"), Some("x"), None).await.is_err());
        assert_eq!(CallFlow::apology().spoken(), vec![APOLOGY]);
    }

    #[tokio::test]
    async fn test_generated_closing_uses_transcript() {
        let store = Arc::new(MemoryStore::with_questions(default_questions()[..1].to_vec()));
        let lead_id = store.create_lead("+14155552671", None).await.unwrap();
        let backend = CannedBackend::ok("Thanks Jane, we'll be in touch!");
        let flow = CallFlow::new(
            store,
            TextGeneration::new(backend.clone()),
            FlowConfig::default(),
        );

        let doc = flow.record(&CallState::new(&lead_id), Some("Jane Doe"), None).await.unwrap();
        // The canned reply lacks the answer, so the acknowledgement falls back.
        assert_eq!(
            doc.spoken(),
            vec!["Thank you. You said: Jane Doe", "Thanks Jane, we'll be in touch!"]
        );
        let seen = backend.seen.lock().unwrap();
        assert!(seen.last().unwrap().prompt.contains("Q: What is your name?\nA: Jane Doe"));
    }
}
