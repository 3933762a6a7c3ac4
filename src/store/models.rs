use serde::{Deserialize, Serialize};

/// The only status the system currently produces.
pub const STATUS_ACTIVE: &str = "active";

/// Question text shown for an answer whose question has left the catalog.
pub const UNKNOWN_QUESTION: &str = "Unknown Question";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    pub id: String,
    #[serde(alias = "phoneNumber")]
    pub phone_number: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "callSid")]
    pub call_sid: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default, alias = "createdAt")]
    pub created_at: String,
}

fn default_status() -> String {
    STATUS_ACTIVE.to_string()
}

impl Lead {
    pub fn new(id: String, phone_number: &str, name: Option<&str>) -> Self {
        Self {
            id,
            phone_number: phone_number.to_string(),
            name: normalize_name(name),
            call_sid: None,
            status: STATUS_ACTIVE.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Blank names are stored as absent.
pub fn normalize_name(name: Option<&str>) -> Option<String> {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub order: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Questions every backend seeds into an empty catalog.
pub const DEFAULT_QUESTIONS: [&str; 8] = [
    "What is your name?",
    "What is your email address?",
    "What is your company name?",
    "What is your job title?",
    "What is your primary business need?",
    "What is your budget range for this project?",
    "When do you need this completed?",
    "How did you hear about us?",
];

pub fn default_questions() -> Vec<Question> {
    DEFAULT_QUESTIONS
        .iter()
        .enumerate()
        .map(|(i, text)| Question {
            id: i as i64 + 1,
            text: text.to_string(),
            order: i as i32 + 1,
            active: true,
        })
        .collect()
}

/// Keep active questions and sort them into script order.
pub fn active_in_order(mut questions: Vec<Question>) -> Vec<Question> {
    questions.retain(|q| q.active);
    questions.sort_by_key(|q| q.order);
    questions
}

/// A stored answer joined with the question it answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    #[serde(default)]
    pub id: i64,
    #[serde(alias = "leadId")]
    pub lead_id: String,
    #[serde(alias = "questionId")]
    pub question_id: i64,
    pub answer: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, alias = "createdAt")]
    pub created_at: String,
    #[serde(default, alias = "questionText")]
    pub question_text: String,
    #[serde(default, alias = "questionOrder")]
    pub question_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadWithAnswers {
    #[serde(flatten)]
    pub lead: Lead,
    #[serde(default)]
    pub responses: Vec<Answer>,
}

impl LeadWithAnswers {
    /// Question/answer pairs in script order, for text generation prompts.
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.responses
            .iter()
            .map(|a| TranscriptEntry {
                question: a.question_text.clone(),
                answer: a.answer.clone(),
            })
            .collect()
    }

    pub fn has_answer_for(&self, question_id: i64) -> bool {
        self.responses.iter().any(|a| a.question_id == question_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    pub question: String,
    pub answer: String,
}

/// Clamp a transcription confidence into `[0, 1]`; unknown or non-finite becomes 0.
pub fn clamp_confidence(confidence: Option<f64>) -> f64 {
    match confidence {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => 0.0,
    }
}

/// Sort answers by question order, keeping insertion order for ties.
pub fn sort_answers(answers: &mut [Answer]) {
    answers.sort_by_key(|a| a.question_order);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_questions_are_ordered_and_active() {
        let questions = default_questions();
        assert_eq!(questions.len(), 8);
        assert_eq!(questions[0].text, "What is your name?");
        assert_eq!(questions[7].text, "How did you hear about us?");
        assert!(questions.iter().all(|q| q.active));
        assert!(questions.windows(2).all(|w| w[0].order < w[1].order));
    }

    #[test]
    fn test_active_in_order_filters_and_sorts() {
        let questions = vec![
            Question { id: 1, text: "b".into(), order: 2, active: true },
            Question { id: 2, text: "gone".into(), order: 1, active: false },
            Question { id: 3, text: "a".into(), order: 0, active: true },
        ];
        let ordered = active_in_order(questions);
        let ids: Vec<i64> = ordered.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(None), 0.0);
        assert_eq!(clamp_confidence(Some(f64::NAN)), 0.0);
        assert_eq!(clamp_confidence(Some(0.42)), 0.42);
        assert_eq!(clamp_confidence(Some(1.7)), 1.0);
        assert_eq!(clamp_confidence(Some(-0.3)), 0.0);
    }

    #[test]
    fn test_blank_name_becomes_none() {
        let lead = Lead::new("id".into(), "+15550001111", Some("   "));
        assert!(lead.name.is_none());
        assert_eq!(lead.status, STATUS_ACTIVE);
        let lead = Lead::new("id".into(), "+15550001111", Some(" Jane "));
        assert_eq!(lead.name.as_deref(), Some("Jane"));
    }

    #[test]
    fn test_lead_accepts_camel_case_fields() {
        let lead: Lead = serde_json::from_value(serde_json::json!({
            "id": "L1",
            "phoneNumber": "+15550001111",
            "callSid": "",
            "createdAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(lead.phone_number, "+15550001111");
        assert_eq!(lead.status, "active");
        assert_eq!(lead.created_at, "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_lead_with_answers_serializes_flat() {
        let view = LeadWithAnswers {
            lead: Lead::new("L1".into(), "+15550001111", None),
            responses: vec![],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], "L1");
        assert_eq!(json["phone_number"], "+15550001111");
        assert!(json["responses"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_sort_answers_is_stable() {
        let mk = |id, order| Answer {
            id,
            lead_id: "L".into(),
            question_id: order as i64,
            answer: String::new(),
            confidence: 0.0,
            created_at: String::new(),
            question_text: String::new(),
            question_order: order,
        };
        let mut answers = vec![mk(1, 2), mk(2, 1), mk(3, 2)];
        sort_answers(&mut answers);
        let ids: Vec<i64> = answers.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }
}
