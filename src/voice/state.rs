//! Call state carried in webhook URLs.
//!
//! The provider keeps no session for us, so `(leadId, questionIndex, name, attempt)` travels
//! in the query string of every callback. This is the only type that reads or writes those
//! parameters.

use std::collections::HashMap;

pub const ENTRY_PATH: &str = "/voice";
pub const QUESTION_PATH: &str = "/voice/question";
pub const ANSWER_PATH: &str = "/voice/handle-answer";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallState {
    pub lead_id: Option<String>,
    pub question_index: usize,
    pub name: Option<String>,
    pub attempt: u32,
}

impl CallState {
    pub fn new(lead_id: impl Into<String>) -> Self {
        Self {
            lead_id: Some(lead_id.into()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: Option<&str>) -> Self {
        self.name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        self
    }

    /// Lenient parse: bad or missing numbers read as 0, empty strings as absent.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let text = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let number = |key: &str| params.get(key).and_then(|v| leading_digits(v));
        Self {
            lead_id: text("leadId"),
            question_index: number("questionIndex").unwrap_or(0) as usize,
            name: text("name"),
            attempt: number("attempt").unwrap_or(0).min(u32::MAX as u64) as u32,
        }
    }

    /// Same lead at another question, retry counter reset.
    pub fn at(&self, question_index: usize) -> Self {
        Self {
            lead_id: self.lead_id.clone(),
            question_index,
            name: None,
            attempt: 0,
        }
    }

    pub fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1),
            ..self.at(self.question_index)
        }
    }

    fn lead_param(&self) -> String {
        format!(
            "leadId={}",
            urlencoding::encode(self.lead_id.as_deref().unwrap_or(""))
        )
    }

    fn step_query(&self) -> String {
        let mut query = format!("{}&questionIndex={}", self.lead_param(), self.question_index);
        if self.attempt > 0 {
            query.push_str(&format!("&attempt={}", self.attempt));
        }
        query
    }

    /// Absolute entry webhook URL handed to the provider when placing the call.
    pub fn entry_url(&self, base_url: &str) -> String {
        let mut url = format!(
            "{}{}?{}",
            base_url.trim_end_matches('/'),
            ENTRY_PATH,
            self.lead_param()
        );
        if let Some(name) = &self.name {
            url.push_str(&format!("&name={}", urlencoding::encode(name)));
        }
        url
    }

    pub fn question_path(&self) -> String {
        format!("{}?{}", QUESTION_PATH, self.step_query())
    }

    pub fn answer_path(&self) -> String {
        format!("{}?{}", ANSWER_PATH, self.step_query())
    }
}

/// Integer prefix of a string, like a permissive `parseInt`.
fn leading_digits(raw: &str) -> Option<u64> {
    let digits: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
