//! Google Sheets backed lead store.
//!
//! Three tabs hold the data, one row per record:
//!
//! | Sheet       | Columns                                                        |
//! |-------------|----------------------------------------------------------------|
//! | `Leads`     | ID, Phone Number, Name, Call SID, Status, Created At           |
//! | `Responses` | Lead ID, Question ID, Question Text, Answer, Confidence, Created At |
//! | `Questions` | ID, Question Text, Order, Active                               |
//!
//! Missing tabs are created and the question tab seeded during `initialize`.
//! Response identifiers are the sheet row numbers reported by the append call.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::models::{
    Answer, DEFAULT_QUESTIONS, Lead, LeadWithAnswers, Question, STATUS_ACTIVE, UNKNOWN_QUESTION,
    active_in_order, clamp_confidence, normalize_name, sort_answers,
};
use super::{LeadStore, StoreResult};
use crate::config::SheetsConfig;
use crate::errors::StoreError;

pub const BACKEND: &str = "sheets";

const LEADS_SHEET: &str = "Leads";
const RESPONSES_SHEET: &str = "Responses";
const QUESTIONS_SHEET: &str = "Questions";

const LEADS_HEADER: [&str; 6] = ["ID", "Phone Number", "Name", "Call SID", "Status", "Created At"];
const RESPONSES_HEADER: [&str; 6] = [
    "Lead ID",
    "Question ID",
    "Question Text",
    "Answer",
    "Confidence",
    "Created At",
];
const QUESTIONS_HEADER: [&str; 4] = ["ID", "Question Text", "Order", "Active"];

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: Option<AppendUpdates>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    #[serde(default)]
    updated_range: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

pub struct SheetsStore {
    client: reqwest::Client,
    api_base: String,
    sheet_id: String,
    access_token: String,
}

impl SheetsStore {
    pub fn from_config(config: &SheetsConfig) -> StoreResult<Self> {
        let (Some(sheet_id), Some(access_token)) = (&config.sheet_id, &config.access_token) else {
            return Err(StoreError::NotConfigured {
                backend: BACKEND,
                reason: "set GOOGLE_SHEET_ID and GOOGLE_SHEETS_ACCESS_TOKEN".to_string(),
            });
        };
        Ok(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            sheet_id: sheet_id.clone(),
            access_token: access_token.clone(),
        })
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/spreadsheets/{}", self.api_base, self.sheet_id)
    }

    fn values_url(&self, range: &str) -> String {
        format!("{}/values/{}", self.spreadsheet_url(), urlencoding::encode(range))
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> StoreResult<T> {
        let resp = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|source| StoreError::Http {
                backend: BACKEND,
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Backend {
                backend: BACKEND,
                message: format!("status {}: {}", status.as_u16(), body.trim()),
            });
        }
        resp.json::<T>().await.map_err(|source| StoreError::Http {
            backend: BACKEND,
            source,
        })
    }

    async fn get_rows(&self, range: &str) -> StoreResult<Vec<Vec<String>>> {
        let range: ValueRange = self.send(self.client.get(self.values_url(range))).await?;
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    async fn append_row(&self, range: &str, row: Vec<Value>) -> StoreResult<Option<String>> {
        let url = format!("{}:append", self.values_url(range));
        let resp: AppendResponse = self
            .send(
                self.client
                    .post(url)
                    .query(&[("valueInputOption", "RAW")])
                    .json(&json!({ "values": [row] })),
            )
            .await?;
        Ok(resp.updates.and_then(|u| u.updated_range))
    }

    async fn put_rows(&self, range: &str, rows: Vec<Vec<Value>>) -> StoreResult<()> {
        let _: Value = self
            .send(
                self.client
                    .put(self.values_url(range))
                    .query(&[("valueInputOption", "RAW")])
                    .json(&json!({ "values": rows })),
            )
            .await?;
        Ok(())
    }

    async fn ensure_sheets(&self) -> StoreResult<()> {
        let spreadsheet: Spreadsheet = self
            .send(
                self.client
                    .get(self.spreadsheet_url())
                    .query(&[("fields", "sheets.properties.title")]),
            )
            .await?;
        let existing: Vec<String> = spreadsheet
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect();

        let wanted: [(&str, &[&str]); 3] = [
            (LEADS_SHEET, &LEADS_HEADER),
            (RESPONSES_SHEET, &RESPONSES_HEADER),
            (QUESTIONS_SHEET, &QUESTIONS_HEADER),
        ];
        let missing: Vec<(&str, &[&str])> = wanted
            .into_iter()
            .filter(|(title, _)| !existing.iter().any(|e| e == title))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let requests: Vec<Value> = missing
            .iter()
            .map(|(title, _)| json!({ "addSheet": { "properties": { "title": title } } }))
            .collect();
        let _: Value = self
            .send(
                self.client
                    .post(format!("{}:batchUpdate", self.spreadsheet_url()))
                    .json(&json!({ "requests": requests })),
            )
            .await?;

        for (title, header) in &missing {
            let row = header.iter().map(|h| json!(h)).collect();
            self.put_rows(&format!("{}!A1", title), vec![row]).await?;
        }
        let created: Vec<&str> = missing.iter().map(|(t, _)| *t).collect();
        tracing::info!(?created, "Created missing sheets");
        Ok(())
    }

    async fn seed_questions(&self) -> StoreResult<()> {
        let rows = self.get_rows(&format!("{}!A2:D", QUESTIONS_SHEET)).await?;
        if !rows.is_empty() {
            return Ok(());
        }
        let seed: Vec<Vec<Value>> = DEFAULT_QUESTIONS
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let n = (i + 1).to_string();
                vec![json!(n), json!(text), json!(n), json!("TRUE")]
            })
            .collect();
        let range = format!("{}!A2:D{}", QUESTIONS_SHEET, seed.len() + 1);
        self.put_rows(&range, seed).await?;
        tracing::info!("Inserted default questions into sheet");
        Ok(())
    }

    async fn lead_rows(&self) -> StoreResult<Vec<Lead>> {
        let rows = self.get_rows(&format!("{}!A2:F", LEADS_SHEET)).await?;
        Ok(rows.iter().filter_map(|row| lead_from_row(row)).collect())
    }
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn cell(row: &[String], i: usize) -> &str {
    row.get(i).map(String::as_str).unwrap_or("")
}

fn lead_from_row(row: &[String]) -> Option<Lead> {
    let id = cell(row, 0);
    if id.is_empty() {
        return None;
    }
    let optional = |s: &str| (!s.is_empty()).then(|| s.to_string());
    Some(Lead {
        id: id.to_string(),
        phone_number: cell(row, 1).to_string(),
        name: optional(cell(row, 2)),
        call_sid: optional(cell(row, 3)),
        status: optional(cell(row, 4)).unwrap_or_else(|| STATUS_ACTIVE.to_string()),
        created_at: cell(row, 5).to_string(),
    })
}

fn question_from_row(row: &[String]) -> Option<Question> {
    Some(Question {
        id: cell(row, 0).trim().parse().ok()?,
        text: cell(row, 1).to_string(),
        order: cell(row, 2).trim().parse().ok()?,
        active: cell(row, 3).eq_ignore_ascii_case("true"),
    })
}

/// Row number from an A1 range such as `Responses!A5:F5`.
fn row_number(updated_range: &str) -> Option<i64> {
    let cells = updated_range.rsplit('!').next()?;
    let first = cells.split(':').next()?;
    first
        .trim_start_matches(|c: char| c.is_ascii_alphabetic() || c == '$')
        .parse()
        .ok()
}

#[async_trait]
impl LeadStore for SheetsStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn initialize(&self) -> StoreResult<()> {
        self.ensure_sheets().await?;
        self.seed_questions().await
    }

    async fn create_lead(&self, phone_number: &str, name: Option<&str>) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let row = vec![
            json!(id),
            json!(phone_number),
            json!(normalize_name(name).unwrap_or_default()),
            json!(""),
            json!(STATUS_ACTIVE),
            json!(chrono::Utc::now().to_rfc3339()),
        ];
        self.append_row(&format!("{}!A:F", LEADS_SHEET), row).await?;
        tracing::debug!(lead_id = %id, "Lead appended to sheet");
        Ok(id)
    }

    async fn get_questions(&self) -> StoreResult<Vec<Question>> {
        let rows = self.get_rows(&format!("{}!A2:D", QUESTIONS_SHEET)).await?;
        Ok(active_in_order(
            rows.iter().filter_map(|r| question_from_row(r)).collect(),
        ))
    }

    async fn save_response(
        &self,
        lead_id: &str,
        question_id: i64,
        answer: &str,
        confidence: Option<f64>,
    ) -> StoreResult<i64> {
        if !self.lead_rows().await?.iter().any(|l| l.id == lead_id) {
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
        let row = vec![
            json!(lead_id),
            json!(question_id.to_string()),
            json!(question_text),
            json!(answer),
            json!(clamp_confidence(confidence).to_string()),
            json!(chrono::Utc::now().to_rfc3339()),
        ];
        let updated = self
            .append_row(&format!("{}!A:F", RESPONSES_SHEET), row)
            .await?;
        Ok(updated.as_deref().and_then(row_number).unwrap_or(0))
    }

    async fn get_lead_with_responses(&self, lead_id: &str) -> StoreResult<Option<LeadWithAnswers>> {
        let Some(lead) = self.lead_rows().await?.into_iter().find(|l| l.id == lead_id) else {
            return Ok(None);
        };
        let questions = self.get_questions().await?;
        let rows = self
            .get_rows(&format!("{}!A2:F", RESPONSES_SHEET))
            .await?;

        let mut responses: Vec<Answer> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| cell(row, 0) == lead_id)
            .map(|(i, row)| {
                let question_id = cell(row, 1).trim().parse().unwrap_or(0);
                let question = questions.iter().find(|q| q.id == question_id);
                let stored_text = cell(row, 2);
                Answer {
                    id: i as i64 + 2,
                    lead_id: lead_id.to_string(),
                    question_id,
                    answer: cell(row, 3).to_string(),
                    confidence: clamp_confidence(cell(row, 4).trim().parse().ok()),
                    created_at: cell(row, 5).to_string(),
                    question_text: question
                        .map(|q| q.text.clone())
                        .or_else(|| (!stored_text.is_empty()).then(|| stored_text.to_string()))
                        .unwrap_or_else(|| UNKNOWN_QUESTION.to_string()),
                    question_order: question.map(|q| q.order).unwrap_or(0),
                }
            })
            .collect();
        sort_answers(&mut responses);

        Ok(Some(LeadWithAnswers { lead, responses }))
    }

    async fn get_all_leads(&self) -> StoreResult<Vec<Lead>> {
        let mut leads = self.lead_rows().await?;
        leads.reverse();
        Ok(leads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, State},
        routing::{get, post},
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Minimal in-process stand-in for the Sheets v4 values API.
    #[derive(Default)]
    struct FakeSheets {
        tabs: HashMap<String, Vec<Vec<Value>>>,
    }

    type Shared = Arc<Mutex<FakeSheets>>;

    fn tab_of(range: &str) -> String {
        range.split('!').next().unwrap_or("").to_string()
    }

    async fn get_spreadsheet(State(state): State<Shared>) -> Json<Value> {
        let titles: Vec<Value> = state
            .lock()
            .unwrap()
            .tabs
            .keys()
            .map(|t| json!({ "properties": { "title": t } }))
            .collect();
        Json(json!({ "sheets": titles }))
    }

    async fn batch_update(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
        let mut fake = state.lock().unwrap();
        for req in body["requests"].as_array().unwrap() {
            let title = req["addSheet"]["properties"]["title"].as_str().unwrap();
            fake.tabs.insert(title.to_string(), Vec::new());
        }
        Json(json!({}))
    }

    async fn get_values(
        State(state): State<Shared>,
        Path((_id, range)): Path<(String, String)>,
    ) -> Json<Value> {
        let fake = state.lock().unwrap();
        let rows = fake.tabs.get(&tab_of(&range)).cloned().unwrap_or_default();
        // Every range the store reads starts at row 2.
        let data: Vec<Vec<Value>> = rows.into_iter().skip(1).collect();
        if data.is_empty() {
            Json(json!({ "range": range }))
        } else {
            Json(json!({ "range": range, "values": data }))
        }
    }

    async fn write_values(
        State(state): State<Shared>,
        Path((_id, range)): Path<(String, String)>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let mut fake = state.lock().unwrap();
        let rows: Vec<Vec<Value>> = serde_json::from_value(body["values"].clone()).unwrap();
        if let Some(tab_range) = range.strip_suffix(":append") {
            let tab = fake.tabs.entry(tab_of(tab_range)).or_default();
            tab.extend(rows);
            let n = tab.len();
            let updated = format!("{}!A{}:F{}", tab_of(tab_range), n, n);
            Json(json!({ "updates": { "updatedRange": updated } }))
        } else {
            let tab = fake.tabs.entry(tab_of(&range)).or_default();
            if range.ends_with("!A1") {
                tab.insert(0, rows[0].clone());
            } else {
                tab.extend(rows);
            }
            Json(json!({}))
        }
    }

    async fn start_fake() -> Option<(String, Shared)> {
        let state: Shared = Arc::new(Mutex::new(FakeSheets::default()));
        let app = Router::new()
            .route("/spreadsheets/{id}", get(get_spreadsheet))
            .route("/spreadsheets/sheet-1:batchUpdate", post(batch_update))
            .route(
                "/spreadsheets/{id}/values/{range}",
                get(get_values).put(write_values).post(write_values),
            )
            .with_state(state.clone());
        let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Skipping sheets test (sandbox): {:?}", e);
                return None;
            }
        };
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Some((format!("http://{}", addr), state))
    }

    fn store_for(base: &str) -> SheetsStore {
        SheetsStore::from_config(&SheetsConfig {
            sheet_id: Some("sheet-1".into()),
            access_token: Some("token".into()),
            api_base: base.to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let err = SheetsStore::from_config(&SheetsConfig::default())
            .err()
            .expect("should fail");
        assert!(err.is_not_configured());
    }

    #[test]
    fn test_row_number_parsing() {
        assert_eq!(row_number("Responses!A5:F5"), Some(5));
        assert_eq!(row_number("'Responses'!$A$12:$F$12"), Some(12));
        assert_eq!(row_number("garbage"), None);
    }

    #[test]
    fn test_question_from_row() {
        let row: Vec<String> = vec!["3".into(), "Company?".into(), "3".into(), "TRUE".into()];
        let q = question_from_row(&row).unwrap();
        assert_eq!(q.id, 3);
        assert!(q.active);
        let bad: Vec<String> = vec!["x".into(), "Company?".into()];
        assert!(question_from_row(&bad).is_none());
    }

    #[tokio::test]
    async fn test_initialize_creates_tabs_and_seeds_questions() {
        let Some((base, state)) = start_fake().await else { return };
        let store = store_for(&base);
        store.initialize().await.unwrap();
        {
            let fake = state.lock().unwrap();
            assert!(fake.tabs.contains_key(LEADS_SHEET));
            assert!(fake.tabs.contains_key(RESPONSES_SHEET));
            assert_eq!(fake.tabs[QUESTIONS_SHEET].len(), 9);
        }
        let questions = store.get_questions().await.unwrap();
        assert_eq!(questions.len(), 8);
        assert_eq!(questions[1].text, "What is your email address?");

        // Second initialize must not reseed.
        store.initialize().await.unwrap();
        assert_eq!(state.lock().unwrap().tabs[QUESTIONS_SHEET].len(), 9);
    }

    #[tokio::test]
    async fn test_lead_and_answers_round_trip() {
        let Some((base, _state)) = start_fake().await else { return };
        let store = store_for(&base);
        store.initialize().await.unwrap();

        let first = store.create_lead("+14155552671", Some("Jane")).await.unwrap();
        let second = store.create_lead("+14155552672", None).await.unwrap();
        let row = store.save_response(&first, 2, "jane@acme.test", Some(0.8)).await.unwrap();
        assert_eq!(row, 2);
        store.save_response(&first, 1, "Jane", None).await.unwrap();

        let lead = store.get_lead_with_responses(&first).await.unwrap().unwrap();
        assert_eq!(lead.lead.name.as_deref(), Some("Jane"));
        let ids: Vec<i64> = lead.responses.iter().map(|a| a.question_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(lead.responses[1].confidence, 0.8);

        let leads = store.get_all_leads().await.unwrap();
        assert_eq!(leads[0].id, second);
        assert!(store.get_lead_with_responses("ghost").await.unwrap().is_none());
        let err = store.save_response("ghost", 1, "x", None).await.unwrap_err();
        assert!(matches!(err, StoreError::LeadNotFound { .. }));
    }
}
