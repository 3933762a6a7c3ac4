use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::models::{
    Answer, DEFAULT_QUESTIONS, Lead, LeadWithAnswers, Question, STATUS_ACTIVE, clamp_confidence,
    normalize_name,
};
use super::{LeadStore, StoreResult};
use crate::errors::StoreError;

pub const BACKEND: &str = "sqlite";

/// Async-safe handle to the lead database.
///
/// Wraps `LeadDb` behind `Arc<Mutex>` and runs all access on tokio's blocking
/// thread pool via `spawn_blocking`, so synchronous SQLite I/O never ties up
/// async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<LeadDb>>,
}

impl DbHandle {
    pub fn new(db: LeadDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&LeadDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct LeadDb {
    conn: Connection,
}

impl LeadDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        self.seed_questions().context("Failed to seed default questions")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS leads (
                    id TEXT PRIMARY KEY,
                    phone_number TEXT NOT NULL,
                    name TEXT,
                    call_sid TEXT,
                    status TEXT NOT NULL DEFAULT 'active',
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    question_text TEXT NOT NULL,
                    question_order INTEGER NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS responses (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    lead_id TEXT NOT NULL REFERENCES leads(id),
                    question_id INTEGER NOT NULL REFERENCES questions(id),
                    answer TEXT,
                    confidence REAL,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE INDEX IF NOT EXISTS idx_responses_lead ON responses(lead_id);
                CREATE INDEX IF NOT EXISTS idx_questions_order ON questions(is_active, question_order);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    fn seed_questions(&self) -> Result<()> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))
            .context("Failed to count questions")?;
        if count > 0 {
            return Ok(());
        }
        for (i, text) in DEFAULT_QUESTIONS.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT INTO questions (question_text, question_order) VALUES (?1, ?2)",
                    params![text, i as i32 + 1],
                )
                .context("Failed to insert default question")?;
        }
        tracing::info!(count = DEFAULT_QUESTIONS.len(), "Seeded default questions");
        Ok(())
    }

    // ── Leads ─────────────────────────────────────────────────────────

    pub fn create_lead(&self, phone_number: &str, name: Option<&str>) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO leads (id, phone_number, name, status) VALUES (?1, ?2, ?3, ?4)",
                params![id, phone_number, normalize_name(name), STATUS_ACTIVE],
            )
            .context("Failed to insert lead")?;
        Ok(id)
    }

    pub fn get_lead(&self, id: &str) -> Result<Option<Lead>> {
        self.conn
            .query_row(
                "SELECT id, phone_number, name, call_sid, status, created_at FROM leads WHERE id = ?1",
                params![id],
                read_lead,
            )
            .optional()
            .context("Failed to query lead")
    }

    pub fn list_leads(&self) -> Result<Vec<Lead>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, phone_number, name, call_sid, status, created_at
                 FROM leads ORDER BY created_at DESC, rowid DESC",
            )
            .context("Failed to prepare list_leads")?;
        let rows = stmt
            .query_map([], read_lead)
            .context("Failed to query leads")?;
        let mut leads = Vec::new();
        for row in rows {
            leads.push(row.context("Failed to read lead row")?);
        }
        Ok(leads)
    }

    // ── Questions ─────────────────────────────────────────────────────

    pub fn active_questions(&self) -> Result<Vec<Question>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, question_text, question_order, is_active FROM questions
                 WHERE is_active = 1 ORDER BY question_order, id",
            )
            .context("Failed to prepare active_questions")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Question {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    order: row.get(2)?,
                    active: row.get::<_, i64>(3)? != 0,
                })
            })
            .context("Failed to query questions")?;
        let mut questions = Vec::new();
        for row in rows {
            questions.push(row.context("Failed to read question row")?);
        }
        Ok(questions)
    }

    #[cfg(test)]
    pub fn set_question_active(&self, id: i64, active: bool) -> Result<()> {
        self.conn
            .execute(
                "UPDATE questions SET is_active = ?1 WHERE id = ?2",
                params![active as i64, id],
            )
            .context("Failed to update question")?;
        Ok(())
    }

    // ── Responses ─────────────────────────────────────────────────────

    pub fn insert_response(
        &self,
        lead_id: &str,
        question_id: i64,
        answer: &str,
        confidence: f64,
    ) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO responses (lead_id, question_id, answer, confidence) VALUES (?1, ?2, ?3, ?4)",
                params![lead_id, question_id, answer, confidence],
            )
            .context("Failed to insert response")?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn responses_for_lead(&self, lead_id: &str) -> Result<Vec<Answer>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT r.id, r.lead_id, r.question_id, r.answer, r.confidence, r.created_at,
                        q.question_text, q.question_order
                 FROM responses r
                 JOIN questions q ON r.question_id = q.id
                 WHERE r.lead_id = ?1
                 ORDER BY q.question_order, r.id",
            )
            .context("Failed to prepare responses_for_lead")?;
        let rows = stmt
            .query_map(params![lead_id], |row| {
                Ok(Answer {
                    id: row.get(0)?,
                    lead_id: row.get(1)?,
                    question_id: row.get(2)?,
                    answer: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    confidence: row.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                    created_at: row.get(5)?,
                    question_text: row.get(6)?,
                    question_order: row.get(7)?,
                })
            })
            .context("Failed to query responses")?;
        let mut answers = Vec::new();
        for row in rows {
            answers.push(row.context("Failed to read response row")?);
        }
        Ok(answers)
    }
}

fn read_lead(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        name: row.get(2)?,
        call_sid: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// `LeadStore` over a SQLite file.
pub struct SqliteStore {
    db: DbHandle,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            db: DbHandle::new(LeadDb::new(path)?),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            db: DbHandle::new(LeadDb::new_in_memory()?),
        })
    }

    #[cfg(test)]
    pub fn handle(&self) -> &DbHandle {
        &self.db
    }
}

#[async_trait]
impl LeadStore for SqliteStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn initialize(&self) -> StoreResult<()> {
        // Migrations ran on open; a cheap query proves the file is still usable.
        self.db
            .call(|db| db.active_questions().map(|_| ()))
            .await
            .map_err(StoreError::Database)
    }

    async fn create_lead(&self, phone_number: &str, name: Option<&str>) -> StoreResult<String> {
        let phone_number = phone_number.to_string();
        let name = name.map(str::to_string);
        self.db
            .call(move |db| db.create_lead(&phone_number, name.as_deref()))
            .await
            .map_err(StoreError::Database)
    }

    async fn get_questions(&self) -> StoreResult<Vec<Question>> {
        self.db
            .call(|db| db.active_questions())
            .await
            .map_err(StoreError::Database)
    }

    async fn save_response(
        &self,
        lead_id: &str,
        question_id: i64,
        answer: &str,
        confidence: Option<f64>,
    ) -> StoreResult<i64> {
        let lead_id = lead_id.to_string();
        let answer = answer.to_string();
        let confidence = clamp_confidence(confidence);
        let outcome = self
            .db
            .call(move |db| {
                if db.get_lead(&lead_id)?.is_none() {
                    return Ok(Err(lead_id));
                }
                Ok(Ok(db.insert_response(&lead_id, question_id, &answer, confidence)?))
            })
            .await
            .map_err(StoreError::Database)?;
        outcome.map_err(|id| StoreError::LeadNotFound { id })
    }

    async fn get_lead_with_responses(&self, lead_id: &str) -> StoreResult<Option<LeadWithAnswers>> {
        let lead_id = lead_id.to_string();
        self.db
            .call(move |db| {
                let Some(lead) = db.get_lead(&lead_id)? else {
                    return Ok(None);
                };
                let responses = db.responses_for_lead(&lead_id)?;
                Ok(Some(LeadWithAnswers { lead, responses }))
            })
            .await
            .map_err(StoreError::Database)
    }

    async fn get_all_leads(&self) -> StoreResult<Vec<Lead>> {
        self.db
            .call(|db| db.list_leads())
            .await
            .map_err(StoreError::Database)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
