use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{info, warn};

use crate::error::PersistenceError;
use crate::identity::Identity;

use super::types::{
    ConfirmedDetail, ConfirmedRecord, ConfirmedSaveRequest, ConfirmedSummary, FeedbackSaveRequest,
    FeedbackSummary,
};

/// Persists feedback submissions and confirmed recipes.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Store the submission that produced a generated recipe. Returns the record id.
    async fn save_feedback(&self, request: &FeedbackSaveRequest) -> Result<String, PersistenceError>;

    /// Store a confirmed recipe for an authenticated user. Returns the record id.
    async fn save_confirmed(
        &self,
        request: &ConfirmedSaveRequest,
        identity: &Identity,
    ) -> Result<String, PersistenceError>;
}

/// SQLite store for feedback history.
/// All operations are synchronous (rusqlite is blocking).
/// Callers in async contexts should go through `SqliteFeedbackStore`.
pub struct FeedbackHistory {
    conn: Connection,
}

impl FeedbackHistory {
    /// Create or open the history database at `db_path`.
    pub fn new(db_path: &Path) -> Result<Self, String> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create data dir: {}", e))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| format!("Failed to open history db: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS feedback_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                result_id TEXT,
                base_recipe_id TEXT NOT NULL,
                base_recipe_name TEXT NOT NULL,
                retention_percentage INTEGER NOT NULL,
                request_json TEXT NOT NULL,
                identity_fingerprint TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| format!("Failed to create feedback table: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS confirmed_recipes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                result_id TEXT,
                base_recipe_name TEXT NOT NULL,
                container_type TEXT NOT NULL,
                origin TEXT NOT NULL,
                record_json TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| format!("Failed to create confirmed table: {}", e))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_feedback_base ON feedback_records(base_recipe_id)",
            [],
        )
        .map_err(|e| format!("Failed to create base recipe index: {}", e))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_confirmed_created ON confirmed_recipes(created_at DESC)",
            [],
        )
        .map_err(|e| format!("Failed to create date index: {}", e))?;

        info!("Opened feedback history database at {:?}", db_path);
        Ok(Self { conn })
    }

    /// Record a feedback submission. Returns the row id.
    pub fn record_feedback(&self, request: &FeedbackSaveRequest) -> Result<i64, String> {
        let request_json = serde_json::to_string(request)
            .map_err(|e| format!("Failed to serialize feedback: {}", e))?;

        self.conn
            .execute(
                "INSERT INTO feedback_records
                    (result_id, base_recipe_id, base_recipe_name, retention_percentage,
                     request_json, identity_fingerprint, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    request.result_id,
                    request.base_recipe_id,
                    request.base_recipe_name,
                    request.retention_percentage,
                    request_json,
                    request.identity_fingerprint,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| format!("Failed to insert feedback: {}", e))?;

        let id = self.conn.last_insert_rowid();
        info!(
            "Recorded feedback {} for base recipe: {}",
            id, request.base_recipe_name
        );
        Ok(id)
    }

    /// Record a confirmed recipe. Returns the row id.
    pub fn record_confirmed(&self, request: &ConfirmedSaveRequest, user_id: &str) -> Result<i64, String> {
        let record_json = serde_json::to_string(&request.record)
            .map_err(|e| format!("Failed to serialize confirmed recipe: {}", e))?;

        self.conn
            .execute(
                "INSERT INTO confirmed_recipes
                    (result_id, base_recipe_name, container_type, origin, record_json, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    request.result_id,
                    request.record.base_recipe_name,
                    request.record.container_type.id(),
                    request.record.origin.as_str(),
                    record_json,
                    user_id,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| format!("Failed to insert confirmed recipe: {}", e))?;

        let id = self.conn.last_insert_rowid();
        info!(
            "Recorded confirmed recipe {} ({} in {})",
            id,
            request.record.base_recipe_name,
            request.record.container_type
        );
        Ok(id)
    }

    /// List feedback submissions for a base recipe, newest first.
    pub fn list_feedback(&self, base_recipe_id: &str) -> Result<Vec<FeedbackSummary>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, base_recipe_name, retention_percentage, created_at
                 FROM feedback_records
                 WHERE base_recipe_id = ?1
                 ORDER BY created_at DESC, id DESC",
            )
            .map_err(|e| format!("Failed to prepare query: {}", e))?;

        let rows = stmt
            .query_map(params![base_recipe_id], |row| {
                Ok(FeedbackSummary {
                    id: row.get(0)?,
                    base_recipe_name: row.get(1)?,
                    retention_percentage: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .map_err(|e| format!("Failed to query feedback: {}", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("Failed to collect feedback: {}", e))
    }

    /// List confirmed recipes, newest first.
    pub fn list_confirmed(&self, limit: usize) -> Result<Vec<ConfirmedSummary>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, base_recipe_name, container_type, origin, user_id, created_at
                 FROM confirmed_recipes
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1",
            )
            .map_err(|e| format!("Failed to prepare query: {}", e))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(ConfirmedSummary {
                    id: row.get(0)?,
                    base_recipe_name: row.get(1)?,
                    container_type: row.get(2)?,
                    origin: row.get(3)?,
                    user_id: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .map_err(|e| format!("Failed to query confirmed recipes: {}", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("Failed to collect confirmed recipes: {}", e))
    }

    /// Get full details of a confirmed recipe.
    pub fn get_confirmed(&self, id: i64) -> Result<ConfirmedDetail, String> {
        let (record_json, result_id, user_id, created_at): (String, Option<String>, String, String) = self
            .conn
            .query_row(
                "SELECT record_json, result_id, user_id, created_at
                 FROM confirmed_recipes WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map_err(|e| format!("Confirmed recipe not found: {}", e))?;

        let record: ConfirmedRecord = serde_json::from_str(&record_json)
            .map_err(|e| format!("Stored recipe {} is corrupt: {}", id, e))?;

        Ok(ConfirmedDetail {
            id,
            record,
            result_id,
            user_id,
            created_at,
        })
    }
}

/// `FeedbackStore` backed by the local SQLite history.
#[derive(Clone)]
pub struct SqliteFeedbackStore {
    history: Arc<Mutex<FeedbackHistory>>,
}

impl SqliteFeedbackStore {
    pub fn open(db_path: &Path) -> Result<Self, PersistenceError> {
        let history = FeedbackHistory::new(db_path).map_err(PersistenceError::Storage)?;
        Ok(Self::new(history))
    }

    pub fn new(history: FeedbackHistory) -> Self {
        Self {
            history: Arc::new(Mutex::new(history)),
        }
    }

    /// Run a blocking history operation off the async runtime.
    async fn with_history<T, F>(&self, op: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&FeedbackHistory) -> Result<T, String> + Send + 'static,
    {
        let history = self.history.clone();
        tokio::task::spawn_blocking(move || {
            let guard = history
                .lock()
                .map_err(|e| format!("History lock poisoned: {}", e))?;
            op(&guard)
        })
        .await
        .map_err(|e| PersistenceError::Storage(format!("History task failed: {}", e)))?
        .map_err(|e| {
            warn!("Feedback history operation failed: {}", e);
            PersistenceError::Storage(e)
        })
    }

    pub async fn list_feedback(&self, base_recipe_id: &str) -> Result<Vec<FeedbackSummary>, PersistenceError> {
        let base_recipe_id = base_recipe_id.to_string();
        self.with_history(move |h| h.list_feedback(&base_recipe_id)).await
    }

    pub async fn list_confirmed(&self, limit: usize) -> Result<Vec<ConfirmedSummary>, PersistenceError> {
        self.with_history(move |h| h.list_confirmed(limit)).await
    }

    pub async fn get_confirmed(&self, id: i64) -> Result<ConfirmedDetail, PersistenceError> {
        self.with_history(move |h| h.get_confirmed(id)).await
    }
}

#[async_trait]
impl FeedbackStore for SqliteFeedbackStore {
    async fn save_feedback(&self, request: &FeedbackSaveRequest) -> Result<String, PersistenceError> {
        let request = request.clone();
        let id = self.with_history(move |h| h.record_feedback(&request)).await?;
        Ok(id.to_string())
    }

    async fn save_confirmed(
        &self,
        request: &ConfirmedSaveRequest,
        identity: &Identity,
    ) -> Result<String, PersistenceError> {
        let request = request.clone();
        let user_id = identity.user_id.clone();
        let id = self
            .with_history(move |h| h.record_confirmed(&request, &user_id))
            .await?;
        Ok(id.to_string())
    }
}
