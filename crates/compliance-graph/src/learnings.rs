//! Free-text operator learnings
//!
//! Shares the database with the graph but has no relationship to products,
//! sellers or checks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::query::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::schema::{decode_ts, encode_ts};
use crate::store::GraphStore;

pub const MAX_TEXT_CHARS: usize = 1000;

/// Attempts at drawing an unused id before giving up
const ID_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    pub learning_id: String,
    pub text: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLearning {
    pub text: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

impl NewLearning {
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let chars = self.text.chars().count();
        if chars == 0 || chars > MAX_TEXT_CHARS {
            return Err(GraphError::Validation(format!(
                "text must be 1-{} characters (got {})",
                MAX_TEXT_CHARS, chars
            )));
        }
        if self.category.trim().is_empty() {
            return Err(GraphError::validation("category must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LearningQuery {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl Default for LearningQuery {
    fn default() -> Self {
        Self {
            category: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, FromRow)]
struct LearningRow {
    learning_id: String,
    text: String,
    category: String,
    created_at: String,
}

impl TryFrom<LearningRow> for Learning {
    type Error = GraphError;

    fn try_from(row: LearningRow) -> Result<Self> {
        Ok(Learning {
            created_at: decode_ts(&row.created_at)?,
            learning_id: row.learning_id,
            text: row.text,
            category: row.category,
        })
    }
}

/// `learn-` followed by 8 lowercase hex characters
fn generate_learning_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("learn-{}", &hex[..8])
}

impl GraphStore {
    pub async fn create_learning(&self, new: NewLearning) -> Result<Learning> {
        new.validate()?;
        self.bounded(self.insert_learning(new)).await
    }

    async fn insert_learning(&self, new: NewLearning) -> Result<Learning> {
        let created_at = Utc::now();

        for _ in 0..ID_ATTEMPTS {
            let learning_id = generate_learning_id();
            let inserted = sqlx::query(
                r#"
                INSERT INTO learnings (learning_id, text, category, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(learning_id) DO NOTHING
                "#,
            )
            .bind(&learning_id)
            .bind(&new.text)
            .bind(&new.category)
            .bind(encode_ts(&created_at))
            .execute(self.pool())
            .await?
            .rows_affected();

            if inserted == 1 {
                tracing::info!("Created learning {} ({})", learning_id, new.category);
                // Reload so the timestamp matches its stored precision
                return self.fetch_learning(&learning_id).await;
            }
        }

        Err(GraphError::StoreUnavailable(
            "could not allocate a unique learning id".to_string(),
        ))
    }

    async fn fetch_learning(&self, learning_id: &str) -> Result<Learning> {
        let row: Option<LearningRow> = sqlx::query_as(
            "SELECT learning_id, text, category, created_at FROM learnings WHERE learning_id = ?",
        )
        .bind(learning_id)
        .fetch_optional(self.pool())
        .await?;
        row.ok_or_else(|| GraphError::NotFound {
            kind: "Learning",
            id: learning_id.to_string(),
        })?
        .try_into()
    }

    /// Newest first, optionally restricted to one category
    pub async fn list_learnings(&self, query: &LearningQuery) -> Result<Vec<Learning>> {
        if !(1..=MAX_LIMIT).contains(&query.limit) {
            return Err(GraphError::Validation(format!(
                "limit must be within 1-{} (got {})",
                MAX_LIMIT, query.limit
            )));
        }

        self.bounded(self.select_learnings(query)).await
    }

    async fn select_learnings(&self, query: &LearningQuery) -> Result<Vec<Learning>> {
        let rows: Vec<LearningRow> = sqlx::query_as(
            r#"
            SELECT learning_id, text, category, created_at
            FROM learnings
            WHERE (?1 IS NULL OR category = ?1)
            ORDER BY created_at DESC, seq DESC
            LIMIT ?2
            "#,
        )
        .bind(&query.category)
        .bind(i64::from(query.limit))
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(Learning::try_from).collect()
    }

    pub async fn delete_learning(&self, learning_id: &str) -> Result<()> {
        let deleted = self.bounded(self.remove_learning(learning_id)).await?;

        if deleted == 0 {
            return Err(GraphError::NotFound {
                kind: "Learning",
                id: learning_id.to_string(),
            });
        }

        tracing::info!("Deleted learning {}", learning_id);
        Ok(())
    }

    async fn remove_learning(&self, learning_id: &str) -> Result<u64> {
        let done = sqlx::query("DELETE FROM learnings WHERE learning_id = ?")
            .bind(learning_id)
            .execute(self.pool())
            .await?;
        Ok(done.rows_affected())
    }
}
