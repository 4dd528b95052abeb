use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use super::lock_contention;
use crate::data::draft_repository::DraftRepository;
use crate::domain::draft::{Draft, DraftFields};
use crate::domain::error::DomainError;

#[derive(Debug, Clone)]
pub(crate) struct SqliteDraftRepository {
    pool: SqlitePool,
}

impl SqliteDraftRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct DraftRow {
    user_id: i64,
    title: Option<String>,
    content: Option<String>,
    tags: Option<String>,
    categories: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<DraftRow> for Draft {
    fn from(row: DraftRow) -> Self {
        Draft {
            user_id: row.user_id,
            title: row.title,
            content: row.content,
            tags: row.tags,
            categories: row.categories,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl DraftRepository for SqliteDraftRepository {
    async fn upsert_draft(&self, user_id: i64, fields: DraftFields) -> Result<Draft, DomainError> {
        let row = sqlx::query_as::<_, DraftRow>(
            r#"
            INSERT INTO drafts (user_id, title, content, tags, categories, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                tags = excluded.tags,
                categories = excluded.categories,
                updated_at = excluded.updated_at
            RETURNING user_id, title, content, tags, categories, updated_at
            "#,
        )
        .bind(user_id)
        .bind(fields.title)
        .bind(fields.content)
        .bind(fields.tags)
        .bind(fields.categories)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(map_draft_db_error)?;

        Ok(row.into())
    }

    async fn find_draft(&self, user_id: i64) -> Result<Option<Draft>, DomainError> {
        let row = sqlx::query_as::<_, DraftRow>(
            r#"
            SELECT user_id, title, content, tags, categories, updated_at
            FROM drafts
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_draft_db_error)?;

        Ok(row.map(Draft::from))
    }

    async fn delete_draft(&self, user_id: i64) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM drafts WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(map_draft_db_error)?;

        Ok(result.rows_affected() > 0)
    }
}

fn map_draft_db_error(err: sqlx::Error) -> DomainError {
    if let Some(busy) = lock_contention(&err) {
        return busy;
    }
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_foreign_key_violation()
    {
        return DomainError::NotFound("user".to_string());
    }
    DomainError::Unexpected(err.to_string())
}
