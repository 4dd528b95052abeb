use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Transaction};

use super::lock_contention;
use super::term_table::{SqliteTermTable, TermRow, term_sql};
use crate::data::post_repository::{
    NewPost, Pagination, PostFilter, PostPatch, PostRepository, PostTransaction,
};
use crate::data::term_repository::TermTable;
use crate::domain::error::DomainError;
use crate::domain::post::Post;
use crate::domain::taxonomy::{Term, TermKind};

#[derive(Debug, Clone)]
pub(crate) struct SqlitePostRepository {
    pool: SqlitePool,
}

impl SqlitePostRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_terms(&self, post_id: i64, kind: TermKind) -> Result<Vec<Term>, DomainError> {
        let rows = sqlx::query_as::<_, TermRow>(term_sql(kind).select_for_post)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_post_db_error)?;

        Ok(rows.into_iter().map(Term::from).collect())
    }

    async fn hydrate(&self, row: PostRow) -> Result<Post, DomainError> {
        let tags = self.load_terms(row.id, TermKind::Tag).await?;
        let categories = self.load_terms(row.id, TermKind::Category).await?;
        Ok(map_row_to_post(row)?.with_terms(tags, categories))
    }
}

#[derive(Debug, FromRow)]
struct PostRow {
    id: i64,
    title: String,
    content: String,
    author_id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const SELECT_POSTS: &str = r#"
    SELECT p.id, p.title, p.content, p.author_id, p.created_at, p.updated_at
    FROM posts p
"#;

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &PostFilter) {
    match filter {
        PostFilter::All => {}
        PostFilter::Search(query) => {
            let pattern = like_pattern(query);
            builder
                .push(" WHERE p.title LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\' OR p.content LIKE ")
                .push_bind(pattern.clone())
                .push(
                    " ESCAPE '\\' OR EXISTS (SELECT 1 FROM post_tags pt \
                     JOIN tags t ON t.id = pt.tag_id \
                     WHERE pt.post_id = p.id AND t.name LIKE ",
                )
                .push_bind(pattern.clone())
                .push(
                    " ESCAPE '\\') OR EXISTS (SELECT 1 FROM post_categories pc \
                     JOIN categories c ON c.id = pc.category_id \
                     WHERE pc.post_id = p.id AND c.name LIKE ",
                )
                .push_bind(pattern)
                .push(" ESCAPE '\\')");
        }
        PostFilter::Category(category_id) => {
            builder
                .push(
                    " WHERE EXISTS (SELECT 1 FROM post_categories pc \
                     WHERE pc.post_id = p.id AND pc.category_id = ",
                )
                .push_bind(*category_id)
                .push(")");
        }
    }
}

// SQLite LIKE is case-insensitive for ASCII; wildcards in the query are literal.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    type Tx = SqlitePostTransaction;

    async fn begin(&self) -> Result<Self::Tx, DomainError> {
        // Take the write lock up front; a deferred transaction that reads
        // terms first cannot upgrade while another writer holds it.
        let tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(map_post_db_error)?;
        Ok(SqlitePostTransaction { tx })
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, DomainError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, title, content, author_id, created_at, updated_at
            FROM posts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_post_db_error)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        pagination: Pagination,
    ) -> Result<Vec<Post>, DomainError> {
        let limit = pagination.page_size as i64;
        let offset = (pagination.page.saturating_sub(1) as i64) * limit;

        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_POSTS);
        push_filter(&mut builder, filter);
        builder
            .push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = builder
            .build_query_as::<PostRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_post_db_error)?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            posts.push(self.hydrate(row).await?);
        }
        Ok(posts)
    }

    async fn count_posts(&self, filter: &PostFilter) -> Result<i64, DomainError> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM posts p");
        push_filter(&mut builder, filter);

        builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(map_post_db_error)
    }

    async fn list_categories(&self) -> Result<Vec<Term>, DomainError> {
        let rows = sqlx::query_as::<_, TermRow>(term_sql(TermKind::Category).select_all)
            .fetch_all(&self.pool)
            .await
            .map_err(map_post_db_error)?;

        Ok(rows.into_iter().map(Term::from).collect())
    }

    async fn get_category(&self, id: i64) -> Result<Option<Term>, DomainError> {
        let row = sqlx::query_as::<_, TermRow>(term_sql(TermKind::Category).select_by_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_post_db_error)?;

        Ok(row.map(Term::from))
    }
}

pub(crate) struct SqlitePostTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl PostTransaction for SqlitePostTransaction {
    fn terms(&mut self, kind: TermKind) -> Box<dyn TermTable + '_> {
        Box::new(SqliteTermTable::new(&mut *self.tx, kind))
    }

    async fn insert_post(&mut self, input: NewPost) -> Result<i64, DomainError> {
        let now = Utc::now();
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO posts (title, content, author_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(input.title)
        .bind(input.content)
        .bind(input.author_id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_post_db_error)
    }

    async fn update_post(&mut self, post_id: i64, patch: PostPatch) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET title = ?,
                content = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(patch.title)
        .bind(patch.content)
        .bind(Utc::now())
        .bind(post_id)
        .execute(&mut *self.tx)
        .await
        .map_err(map_post_db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_post(&mut self, post_id: i64) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_post_db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_post_terms(
        &mut self,
        post_id: i64,
        kind: TermKind,
        terms: &[Term],
    ) -> Result<(), DomainError> {
        let sql = term_sql(kind);
        sqlx::query(sql.delete_links)
            .bind(post_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_post_db_error)?;

        for (position, term) in terms.iter().enumerate() {
            sqlx::query(sql.insert_link)
                .bind(post_id)
                .bind(term.id)
                .bind(position as i64)
                .execute(&mut *self.tx)
                .await
                .map_err(map_post_db_error)?;
        }
        Ok(())
    }

    async fn delete_draft(&mut self, user_id: i64) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM drafts WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_post_db_error)?;
        Ok(())
    }

    async fn commit(self) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(map_post_db_error)
    }
}

fn map_row_to_post(row: PostRow) -> Result<Post, DomainError> {
    Post::new(
        row.id,
        row.title,
        row.content,
        row.author_id,
        row.created_at,
        row.updated_at,
    )
    .map_err(|err| DomainError::Unexpected(err.to_string()))
}

fn map_post_db_error(err: sqlx::Error) -> DomainError {
    if let Some(busy) = lock_contention(&err) {
        return busy;
    }
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_foreign_key_violation()
    {
        return DomainError::NotFound("author".to_string());
    }
    DomainError::Unexpected(err.to_string())
}
