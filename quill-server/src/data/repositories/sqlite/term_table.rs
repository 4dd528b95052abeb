use async_trait::async_trait;
use sqlx::{FromRow, SqliteConnection};

use super::lock_contention;
use crate::data::term_repository::TermTable;
use crate::domain::error::DomainError;
use crate::domain::taxonomy::{Term, TermKind};

#[derive(Debug, FromRow)]
pub(super) struct TermRow {
    pub(super) id: i64,
    pub(super) name: String,
}

impl From<TermRow> for Term {
    fn from(row: TermRow) -> Self {
        Term {
            id: row.id,
            name: row.name,
        }
    }
}

/// Static statements for one term table and its post link table.
pub(super) struct TermSql {
    pub(super) select_by_name: &'static str,
    pub(super) select_by_id: &'static str,
    pub(super) select_all: &'static str,
    pub(super) insert: &'static str,
    pub(super) select_for_post: &'static str,
    pub(super) delete_links: &'static str,
    pub(super) insert_link: &'static str,
}

const TAG_SQL: TermSql = TermSql {
    select_by_name: "SELECT id, name FROM tags WHERE name = ?",
    select_by_id: "SELECT id, name FROM tags WHERE id = ?",
    select_all: "SELECT id, name FROM tags ORDER BY name",
    insert: "INSERT INTO tags (name) VALUES (?) RETURNING id, name",
    select_for_post: r#"
        SELECT t.id, t.name
        FROM post_tags pt
        JOIN tags t ON t.id = pt.tag_id
        WHERE pt.post_id = ?
        ORDER BY pt.position
    "#,
    delete_links: "DELETE FROM post_tags WHERE post_id = ?",
    insert_link: "INSERT INTO post_tags (post_id, tag_id, position) VALUES (?, ?, ?)",
};

const CATEGORY_SQL: TermSql = TermSql {
    select_by_name: "SELECT id, name FROM categories WHERE name = ?",
    select_by_id: "SELECT id, name FROM categories WHERE id = ?",
    select_all: "SELECT id, name FROM categories ORDER BY name",
    insert: "INSERT INTO categories (name) VALUES (?) RETURNING id, name",
    select_for_post: r#"
        SELECT c.id, c.name
        FROM post_categories pc
        JOIN categories c ON c.id = pc.category_id
        WHERE pc.post_id = ?
        ORDER BY pc.position
    "#,
    delete_links: "DELETE FROM post_categories WHERE post_id = ?",
    insert_link: "INSERT INTO post_categories (post_id, category_id, position) VALUES (?, ?, ?)",
};

pub(super) fn term_sql(kind: TermKind) -> &'static TermSql {
    match kind {
        TermKind::Tag => &TAG_SQL,
        TermKind::Category => &CATEGORY_SQL,
    }
}

/// Tag or category table seen through an open connection, usually the
/// connection of a post write transaction.
pub(crate) struct SqliteTermTable<'c> {
    conn: &'c mut SqliteConnection,
    kind: TermKind,
}

impl<'c> SqliteTermTable<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection, kind: TermKind) -> Self {
        Self { conn, kind }
    }
}

#[async_trait]
impl<'c> TermTable for SqliteTermTable<'c> {
    fn kind(&self) -> TermKind {
        self.kind
    }

    async fn find_by_name(&mut self, name: &str) -> Result<Option<Term>, DomainError> {
        let row = sqlx::query_as::<_, TermRow>(term_sql(self.kind).select_by_name)
            .bind(name)
            .fetch_optional(&mut *self.conn)
            .await
            .map_err(|err| map_term_db_error(self.kind, name, err))?;

        Ok(row.map(Term::from))
    }

    async fn insert(&mut self, name: &str) -> Result<Term, DomainError> {
        let row = sqlx::query_as::<_, TermRow>(term_sql(self.kind).insert)
            .bind(name)
            .fetch_one(&mut *self.conn)
            .await
            .map_err(|err| map_term_db_error(self.kind, name, err))?;

        Ok(row.into())
    }
}

fn map_term_db_error(kind: TermKind, name: &str, err: sqlx::Error) -> DomainError {
    if let Some(busy) = lock_contention(&err) {
        return busy;
    }
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        return DomainError::Conflict(format!("{} name '{name}'", kind.field()));
    }
    DomainError::Unexpected(err.to_string())
}
