use async_trait::async_trait;

use crate::data::term_repository::TermTable;
use crate::domain::error::DomainError;
use crate::domain::post::Post;
use crate::domain::taxonomy::{Term, TermKind};

#[derive(Debug, Clone)]
pub(crate) struct NewPost {
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) author_id: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct PostPatch {
    pub(crate) title: String,
    pub(crate) content: String,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Pagination {
    pub(crate) page: u32,
    pub(crate) page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PostFilter {
    All,
    /// Case-insensitive substring over title, content, tag and category names.
    Search(String),
    Category(i64),
}

#[async_trait]
pub(crate) trait PostRepository: Send + Sync {
    type Tx: PostTransaction;

    async fn begin(&self) -> Result<Self::Tx, DomainError>;
    async fn get_post(&self, id: i64) -> Result<Option<Post>, DomainError>;
    async fn list_posts(
        &self,
        filter: &PostFilter,
        pagination: Pagination,
    ) -> Result<Vec<Post>, DomainError>;
    async fn count_posts(&self, filter: &PostFilter) -> Result<i64, DomainError>;
    async fn list_categories(&self) -> Result<Vec<Term>, DomainError>;
    async fn get_category(&self, id: i64) -> Result<Option<Term>, DomainError>;
}

/// One write transaction. Dropping it without `commit` rolls everything back,
/// including tags and categories created through [`PostTransaction::terms`].
#[async_trait]
pub(crate) trait PostTransaction: Send {
    fn terms(&mut self, kind: TermKind) -> Box<dyn TermTable + '_>;
    async fn insert_post(&mut self, input: NewPost) -> Result<i64, DomainError>;
    async fn update_post(&mut self, post_id: i64, patch: PostPatch) -> Result<bool, DomainError>;
    async fn delete_post(&mut self, post_id: i64) -> Result<bool, DomainError>;
    /// Replaces the post's links of `kind`, keeping the order of `terms`.
    async fn set_post_terms(
        &mut self,
        post_id: i64,
        kind: TermKind,
        terms: &[Term],
    ) -> Result<(), DomainError>;
    async fn delete_draft(&mut self, user_id: i64) -> Result<(), DomainError>;
    async fn commit(self) -> Result<(), DomainError>;
}
