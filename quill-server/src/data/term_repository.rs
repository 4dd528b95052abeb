use async_trait::async_trait;

use crate::domain::error::DomainError;
use crate::domain::taxonomy::{Term, TermKind};

/// Handle to one shared name-keyed entity table (tags or categories),
/// bound to whatever transaction the caller opened.
///
/// `insert` must report a unique-name violation as [`DomainError::Conflict`]
/// so callers can fall back to reading the row another writer created.
#[async_trait]
pub(crate) trait TermTable: Send {
    fn kind(&self) -> TermKind;
    async fn find_by_name(&mut self, name: &str) -> Result<Option<Term>, DomainError>;
    async fn insert(&mut self, name: &str) -> Result<Term, DomainError>;
}
