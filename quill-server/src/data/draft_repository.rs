use async_trait::async_trait;

use crate::domain::draft::{Draft, DraftFields};
use crate::domain::error::DomainError;

#[async_trait]
pub(crate) trait DraftRepository: Send + Sync {
    /// Overwrites the user's single draft in place or creates it.
    async fn upsert_draft(&self, user_id: i64, fields: DraftFields) -> Result<Draft, DomainError>;
    async fn find_draft(&self, user_id: i64) -> Result<Option<Draft>, DomainError>;
    async fn delete_draft(&self, user_id: i64) -> Result<bool, DomainError>;
}
