use tracing::info;

use crate::data::draft_repository::DraftRepository;
use crate::domain::draft::{Draft, SaveDraftRequest};
use crate::domain::error::DomainError;

/// Single-slot autosave buffer per user. Saves are last-write-wins.
pub(crate) struct DraftService<R: DraftRepository> {
    repo: R,
}

impl<R: DraftRepository> DraftService<R> {
    pub(crate) fn new(repo: R) -> Self {
        Self { repo }
    }

    pub(crate) async fn save_draft(
        &self,
        user_id: i64,
        req: SaveDraftRequest,
    ) -> Result<Draft, DomainError> {
        let fields = req.validate()?;
        self.repo.upsert_draft(user_id, fields).await
    }

    pub(crate) async fn load_draft(&self, user_id: i64) -> Result<Option<Draft>, DomainError> {
        self.repo.find_draft(user_id).await
    }

    /// Discards the draft. Clearing when nothing is stored is not an error.
    pub(crate) async fn clear_draft(&self, user_id: i64) -> Result<(), DomainError> {
        if self.repo.delete_draft(user_id).await? {
            info!(user_id, "draft discarded");
        }
        Ok(())
    }
}
