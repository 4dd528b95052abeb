use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::post::MAX_TITLE_CHARS;
use super::taxonomy::TagInput;

/// The single unsaved post state kept per user. Every field is optional and
/// stored as typed; tags and categories are normalized only on publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Draft {
    pub(crate) user_id: i64,
    pub(crate) title: Option<String>,
    pub(crate) content: Option<String>,
    pub(crate) tags: Option<String>,
    pub(crate) categories: Option<String>,
    pub(crate) updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SaveDraftRequest {
    pub(crate) title: Option<String>,
    pub(crate) content: Option<String>,
    pub(crate) tags: Option<TagInput>,
    pub(crate) categories: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DraftFields {
    pub(crate) title: Option<String>,
    pub(crate) content: Option<String>,
    pub(crate) tags: Option<String>,
    pub(crate) categories: Option<String>,
}

impl SaveDraftRequest {
    pub(crate) fn validate(self) -> Result<DraftFields, DomainError> {
        if let Some(title) = &self.title
            && title.trim().chars().count() > MAX_TITLE_CHARS
        {
            return Err(DomainError::Validation {
                field: "title",
                message: "must be at most 100 chars",
            });
        }

        Ok(DraftFields {
            title: self.title,
            content: self.content,
            tags: self.tags.map(TagInput::into_raw).transpose()?,
            categories: self.categories,
        })
    }
}
