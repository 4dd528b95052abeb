use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::domain::draft::{Draft, SaveDraftRequest};
use crate::domain::taxonomy::TagInput;
use crate::presentation::AppState;
use crate::presentation::http::app_error::{AppError, AppResult};
use crate::presentation::http::handlers::posts::TagsDto;
use crate::presentation::http::middleware::auth::AuthenticatedUser;

/// Autosave payload. Every field is optional; missing fields are stored
/// empty, not merged with the previous save.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub(crate) struct SaveDraftDto {
    #[validate(length(max = 100))]
    pub(crate) title: Option<String>,
    pub(crate) content: Option<String>,
    pub(crate) tags: Option<TagsDto>,
    pub(crate) categories: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct DraftDto {
    pub(crate) title: Option<String>,
    pub(crate) content: Option<String>,
    /// Raw tag text, re-parsed when the post is published.
    pub(crate) tags: Option<String>,
    pub(crate) categories: Option<String>,
    pub(crate) updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct DraftSavedDto {
    pub(crate) updated_at: DateTime<Utc>,
}

impl From<Draft> for DraftDto {
    fn from(draft: Draft) -> Self {
        Self {
            title: draft.title,
            content: draft.content,
            tags: draft.tags,
            categories: draft.categories,
            updated_at: draft.updated_at,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/drafts",
    tag = "drafts",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Current draft", body = DraftDto),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No draft saved"),
        (status = 500, description = "Internal error")
    )
)]
pub(crate) async fn load_draft(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> AppResult<(StatusCode, Json<DraftDto>)> {
    let draft = state
        .draft_service
        .load_draft(auth.user_id)
        .await?
        .ok_or(AppError::NotFound("draft"))?;

    Ok((StatusCode::OK, Json(DraftDto::from(draft))))
}

#[utoipa::path(
    put,
    path = "/api/drafts",
    tag = "drafts",
    security(
        ("bearer_auth" = [])
    ),
    request_body = SaveDraftDto,
    responses(
        (status = 200, description = "Draft saved", body = DraftSavedDto),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal error")
    )
)]
pub(crate) async fn save_draft(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(dto): Json<SaveDraftDto>,
) -> AppResult<(StatusCode, Json<DraftSavedDto>)> {
    dto.validate()?;
    let req = SaveDraftRequest {
        title: dto.title,
        content: dto.content,
        tags: dto.tags.map(TagInput::from),
        categories: dto.categories,
    };

    let draft = state.draft_service.save_draft(auth.user_id, req).await?;
    Ok((
        StatusCode::OK,
        Json(DraftSavedDto {
            updated_at: draft.updated_at,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/api/drafts",
    tag = "drafts",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 204, description = "Draft discarded"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal error")
    )
)]
pub(crate) async fn clear_draft(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> AppResult<StatusCode> {
    state.draft_service.clear_draft(auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
