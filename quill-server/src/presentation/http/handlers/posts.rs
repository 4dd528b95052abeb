use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::application::blog_service::ListPostsResult;
use crate::application::markdown::render_markdown;
use crate::domain::post::{CreatePostRequest, Post, UpdatePostRequest};
use crate::domain::taxonomy::{TagInput, TagItem, Term};
use crate::presentation::AppState;
use crate::presentation::http::app_error::AppResult;
use crate::presentation::http::middleware::auth::AuthenticatedUser;

const DEFAULT_LIMIT: u32 = 20;

#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct TagItemDto {
    pub(crate) value: String,
}

/// Tags as typed (`"rust, web"`), as the tag picker's JSON posted as a
/// string, or as an array of `{ "value": ... }` objects.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub(crate) enum TagsDto {
    Text(String),
    Items(Vec<TagItemDto>),
}

impl From<TagsDto> for TagInput {
    fn from(dto: TagsDto) -> Self {
        match dto {
            TagsDto::Text(text) => TagInput::Text(text),
            TagsDto::Items(items) => TagInput::Items(
                items
                    .into_iter()
                    .map(|item| TagItem { value: item.value })
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub(crate) struct CreatePostDto {
    #[validate(length(min = 1, max = 100))]
    pub(crate) title: String,
    #[validate(length(min = 1))]
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) tags: Option<TagsDto>,
    /// Comma-separated category names.
    #[serde(default)]
    pub(crate) categories: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub(crate) struct UpdatePostDto {
    #[validate(length(min = 1, max = 100))]
    pub(crate) title: String,
    #[validate(length(min = 1))]
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) tags: Option<TagsDto>,
    #[serde(default)]
    pub(crate) categories: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "pagination_offset_on_page"))]
pub(crate) struct PaginationQuery {
    #[validate(range(min = 1, max = 100))]
    pub(crate) limit: Option<u32>,
    pub(crate) offset: Option<u32>,
}

impl PaginationQuery {
    pub(crate) fn page(&self) -> (u32, u32) {
        page_of(self.limit, self.offset)
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "search_offset_on_page"))]
pub(crate) struct SearchQuery {
    #[serde(default)]
    pub(crate) query: String,
    #[validate(range(min = 1, max = 100))]
    pub(crate) limit: Option<u32>,
    pub(crate) offset: Option<u32>,
}

fn pagination_offset_on_page(query: &PaginationQuery) -> Result<(), ValidationError> {
    offset_on_page(query.limit, query.offset)
}

fn search_offset_on_page(query: &SearchQuery) -> Result<(), ValidationError> {
    offset_on_page(query.limit, query.offset)
}

/// Listings are paged, so an offset has to start a page.
fn offset_on_page(limit: Option<u32>, offset: Option<u32>) -> Result<(), ValidationError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    match offset {
        Some(offset) if limit > 0 && offset % limit != 0 => {
            Err(ValidationError::new("offset_not_on_page")
                .with_message(Cow::Borrowed("offset must be a multiple of limit")))
        }
        _ => Ok(()),
    }
}

/// Maps `limit`/`offset` onto the 1-based page the services work with.
fn page_of(limit: Option<u32>, offset: Option<u32>) -> (u32, u32) {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    let offset = offset.unwrap_or(0);
    ((offset / limit) + 1, limit)
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct TermDto {
    pub(crate) id: i64,
    pub(crate) name: String,
}

impl From<Term> for TermDto {
    fn from(term: Term) -> Self {
        Self {
            id: term.id,
            name: term.name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct PostDto {
    pub(crate) id: i64,
    pub(crate) title: String,
    /// Markdown as written by the author.
    pub(crate) content: String,
    /// Sanitized HTML, safe to embed as is.
    pub(crate) content_html: String,
    pub(crate) author_id: i64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) tags: Vec<TermDto>,
    pub(crate) categories: Vec<TermDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct ListPostsResponseDto {
    pub(crate) posts: Vec<PostDto>,
    pub(crate) limit: u32,
    pub(crate) offset: u32,
    pub(crate) total: i64,
}

impl From<Post> for PostDto {
    fn from(post: Post) -> Self {
        let content_html = render_markdown(&post.content);
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            content_html,
            author_id: post.author_id,
            created_at: post.created_at,
            updated_at: post.updated_at,
            tags: post.tags.into_iter().map(TermDto::from).collect(),
            categories: post.categories.into_iter().map(TermDto::from).collect(),
        }
    }
}

impl From<ListPostsResult> for ListPostsResponseDto {
    fn from(result: ListPostsResult) -> Self {
        let offset = result
            .page
            .saturating_sub(1)
            .saturating_mul(result.page_size);
        Self {
            posts: result.posts.into_iter().map(PostDto::from).collect(),
            limit: result.page_size,
            offset,
            total: result.total,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/posts",
    tag = "posts",
    params(
        ("limit" = Option<u32>, Query, description = "Items per page (1..=100)"),
        ("offset" = Option<u32>, Query, description = "Offset from the beginning; a multiple of limit")
    ),
    responses(
        (status = 200, description = "Posts listed, newest first", body = ListPostsResponseDto),
        (status = 400, description = "Validation error"),
        (status = 500, description = "Internal error")
    )
)]
pub(crate) async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> AppResult<(StatusCode, Json<ListPostsResponseDto>)> {
    query.validate()?;
    let (page, page_size) = query.page();

    let result = state.blog_service.list_posts(page, page_size).await?;

    Ok((StatusCode::OK, Json(ListPostsResponseDto::from(result))))
}

#[utoipa::path(
    get,
    path = "/api/posts/search",
    tag = "posts",
    params(
        ("query" = Option<String>, Query, description = "Substring of title, content, tag or category name; blank lists all"),
        ("limit" = Option<u32>, Query, description = "Items per page (1..=100)"),
        ("offset" = Option<u32>, Query, description = "Offset from the beginning; a multiple of limit")
    ),
    responses(
        (status = 200, description = "Matching posts, newest first", body = ListPostsResponseDto),
        (status = 400, description = "Validation error"),
        (status = 500, description = "Internal error")
    )
)]
pub(crate) async fn search_posts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<(StatusCode, Json<ListPostsResponseDto>)> {
    query.validate()?;
    let (page, page_size) = page_of(query.limit, query.offset);

    let result = state
        .blog_service
        .search_posts(&query.query, page, page_size)
        .await?;

    Ok((StatusCode::OK, Json(ListPostsResponseDto::from(result))))
}

#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    tag = "posts",
    params(
        ("id" = i64, Path, description = "Post id")
    ),
    responses(
        (status = 200, description = "Post found", body = PostDto),
        (status = 404, description = "Post not found"),
        (status = 500, description = "Internal error")
    )
)]
pub(crate) async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<(StatusCode, Json<PostDto>)> {
    let result = state.blog_service.get_post(id).await?;

    Ok((StatusCode::OK, Json(PostDto::from(result))))
}

#[utoipa::path(
    post,
    path = "/api/posts",
    tag = "posts",
    security(
        ("bearer_auth" = [])
    ),
    request_body = CreatePostDto,
    responses(
        (status = 201, description = "Post published, author's draft cleared", body = PostDto),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Concurrent tag or category write"),
        (status = 500, description = "Internal error")
    )
)]
pub(crate) async fn create_post(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(dto): Json<CreatePostDto>,
) -> AppResult<(StatusCode, Json<PostDto>)> {
    dto.validate()?;
    let req = CreatePostRequest {
        title: dto.title,
        content: dto.content,
        tags: dto.tags.map(TagInput::from).unwrap_or_default(),
        categories: dto.categories,
    };

    let result = state.blog_service.create_post(auth.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(PostDto::from(result))))
}

#[utoipa::path(
    put,
    path = "/api/posts/{id}",
    tag = "posts",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i64, Path, description = "Post id")
    ),
    request_body = UpdatePostDto,
    responses(
        (status = 200, description = "Post updated", body = PostDto),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Post not found"),
        (status = 500, description = "Internal error")
    )
)]
pub(crate) async fn update_post(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(dto): Json<UpdatePostDto>,
) -> AppResult<(StatusCode, Json<PostDto>)> {
    dto.validate()?;
    let req = UpdatePostRequest {
        title: dto.title,
        content: dto.content,
        tags: dto.tags.map(TagInput::from).unwrap_or_default(),
        categories: dto.categories,
    };

    let result = state
        .blog_service
        .update_post(auth.user_id, id, req)
        .await?;
    Ok((StatusCode::OK, Json(PostDto::from(result))))
}

#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    tag = "posts",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i64, Path, description = "Post id")
    ),
    responses(
        (status = 204, description = "Post deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Post not found"),
        (status = 500, description = "Internal error")
    )
)]
pub(crate) async fn delete_post(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state.blog_service.delete_post(auth.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
