use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::presentation::AppState;
use crate::presentation::http::app_error::AppResult;
use crate::presentation::http::handlers::posts::{
    ListPostsResponseDto, PaginationQuery, TermDto,
};

#[derive(Debug, Serialize, ToSchema)]
pub(crate) struct CategoryPostsResponseDto {
    pub(crate) category: TermDto,
    #[serde(flatten)]
    pub(crate) listing: ListPostsResponseDto,
}

#[utoipa::path(
    get,
    path = "/api/categories",
    tag = "categories",
    responses(
        (status = 200, description = "All categories ordered by name", body = [TermDto]),
        (status = 500, description = "Internal error")
    )
)]
pub(crate) async fn list_categories(
    State(state): State<AppState>,
) -> AppResult<(StatusCode, Json<Vec<TermDto>>)> {
    let categories = state.blog_service.list_categories().await?;

    Ok((
        StatusCode::OK,
        Json(categories.into_iter().map(TermDto::from).collect()),
    ))
}

#[utoipa::path(
    get,
    path = "/api/categories/{id}/posts",
    tag = "categories",
    params(
        ("id" = i64, Path, description = "Category id"),
        ("limit" = Option<u32>, Query, description = "Items per page (1..=100)"),
        ("offset" = Option<u32>, Query, description = "Offset from the beginning; a multiple of limit")
    ),
    responses(
        (status = 200, description = "Posts in the category, newest first", body = CategoryPostsResponseDto),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Category not found"),
        (status = 500, description = "Internal error")
    )
)]
pub(crate) async fn list_category_posts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<PaginationQuery>,
) -> AppResult<(StatusCode, Json<CategoryPostsResponseDto>)> {
    query.validate()?;
    let (page, page_size) = query.page();

    let (category, result) = state
        .blog_service
        .list_posts_by_category(id, page, page_size)
        .await?;

    Ok((
        StatusCode::OK,
        Json(CategoryPostsResponseDto {
            category: category.into(),
            listing: result.into(),
        }),
    ))
}
