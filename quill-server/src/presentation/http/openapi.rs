use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::presentation::http::handlers::auth::{AuthResponseDto, LoginDto, UserDto};
use crate::presentation::http::handlers::categories::CategoryPostsResponseDto;
use crate::presentation::http::handlers::drafts::{DraftDto, DraftSavedDto, SaveDraftDto};
use crate::presentation::http::handlers::posts::{
    CreatePostDto, ListPostsResponseDto, PaginationQuery, PostDto, SearchQuery, TagItemDto,
    TagsDto, TermDto, UpdatePostDto,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::presentation::http::handlers::auth::login,
        crate::presentation::http::handlers::posts::list_posts,
        crate::presentation::http::handlers::posts::search_posts,
        crate::presentation::http::handlers::posts::get_post,
        crate::presentation::http::handlers::posts::create_post,
        crate::presentation::http::handlers::posts::update_post,
        crate::presentation::http::handlers::posts::delete_post,
        crate::presentation::http::handlers::categories::list_categories,
        crate::presentation::http::handlers::categories::list_category_posts,
        crate::presentation::http::handlers::drafts::load_draft,
        crate::presentation::http::handlers::drafts::save_draft,
        crate::presentation::http::handlers::drafts::clear_draft
    ),
    components(
        schemas(
            LoginDto,
            AuthResponseDto,
            UserDto,
            CreatePostDto,
            UpdatePostDto,
            TagsDto,
            TagItemDto,
            PaginationQuery,
            SearchQuery,
            PostDto,
            TermDto,
            ListPostsResponseDto,
            CategoryPostsResponseDto,
            SaveDraftDto,
            DraftDto,
            DraftSavedDto
        )
    ),
    tags(
        (name = "auth", description = "Author login"),
        (name = "posts", description = "Post endpoints"),
        (name = "categories", description = "Category listing"),
        (name = "drafts", description = "Autosaved draft of the signed-in author")
    ),
    modifiers(&SecurityAddon)
)]
pub(crate) struct ApiDoc;

pub(crate) struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut components = openapi.components.take().unwrap_or_default();
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        openapi.components = Some(components);
    }
}
