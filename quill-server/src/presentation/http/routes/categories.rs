use axum::{Router, routing::get};

use crate::presentation::AppState;
use crate::presentation::http::handlers::categories::{list_categories, list_category_posts};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/{id}/posts", get(list_category_posts))
}
