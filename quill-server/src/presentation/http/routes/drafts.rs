use axum::Router;
use axum::middleware;
use axum::routing::get;

use crate::presentation::AppState;
use crate::presentation::http::handlers::drafts::{clear_draft, load_draft, save_draft};
use crate::presentation::http::middleware::auth::jwt_auth_middleware;

pub(crate) fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(load_draft).put(save_draft).delete(clear_draft))
        .layer(middleware::from_fn_with_state(state, jwt_auth_middleware))
}
