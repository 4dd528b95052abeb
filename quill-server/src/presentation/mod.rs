use std::sync::Arc;

use crate::application::auth_service::AuthService;
use crate::application::blog_service::BlogService;
use crate::application::draft_service::DraftService;
use crate::data::repositories::sqlite::draft_repository::SqliteDraftRepository;
use crate::data::repositories::sqlite::post_repository::SqlitePostRepository;
use crate::data::repositories::sqlite::user_repository::SqliteUserRepository;
use crate::infrastructure::jwt::JwtService;

pub(crate) mod http;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) auth_service: Arc<AuthService<SqliteUserRepository>>,
    pub(crate) blog_service: Arc<BlogService<SqlitePostRepository>>,
    pub(crate) draft_service: Arc<DraftService<SqliteDraftRepository>>,
    pub(crate) jwt: Arc<JwtService>,
}

impl AppState {
    pub(crate) fn new(
        auth_service: Arc<AuthService<SqliteUserRepository>>,
        blog_service: Arc<BlogService<SqlitePostRepository>>,
        draft_service: Arc<DraftService<SqliteDraftRepository>>,
        jwt: Arc<JwtService>,
    ) -> Self {
        Self {
            auth_service,
            blog_service,
            draft_service,
            jwt,
        }
    }
}
