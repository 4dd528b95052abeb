use std::sync::Arc;

use anyhow::{Context, Result};

mod application;
mod data;
mod domain;
mod infrastructure;
mod presentation;
mod server;

use application::auth_service::AuthService;
use application::blog_service::BlogService;
use application::draft_service::DraftService;
use data::repositories::sqlite::draft_repository::SqliteDraftRepository;
use data::repositories::sqlite::post_repository::SqlitePostRepository;
use data::repositories::sqlite::user_repository::SqliteUserRepository;
use infrastructure::database::{create_pool, run_migrations};
use infrastructure::jwt::JwtService;
use infrastructure::logging::init_logging;
use infrastructure::settings::Settings;
use presentation::AppState;
use server::run_http;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;

    init_logging(&settings.log_level)?;

    let pool = create_pool(&settings.database_url).await?;
    run_migrations(&pool).await?;

    let auth_service = Arc::new(AuthService::new(
        SqliteUserRepository::new(pool.clone()),
        JwtService::new(&settings.jwt_secret, settings.jwt_ttl_seconds),
    ));
    auth_service
        .bootstrap_admin(&settings.admin)
        .await
        .context("failed to bootstrap admin user")?;

    let blog_service = Arc::new(BlogService::new(SqlitePostRepository::new(pool.clone())));
    let draft_service = Arc::new(DraftService::new(SqliteDraftRepository::new(pool)));
    let jwt = Arc::new(JwtService::new(
        &settings.jwt_secret,
        settings.jwt_ttl_seconds,
    ));

    let state = AppState::new(auth_service, blog_service, draft_service, jwt);
    run_http(&settings, state).await
}
