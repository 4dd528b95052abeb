use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::{BoxError, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::infrastructure::settings::Settings;
use crate::presentation::AppState;
use crate::presentation::http;
use crate::presentation::http::middleware::cors::apply_cors;
use crate::presentation::http::middleware::trace::apply_trace;
use crate::presentation::http::openapi::ApiDoc;

pub(crate) async fn run_http(settings: &Settings, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state, settings)?;

    let listener = TcpListener::bind(&settings.http_addr).await?;

    info!("HTTP server listening on {}", settings.http_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn build_router(state: AppState, settings: &Settings) -> anyhow::Result<Router> {
    let app = http::routes(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_layer_error))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    settings.http_request_timeout_secs,
                )))
                .layer(GlobalConcurrencyLimitLayer::new(
                    settings.http_concurrency_limit,
                )),
        )
        .layer(RequestBodyLimitLayer::new(
            settings.http_request_body_limit_bytes,
        ));
    let app = apply_trace(app);
    apply_cors(app, &settings.cors_origins)
}

async fn handle_layer_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<Elapsed>() {
        warn!("request timed out");
        return (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string());
    }
    warn!(error = %err, "middleware error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use axum::response::Response;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::build_router;
    use crate::application::auth_service::AuthService;
    use crate::application::blog_service::BlogService;
    use crate::application::draft_service::DraftService;
    use crate::data::repositories::sqlite::draft_repository::SqliteDraftRepository;
    use crate::data::repositories::sqlite::post_repository::SqlitePostRepository;
    use crate::data::repositories::sqlite::user_repository::SqliteUserRepository;
    use crate::domain::user::AdminCredentials;
    use crate::infrastructure::database::test_pool;
    use crate::infrastructure::jwt::JwtService;
    use crate::infrastructure::settings::Settings;
    use crate::presentation::AppState;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const PASSWORD: &str = "very-secure-password";

    struct TestApp {
        router: Router,
    }

    impl TestApp {
        async fn new() -> Self {
            let settings = test_settings();
            let pool = test_pool().await;

            let auth_service = Arc::new(AuthService::new(
                SqliteUserRepository::new(pool.clone()),
                JwtService::new(SECRET, 3600),
            ));
            auth_service
                .bootstrap_admin(&settings.admin)
                .await
                .expect("admin must be bootstrapped");

            let state = AppState::new(
                auth_service,
                Arc::new(BlogService::new(SqlitePostRepository::new(pool.clone()))),
                Arc::new(DraftService::new(SqliteDraftRepository::new(pool))),
                Arc::new(JwtService::new(SECRET, 3600)),
            );
            let router = build_router(state, &settings).expect("router must build");

            Self { router }
        }

        async fn request(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> Response {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let body = match body {
                Some(json) => {
                    builder = builder.header(header::CONTENT_TYPE, "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };
            let req = builder.body(body).expect("request must build");

            self.router
                .clone()
                .oneshot(req)
                .await
                .expect("router is infallible")
        }

        async fn login(&self) -> String {
            let resp = self
                .request(
                    Method::POST,
                    "/api/auth/login",
                    None,
                    Some(json!({ "username": "admin", "password": PASSWORD })),
                )
                .await;
            assert_eq!(resp.status(), StatusCode::OK);
            json_body(resp).await["access_token"]
                .as_str()
                .expect("token must be a string")
                .to_string()
        }
    }

    fn test_settings() -> Settings {
        Settings {
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: SECRET.to_string(),
            jwt_ttl_seconds: 3600,
            admin: AdminCredentials::new("admin", PASSWORD).expect("admin creds must be valid"),
            http_addr: "127.0.0.1:0".to_string(),
            cors_origins: vec!["http://localhost:8000".to_string()],
            log_level: "info".to_string(),
            http_request_body_limit_bytes: 64 * 1024,
            http_concurrency_limit: 16,
            http_request_timeout_secs: 10,
        }
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = resp
            .into_body()
            .collect()
            .await
            .expect("body must be readable")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body must be JSON")
    }

    #[tokio::test]
    async fn healthz_is_public() {
        let app = TestApp::new().await;

        let resp = app.request(Method::GET, "/healthz", None, None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = TestApp::new().await;

        let resp = app
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "username": "admin", "password": "nope-nope" })),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(resp).await,
            json!({ "error": "invalid credentials" })
        );
    }

    #[tokio::test]
    async fn writes_require_a_bearer_token() {
        let app = TestApp::new().await;
        let body = json!({ "title": "t", "content": "c" });

        let resp = app
            .request(Method::POST, "/api/posts", None, Some(body.clone()))
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .request(Method::POST, "/api/posts", Some("not-a-jwt"), Some(body))
            .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app.request(Method::GET, "/api/drafts", None, None).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn publish_renders_markdown_and_clears_draft() {
        let app = TestApp::new().await;
        let token = app.login().await;

        let resp = app
            .request(
                Method::PUT,
                "/api/drafts",
                Some(&token),
                Some(json!({ "title": "Half", "tags": [{ "value": "rust" }] })),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(json_body(resp).await["updated_at"].is_string());

        let resp = app
            .request(Method::GET, "/api/drafts", Some(&token), None)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let draft = json_body(resp).await;
        assert_eq!(draft["title"], "Half");
        assert_eq!(draft["tags"], r#"[{"value":"rust"}]"#);

        let resp = app
            .request(
                Method::POST,
                "/api/posts",
                Some(&token),
                Some(json!({
                    "title": "Hello",
                    "content": "# Title\n\nSome *text* <script>alert(1)</script>",
                    "tags": "[{\"value\": \"rust\"}, {\"value\": \"web\"}]",
                    "categories": "Dev, Dev"
                })),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let post = json_body(resp).await;
        let html = post["content_html"].as_str().expect("html must be a string");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>text</em>"));
        assert!(!html.contains("<script"));
        assert_eq!(post["tags"][0]["name"], "rust");
        assert_eq!(post["tags"][1]["name"], "web");
        assert_eq!(post["categories"].as_array().map(Vec::len), Some(1));

        let resp = app
            .request(Method::GET, "/api/drafts", Some(&token), None)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_search_and_category_listing() {
        let app = TestApp::new().await;
        let token = app.login().await;

        for (title, categories) in [("Rust notes", "Dev"), ("Garden log", "Life")] {
            let resp = app
                .request(
                    Method::POST,
                    "/api/posts",
                    Some(&token),
                    Some(json!({
                        "title": title,
                        "content": "body",
                        "tags": "misc",
                        "categories": categories
                    })),
                )
                .await;
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let resp = app
            .request(Method::GET, "/api/posts?limit=1", None, None)
            .await;
        let listing = json_body(resp).await;
        assert_eq!(listing["total"], 2);
        assert_eq!(listing["posts"][0]["title"], "Garden log");

        let resp = app
            .request(Method::GET, "/api/posts/search?query=RUST", None, None)
            .await;
        let hits = json_body(resp).await;
        assert_eq!(hits["total"], 1);
        assert_eq!(hits["posts"][0]["title"], "Rust notes");

        let resp = app
            .request(Method::GET, "/api/categories", None, None)
            .await;
        let categories = json_body(resp).await;
        assert_eq!(categories[0]["name"], "Dev");
        let dev_id = categories[0]["id"].as_i64().expect("id must be a number");

        let resp = app
            .request(
                Method::GET,
                &format!("/api/categories/{dev_id}/posts"),
                None,
                None,
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let in_dev = json_body(resp).await;
        assert_eq!(in_dev["category"]["name"], "Dev");
        assert_eq!(in_dev["total"], 1);

        let resp = app
            .request(Method::GET, "/api/categories/999/posts", None, None)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .request(Method::GET, "/api/posts?limit=0", None, None)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn edit_and_delete_round_trip() {
        let app = TestApp::new().await;
        let token = app.login().await;

        let resp = app
            .request(
                Method::POST,
                "/api/posts",
                Some(&token),
                Some(json!({ "title": "Draft one", "content": "v1", "tags": "a" })),
            )
            .await;
        let id = json_body(resp).await["id"]
            .as_i64()
            .expect("id must be a number");

        let resp = app
            .request(
                Method::PUT,
                &format!("/api/posts/{id}"),
                Some(&token),
                Some(json!({ "title": "Final", "content": "v2", "tags": "b", "categories": "" })),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let updated = json_body(resp).await;
        assert_eq!(updated["title"], "Final");
        assert_eq!(updated["tags"][0]["name"], "b");

        let resp = app
            .request(Method::DELETE, &format!("/api/posts/{id}"), Some(&token), None)
            .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app
            .request(Method::GET, &format!("/api/posts/{id}"), None, None)
            .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_title_is_rejected_with_error_body() {
        let app = TestApp::new().await;
        let token = app.login().await;

        let resp = app
            .request(
                Method::POST,
                "/api/posts",
                Some(&token),
                Some(json!({ "title": "x".repeat(101), "content": "body" })),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn listing_offset_must_start_a_page() {
        let app = TestApp::new().await;

        let resp = app
            .request(Method::GET, "/api/posts?limit=20&offset=5", None, None)
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .request(Method::GET, "/api/posts?limit=20&offset=20", None, None)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["offset"], 20);
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let app = TestApp::new().await;

        let resp = app
            .request(Method::GET, "/api-docs/openapi.json", None, None)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let doc = json_body(resp).await;
        assert!(doc["paths"]["/api/posts"].is_object());
    }
}
