#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use ragchat::{
    app::build_app,
    auth::repo::InMemoryUserRepo,
    config::{AppConfig, JwtConfig, StoreBackend},
    documents::storage::LocalStorage,
    state::AppState,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub users: Arc<InMemoryUserRepo>,
    _uploads: TempDir,
}

pub fn test_config(upload_dir: &str, verify_user_on_request: bool) -> AppConfig {
    AppConfig {
        store: StoreBackend::Memory,
        database_url: None,
        db_max_connections: 1,
        jwt: JwtConfig {
            secret: SECRET.into(),
            ttl_minutes: 30,
        },
        upload_dir: upload_dir.into(),
        verify_user_on_request,
    }
}

pub async fn spawn_app(verify_user_on_request: bool) -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let config = test_config(uploads.path().to_str().unwrap(), verify_user_on_request);
    let users = Arc::new(InMemoryUserRepo::new());
    let storage = Arc::new(LocalStorage::new(uploads.path()).await.unwrap());
    let state = AppState::from_parts(Arc::new(config), users.clone(), storage);
    TestApp {
        router: build_app(state.clone()),
        state,
        users,
        _uploads: uploads,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn get_authed(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(
            Request::get(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn register(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .post_json(
                "/register",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn upload(&self, token: &str, filename: &str, content: &str) -> (StatusCode, Value) {
        let boundary = "ragchat-test-boundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {content}\r\n\
             --{boundary}--\r\n"
        );
        self.send(
            Request::post("/upload")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }
}
