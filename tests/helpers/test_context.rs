//! Test context
//!
//! Builds the full router on top of a test database, with mails recorded
//! in memory and media and forward files in temporary directories.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use memberhub::services::notification::Mail;
use memberhub::services::{Mailer, ServiceFactory};
use memberhub::{AppState, DatabaseService, Result, Settings};

use super::{create_user, TestDatabase, TEST_PASSWORD};

/// Mailer keeping every mail for inspection
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<Mail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &Mail) -> Result<()> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

impl RecordingMailer {
    /// Token contained in the latest mail
    pub fn last_token(&self) -> String {
        let sent = self.sent.lock().unwrap();
        let mail = sent.last().expect("No mail was sent");
        mail.body
            .lines()
            .map(str::trim)
            .find(|line| line.len() == 64 && line.chars().all(|c| c.is_ascii_alphanumeric()))
            .expect("No token in mail")
            .to_string()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

pub struct TestContext {
    pub database: TestDatabase,
    pub db: DatabaseService,
    pub settings: Settings,
    pub services: ServiceFactory,
    pub mails: Arc<RecordingMailer>,
    pub app: Router,
    pub admin_id: i64,
    pub media_dir: TempDir,
    pub forward_dir: TempDir,
}

impl TestContext {
    /// Context with one configured admin called `admin`
    pub async fn try_new() -> Option<Self> {
        let database = TestDatabase::try_new().await?;
        let admin_id = create_user(&database.pool, "admin").await;

        let media_dir = TempDir::new().expect("Failed to create media dir");
        let forward_dir = TempDir::new().expect("Failed to create forward dir");

        let mut settings = Settings::default();
        settings.auth.admin_user_ids = vec![admin_id];
        settings.storage.media_dir = media_dir.path().display().to_string();
        settings.storage.max_upload_bytes = 1024;
        settings.forwards.enabled = true;
        settings.forwards.directory = forward_dir.path().display().to_string();

        let db = DatabaseService::new(database.pool.clone());
        let mails = Arc::new(RecordingMailer::default());
        let services = ServiceFactory::with_mailer(settings.clone(), db.clone(), mails.clone());
        let app = memberhub::router(AppState::from_factory(services.clone(), db.clone(), settings.clone()));

        Some(Self {
            database,
            db,
            settings,
            services,
            mails,
            app,
            admin_id,
            media_dir,
            forward_dir,
        })
    }

    /// Send a request through the router
    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        self.request_with_headers(method, uri, token, body, &[]).await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        send(self.app.clone(), build_request(method, uri, token, body, headers)).await
    }

    /// Log in and return the session token
    pub async fn login(&self, username: &str) -> String {
        let (status, body) = self
            .request(
                Method::POST,
                "/sessions",
                None,
                Some(serde_json::json!({"username": username, "password": TEST_PASSWORD})),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "login failed: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Create a member and log them in
    pub async fn member(&self, username: &str) -> (i64, String) {
        let id = create_user(&self.database.pool, username).await;
        (id, self.login(username).await)
    }
}

/// JSON request with an optional session token
pub fn build_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap()
}

/// Run a request against a router and decode the JSON answer
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, body)
}
