//! Router tests that never reach the database
//!
//! The pool connects lazily, so every request here must be answered before
//! a query would be issued.

mod helpers;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use sqlx::postgres::PgPoolOptions;

use helpers::send;
use memberhub::services::{LogMailer, ServiceFactory};
use memberhub::{AppState, DatabaseService, Settings};

fn test_app() -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgresql://nobody@localhost:1/unused")
        .expect("Lazy pool");
    let settings = Settings::default();
    let db = DatabaseService::new(pool);
    let services = ServiceFactory::with_mailer(settings.clone(), db.clone(), Arc::new(LogMailer));
    memberhub::router(AppState::from_factory(services, db, settings))
}

fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

#[tokio::test]
async fn test_docs_lists_every_resource() {
    let (status, body) = send(test_app(), request(Method::GET, "/docs").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["resources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    for expected in ["users", "events", "eventsignups", "forwards", "studydocuments", "joboffers"] {
        assert!(names.contains(&expected), "{} missing from /docs", expected);
    }
}

#[tokio::test]
async fn test_roles() {
    let (status, body) = send(test_app(), request(Method::GET, "/roles").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["vorstand"]["users"].as_array().unwrap().iter().any(|v| v == "DELETE"));
}

#[tokio::test]
async fn test_anonymous_user_list_needs_login() {
    let (status, body) = send(test_app(), request(Method::GET, "/users").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["_status"], "ERR");
    assert_eq!(body["_error"]["code"], 401);
}

#[tokio::test]
async fn test_unknown_resource() {
    let (status, body) = send(test_app(), request(Method::GET, "/spaceships").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["_status"], "ERR");
}

#[tokio::test]
async fn test_unsupported_method() {
    let (status, body) = send(
        test_app(),
        request(Method::PUT, "/eventsignups/1")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"extra_data": {}}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["_error"]["code"], 405);
}

#[tokio::test]
async fn test_unsupported_authorization_scheme() {
    let (status, _) = send(
        test_app(),
        request(Method::GET, "/events")
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_json_body() {
    let (status, body) = send(
        test_app(),
        request(Method::POST, "/sessions")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["_status"], "ERR");
}

#[tokio::test]
async fn test_anonymous_write_on_registered_resource() {
    let (status, _) = send(
        test_app(),
        request(Method::POST, "/studydocuments")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name": "Analysis I"}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
