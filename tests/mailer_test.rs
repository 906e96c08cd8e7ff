//! HTTP mail relay tests

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use memberhub::services::notification::{HttpMailer, Mail, Mailer};
use memberhub::MemberHubError;

fn mail() -> Mail {
    Mail {
        from: "noreply@example.org".to_string(),
        to: vec!["kim@example.org".to_string()],
        reply_to: None,
        subject: "Confirm your signup for Sommerfest".to_string(),
        body: "token".to_string(),
    }
}

#[tokio::test]
async fn test_mail_is_posted_to_relay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(body_partial_json(json!({
            "to": ["kim@example.org"],
            "subject": "Confirm your signup for Sommerfest"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(&format!("{}/send", server.uri()), Duration::from_secs(5)).unwrap();
    mailer.send(&mail()).await.unwrap();
}

#[tokio::test]
async fn test_relay_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("relay down"))
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let error = mailer.send(&mail()).await.unwrap_err();

    match error {
        MemberHubError::Mail(message) => assert!(message.contains("relay down")),
        other => panic!("unexpected error: {:?}", other),
    }
}
