//! Notification service implementation
//!
//! This service formats outgoing mails from templates and hands them to a
//! [`Mailer`]. Two mailers exist: one that only logs the mail and one that
//! posts it as JSON to an HTTP mail relay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::settings::MailConfig;
use crate::utils::errors::{MemberHubError, Result};

/// A single outgoing mail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    pub from: String,
    pub to: Vec<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

/// Delivers mails
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &Mail) -> Result<()>;
}

/// Mailer that writes mails to the log instead of sending them
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &Mail) -> Result<()> {
        info!(to = ?mail.to, subject = %mail.subject, body = %mail.body, "Mail (not sent, log backend)");
        Ok(())
    }
}

/// Mailer posting mails to an HTTP relay
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: url::Url,
}

impl HttpMailer {
    pub fn new(relay_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            relay_url: url::Url::parse(relay_url)?,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: &Mail) -> Result<()> {
        let response = self.client.post(self.relay_url.clone()).json(mail).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MemberHubError::Mail(format!("relay answered {}: {}", status, body)));
        }

        debug!(to = ?mail.to, subject = %mail.subject, "Mail handed to relay");
        Ok(())
    }
}

/// Build the mailer selected in the configuration
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match config.backend.as_str() {
        "http" => {
            let relay_url = config
                .relay_url
                .as_deref()
                .ok_or_else(|| MemberHubError::Config("mail.relay_url is required for the http backend".to_string()))?;
            Ok(Arc::new(HttpMailer::new(relay_url, Duration::from_secs(config.timeout_seconds))?))
        }
        _ => Ok(Arc::new(LogMailer)),
    }
}

/// Mail template with `{placeholder}` parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub key: String,
    pub subject: String,
    pub body: String,
}

pub const TEMPLATE_CONFIRM_SIGNUP: &str = "confirm_signup";
pub const TEMPLATE_CONFIRM_SIGNOFF: &str = "confirm_signoff";
pub const TEMPLATE_CONFIRM_SUBSCRIBE: &str = "confirm_subscribe";
pub const TEMPLATE_CONFIRM_UNSUBSCRIBE: &str = "confirm_unsubscribe";
pub const TEMPLATE_CONFIRM_CHANGE: &str = "confirm_change";
pub const TEMPLATE_PERMISSION_EXPIRY: &str = "permission_expiry";

/// Notification service for mail handling
#[derive(Clone)]
pub struct NotificationService {
    mailer: Arc<dyn Mailer>,
    config: MailConfig,
    templates: HashMap<String, MessageTemplate>,
}

impl NotificationService {
    /// Create a new NotificationService instance
    pub fn new(mailer: Arc<dyn Mailer>, config: MailConfig) -> Self {
        Self {
            mailer,
            config,
            templates: Self::load_default_templates(),
        }
    }

    /// Render a template and send it to one recipient
    pub async fn send_template(&self, to: &str, template_key: &str, parameters: &HashMap<String, String>) -> Result<()> {
        let template = self
            .templates
            .get(template_key)
            .ok_or_else(|| MemberHubError::Mail(format!("unknown mail template '{}'", template_key)))?;

        let mail = Mail {
            from: self.config.from.clone(),
            to: vec![to.to_string()],
            reply_to: Some(self.config.admin_mail.clone()),
            subject: render(&template.subject, parameters),
            body: render(&template.body, parameters),
        };

        match self.mailer.send(&mail).await {
            Ok(()) => {
                info!(template_key = template_key, "Notification sent successfully");
                Ok(())
            }
            Err(e) => {
                error!(template_key = template_key, error = %e, "Failed to send notification");
                Err(e)
            }
        }
    }

    /// Mail a confirmation token to the address a deferred change concerns
    pub async fn send_confirmation(&self, to: &str, template_key: &str, subject: &str, token: &str) -> Result<()> {
        let mut parameters = HashMap::new();
        parameters.insert("subject".to_string(), subject.to_string());
        parameters.insert("token".to_string(), token.to_string());
        self.send_template(to, template_key, &parameters).await
    }

    fn load_default_templates() -> HashMap<String, MessageTemplate> {
        let templates = [
            (
                TEMPLATE_CONFIRM_SIGNUP,
                "Confirm your signup for {subject}",
                "Hello!\n\nPlease confirm your signup for {subject} by sending the following token to POST /confirms:\n\n{token}\n\nIf you did not sign up, just ignore this mail.",
            ),
            (
                TEMPLATE_CONFIRM_SIGNOFF,
                "Confirm your signoff from {subject}",
                "Hello!\n\nPlease confirm that you no longer want to attend {subject} by sending the following token to POST /confirms:\n\n{token}",
            ),
            (
                TEMPLATE_CONFIRM_SUBSCRIBE,
                "Confirm your subscription to {subject}",
                "Hello!\n\nPlease confirm your subscription to the mailing list {subject} by sending the following token to POST /confirms:\n\n{token}",
            ),
            (
                TEMPLATE_CONFIRM_UNSUBSCRIBE,
                "Confirm leaving {subject}",
                "Hello!\n\nPlease confirm that you want to leave the mailing list {subject} by sending the following token to POST /confirms:\n\n{token}",
            ),
            (
                TEMPLATE_CONFIRM_CHANGE,
                "Confirm your changes to {subject}",
                "Hello!\n\nPlease confirm the changes to your entry for {subject} by sending the following token to POST /confirms:\n\n{token}\n\nIf you did not request them, just ignore this mail.",
            ),
            (
                TEMPLATE_PERMISSION_EXPIRY,
                "Your permissions as {role} are about to expire",
                "Hello {firstname}!\n\nYour permissions as {role} will expire on {expiry_date}. Please contact the board if they should be extended.",
            ),
        ];

        templates
            .into_iter()
            .map(|(key, subject, body)| {
                (
                    key.to_string(),
                    MessageTemplate {
                        key: key.to_string(),
                        subject: subject.to_string(),
                        body: body.to_string(),
                    },
                )
            })
            .collect()
    }
}

fn render(template: &str, parameters: &HashMap<String, String>) -> String {
    parameters
        .iter()
        .fold(template.to_string(), |text, (key, value)| text.replace(&format!("{{{}}}", key), value))
}
