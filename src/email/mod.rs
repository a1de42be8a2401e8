//! Email delivery
//!
//! The digest is rendered by [`digest`] and delivered through a [`Mailer`].
//! The production mailer posts to the Brevo transactional email API.

pub mod digest;

pub use digest::{render_digest, Digest};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EmailConfig;

const BREVO_SEND_URL: &str = "https://api.brevo.com/v3/smtp/email";

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email not configured: BREVO_API_KEY is missing")]
    NotConfigured,

    #[error("Email request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Email provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Result of a successful send.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delivery {
    pub recipient: String,
    pub message_id: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Address the digest is delivered to.
    fn recipient(&self) -> &str;

    async fn send(&self, digest: &Digest) -> Result<Delivery, EmailError>;
}

#[derive(Debug, Serialize)]
struct Contact<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailRequest<'a> {
    sender: Contact<'a>,
    to: Vec<Contact<'a>>,
    subject: &'a str,
    html_content: &'a str,
    text_content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailResponse {
    message_id: Option<String>,
}

pub struct BrevoMailer {
    client: Client,
    base_url: String,
    api_key: String,
    sender_email: String,
    sender_name: String,
    recipient_email: String,
    recipient_name: String,
}

impl BrevoMailer {
    /// `Err(NotConfigured)` when no API key is set.
    pub fn from_config(config: &EmailConfig, timeout: Duration) -> Result<Self, EmailError> {
        let api_key = config.brevo_api_key.clone().ok_or(EmailError::NotConfigured)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: BREVO_SEND_URL.to_string(),
            api_key,
            sender_email: config.sender_email.clone(),
            sender_name: config.sender_name.clone(),
            recipient_email: config.recipient_email.clone(),
            recipient_name: config.recipient_name.clone(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Mailer for BrevoMailer {
    fn recipient(&self) -> &str {
        &self.recipient_email
    }

    async fn send(&self, digest: &Digest) -> Result<Delivery, EmailError> {
        let request = SendEmailRequest {
            sender: Contact {
                email: &self.sender_email,
                name: &self.sender_name,
            },
            to: vec![Contact {
                email: &self.recipient_email,
                name: &self.recipient_name,
            }],
            subject: &digest.subject,
            html_content: &digest.html,
            text_content: &digest.text,
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = serde_json::from_str::<SendEmailResponse>(&body)
            .ok()
            .and_then(|r| r.message_id);
        if message_id.is_none() {
            debug!(body = %body, "Brevo response carried no messageId");
        }

        info!(recipient = %self.recipient_email, message_id = ?message_id, "Digest email sent");
        Ok(Delivery {
            recipient: self.recipient_email.clone(),
            message_id,
        })
    }
}
