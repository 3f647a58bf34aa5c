use super::{Attachment, EmailClient, EmailMessage, NotificationError};
use crate::config::NotificationConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Serialize)]
struct SimpleEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    text_body: &'a str,
}

#[derive(Serialize)]
struct RawEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    raw_message: String,
}

#[derive(Deserialize)]
struct ProviderResponse {
    #[serde(alias = "messageId", alias = "MessageId")]
    message_id: Option<String>,
}

/// Email provider reached over a JSON HTTP API.
#[derive(Clone)]
pub struct HttpEmailClient {
    client: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
    from: String,
}

impl HttpEmailClient {
    pub fn new(
        api_url: Option<String>,
        api_key: Option<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_url: api_url.filter(|u| !u.trim().is_empty()),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            from: from.into(),
        })
    }

    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotificationError> {
        Self::new(
            config.email_api_url.clone(),
            config.email_api_key.clone(),
            config.email_from.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl EmailClient for HttpEmailClient {
    fn is_configured(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }

    #[instrument(skip_all, fields(subject = %message.subject))]
    async fn send(&self, message: &EmailMessage) -> Result<String, NotificationError> {
        let (Some(url), Some(key)) = (&self.api_url, &self.api_key) else {
            return Err(NotificationError::NotConfigured);
        };
        if !message.to.contains('@') {
            return Err(NotificationError::InvalidRecipient(message.to.clone()));
        }

        let request = self.client.post(url).bearer_auth(key);
        let request = if message.attachments.is_empty() {
            request.json(&SimpleEmailRequest {
                from: &self.from,
                to: &message.to,
                subject: &message.subject,
                html_body: &message.html_body,
                text_body: &message.text_body,
            })
        } else {
            let boundary = format!("storefront-{}", Uuid::new_v4().simple());
            let mime = build_mime_message(&self.from, message, &boundary);
            request.json(&RawEmailRequest {
                from: &self.from,
                to: &message.to,
                raw_message: STANDARD.encode(mime),
            })
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ProviderResponse = response.json().await?;
        let id = parsed.message_id.unwrap_or_else(|| "unknown".to_string());
        debug!(message_id = %id, "Email accepted by provider");
        Ok(id)
    }
}

fn wrap_base64(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 76 * 2);
    for chunk in encoded.as_bytes().chunks(76) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
    out
}

fn attachment_part(attachment: &Attachment, boundary: &str) -> String {
    format!(
        "--{boundary}\r\n\
         Content-Type: {ctype}; name=\"{name}\"\r\n\
         Content-Disposition: attachment; filename=\"{name}\"\r\n\
         Content-Transfer-Encoding: base64\r\n\r\n\
         {data}",
        boundary = boundary,
        ctype = attachment.content_type,
        name = attachment.filename,
        data = wrap_base64(&attachment.data),
    )
}

/// Builds a multipart/mixed MIME message: an alternative text/html body
/// followed by base64 attachments.
pub fn build_mime_message(from: &str, message: &EmailMessage, boundary: &str) -> String {
    let alt = format!("{}-alt", boundary);
    let mut mime = format!(
        "From: {from}\r\n\
         To: {to}\r\n\
         Subject: =?UTF-8?B?{subject}?=\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n\r\n\
         --{boundary}\r\n\
         Content-Type: multipart/alternative; boundary=\"{alt}\"\r\n\r\n\
         --{alt}\r\n\
         Content-Type: text/plain; charset=UTF-8\r\n\
         Content-Transfer-Encoding: base64\r\n\r\n\
         {text}\
         --{alt}\r\n\
         Content-Type: text/html; charset=UTF-8\r\n\
         Content-Transfer-Encoding: base64\r\n\r\n\
         {html}\
         --{alt}--\r\n",
        from = from,
        to = message.to,
        subject = STANDARD.encode(message.subject.as_bytes()),
        boundary = boundary,
        alt = alt,
        text = wrap_base64(message.text_body.as_bytes()),
        html = wrap_base64(message.html_body.as_bytes()),
    );
    for attachment in &message.attachments {
        mime.push_str(&attachment_part(attachment, boundary));
    }
    mime.push_str(&format!("--{}--\r\n", boundary));
    mime
}
