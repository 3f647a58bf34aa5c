use super::{NotificationError, SmsClient, SmsMessage};
use crate::config::NotificationConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Normalizes a phone number to E.164.
///
/// Bare local numbers (10 digits) get `country_code` prepended; numbers that
/// already carry the country code are accepted with or without a leading `+`.
/// Anything else yields `None`.
pub fn format_e164(raw: &str, country_code: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let cc: String = country_code.chars().filter(char::is_ascii_digit).collect();
    if cc.is_empty() {
        return None;
    }

    if digits.len() == 10 {
        Some(format!("+{}{}", cc, digits))
    } else if digits.len() == cc.len() + 10 && digits.starts_with(&cc) {
        Some(format!("+{}", digits))
    } else {
        None
    }
}

#[derive(Serialize)]
struct SmsRequest<'a> {
    phone_number: &'a str,
    message: &'a str,
    sender_id: &'a str,
}

#[derive(Deserialize)]
struct ProviderResponse {
    #[serde(alias = "messageId", alias = "MessageId")]
    message_id: Option<String>,
}

/// SMS gateway reached over a JSON HTTP API.
#[derive(Clone)]
pub struct HttpSmsClient {
    client: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
    sender_id: String,
}

impl HttpSmsClient {
    pub fn new(
        api_url: Option<String>,
        api_key: Option<String>,
        sender_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_url: api_url.filter(|u| !u.trim().is_empty()),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            sender_id: sender_id.into(),
        })
    }

    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotificationError> {
        Self::new(
            config.sms_api_url.clone(),
            config.sms_api_key.clone(),
            config.sms_sender_id.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl SmsClient for HttpSmsClient {
    fn is_configured(&self) -> bool {
        self.api_url.is_some() && self.api_key.is_some()
    }

    #[instrument(skip_all)]
    async fn send(&self, message: &SmsMessage) -> Result<String, NotificationError> {
        let (Some(url), Some(key)) = (&self.api_url, &self.api_key) else {
            return Err(NotificationError::NotConfigured);
        };
        if !message.phone_number.starts_with('+') {
            return Err(NotificationError::InvalidRecipient(
                message.phone_number.clone(),
            ));
        }

        let response = self
            .client
            .post(url)
            .bearer_auth(key)
            .json(&SmsRequest {
                phone_number: &message.phone_number,
                message: &message.message,
                sender_id: &self.sender_id,
            })
            .send()
            .await?;

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
        debug!(message_id = %id, "SMS accepted by gateway");
        Ok(id)
    }
}
