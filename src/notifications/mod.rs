//! Transactional customer notifications.
//!
//! Email and SMS providers sit behind the [`EmailClient`] and [`SmsClient`]
//! traits. [`NotificationDispatcher`] renders the templates, attaches the PDF
//! invoice where needed and talks to both channels. A dispatch never fails
//! the caller: every channel outcome comes back in a [`DispatchReport`].

pub mod email;
pub mod invoice;
pub mod sms;
pub mod templates;

use crate::{
    config::{NotificationConfig, PricingConfig, StoreConfig},
    entities::{order, order_item},
};
use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use email::HttpEmailClient;
pub use sms::{format_e164, HttpSmsClient};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Provider is not configured")]
    NotConfigured,
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider rejected request with status {status}: {body}")]
    Provider { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    /// Recipient in E.164 form
    pub phone_number: String,
    pub message: String,
}

/// Sends email through a provider. Returns the provider's message id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<String, NotificationError>;
    fn is_configured(&self) -> bool;
}

/// Sends SMS through a provider. Returns the provider's message id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsClient: Send + Sync {
    async fn send(&self, message: &SmsMessage) -> Result<String, NotificationError>;
    fn is_configured(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ChannelOutcome {
    Sent(String),
    Skipped(String),
    Failed(String),
}

impl ChannelOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, ChannelOutcome::Sent(_))
    }

    fn label(&self) -> &'static str {
        match self {
            ChannelOutcome::Sent(_) => "sent",
            ChannelOutcome::Skipped(_) => "skipped",
            ChannelOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub email: ChannelOutcome,
    pub sms: ChannelOutcome,
}

/// Renders and delivers order notifications over email and SMS.
#[derive(Clone)]
pub struct NotificationDispatcher {
    email: Arc<dyn EmailClient>,
    sms: Arc<dyn SmsClient>,
    store: StoreConfig,
    country_code: String,
    tax_rate_bp: i64,
}

impl NotificationDispatcher {
    pub fn new(
        email: Arc<dyn EmailClient>,
        sms: Arc<dyn SmsClient>,
        store: StoreConfig,
        country_code: impl Into<String>,
    ) -> Self {
        Self {
            email,
            sms,
            store,
            country_code: country_code.into(),
            tax_rate_bp: PricingConfig::default().tax_rate_bp,
        }
    }

    /// GST rate printed on invoices, in basis points.
    pub fn with_tax_rate_bp(mut self, tax_rate_bp: i64) -> Self {
        self.tax_rate_bp = tax_rate_bp;
        self
    }

    /// Dispatcher backed by the HTTP providers named in configuration.
    pub fn from_config(
        config: &NotificationConfig,
        store: StoreConfig,
    ) -> Result<Self, NotificationError> {
        Ok(Self::new(
            Arc::new(HttpEmailClient::from_config(config)?),
            Arc::new(HttpSmsClient::from_config(config)?),
            store,
            config.default_country_code.clone(),
        ))
    }

    pub fn store(&self) -> &StoreConfig {
        &self.store
    }

    pub fn email_configured(&self) -> bool {
        self.email.is_configured()
    }

    pub fn sms_configured(&self) -> bool {
        self.sms.is_configured()
    }

    async fn deliver_email(&self, kind: &'static str, message: EmailMessage) -> ChannelOutcome {
        let outcome = if !self.email.is_configured() {
            ChannelOutcome::Skipped("email provider not configured".into())
        } else if message.to.trim().is_empty() {
            ChannelOutcome::Skipped("no email address on order".into())
        } else {
            match self.email.send(&message).await {
                Ok(id) => ChannelOutcome::Sent(id),
                Err(e) => {
                    warn!(kind, error = %e, "Email delivery failed");
                    ChannelOutcome::Failed(e.to_string())
                }
            }
        };
        counter!("storefront_notifications_total", 1, "channel" => "email", "kind" => kind, "outcome" => outcome.label());
        outcome
    }

    async fn deliver_sms(&self, kind: &'static str, phone: &str, text: String) -> ChannelOutcome {
        let outcome = if !self.sms.is_configured() {
            ChannelOutcome::Skipped("sms provider not configured".into())
        } else {
            match format_e164(phone, &self.country_code) {
                None => ChannelOutcome::Skipped(format!("invalid phone number: {}", phone)),
                Some(phone_number) => {
                    let message = SmsMessage {
                        phone_number,
                        message: text,
                    };
                    match self.sms.send(&message).await {
                        Ok(id) => ChannelOutcome::Sent(id),
                        Err(e) => {
                            warn!(kind, error = %e, "SMS delivery failed");
                            ChannelOutcome::Failed(e.to_string())
                        }
                    }
                }
            }
        };
        counter!("storefront_notifications_total", 1, "channel" => "sms", "kind" => kind, "outcome" => outcome.label());
        outcome
    }

    fn email_for(
        &self,
        order: &order::Model,
        rendered: templates::RenderedEmail,
        attachments: Vec<Attachment>,
    ) -> EmailMessage {
        EmailMessage {
            to: order.customer_email.clone(),
            subject: rendered.subject,
            html_body: rendered.html,
            text_body: rendered.text,
            attachments,
        }
    }

    #[instrument(skip_all, fields(order_id = %order.id))]
    pub async fn order_confirmation(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> DispatchReport {
        let email = self.email_for(
            order,
            templates::order_confirmation(order, items, &self.store),
            Vec::new(),
        );
        let (email, sms) = futures::join!(
            self.deliver_email("order_confirmation", email),
            self.deliver_sms(
                "order_confirmation",
                &order.customer_phone,
                templates::confirmation_sms(order, &self.store)
            )
        );
        let report = DispatchReport { email, sms };
        info!(?report, "Order confirmation dispatched");
        report
    }

    /// Shipping notice with the PDF invoice attached.
    #[instrument(skip_all, fields(order_id = %order.id))]
    pub async fn order_shipped(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> DispatchReport {
        let invoice = Attachment {
            filename: format!("invoice-{}.pdf", order.confirmation_number),
            content_type: "application/pdf".into(),
            data: invoice::render_invoice(order, items, &self.store, self.tax_rate_bp),
        };
        let email = self.email_for(
            order,
            templates::order_shipped(order, items, &self.store),
            vec![invoice],
        );
        let (email, sms) = futures::join!(
            self.deliver_email("order_shipped", email),
            self.deliver_sms(
                "order_shipped",
                &order.customer_phone,
                templates::shipped_sms(order, &self.store)
            )
        );
        let report = DispatchReport { email, sms };
        info!(?report, "Shipping notification dispatched");
        report
    }

    #[instrument(skip_all, fields(order_id = %order.id))]
    pub async fn order_cancelled(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> DispatchReport {
        let email = self.email_for(
            order,
            templates::order_cancelled(order, items, &self.store),
            Vec::new(),
        );
        let (email, sms) = futures::join!(
            self.deliver_email("order_cancelled", email),
            self.deliver_sms(
                "order_cancelled",
                &order.customer_phone,
                templates::cancelled_sms(order, &self.store)
            )
        );
        let report = DispatchReport { email, sms };
        info!(?report, "Cancellation notification dispatched");
        report
    }

    /// Generic status change email. No SMS is sent for these.
    #[instrument(skip_all, fields(order_id = %order.id))]
    pub async fn status_update(
        &self,
        order: &order::Model,
        items: &[order_item::Model],
    ) -> DispatchReport {
        let email = self.email_for(
            order,
            templates::status_update(order, items, &self.store),
            Vec::new(),
        );
        let email = self.deliver_email("status_update", email).await;
        DispatchReport {
            email,
            sms: ChannelOutcome::Skipped("no sms for this status".into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::entities::order::{OrderStatus, PaymentStatus};
    use crate::services::addresses::AddressDetails;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    pub fn address(state: &str) -> AddressDetails {
        AddressDetails {
            full_name: "Asha Rao".into(),
            phone: "9876543210".into(),
            line1: "12 MG Road".into(),
            line2: None,
            city: "Bengaluru".into(),
            state: state.into(),
            postal_code: "560001".into(),
            country: "India".into(),
        }
    }

    pub fn order(state: &str) -> order::Model {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 0).unwrap();
        order::Model {
            id: Uuid::nil(),
            confirmation_number: "ORD-M7X2K1-AB12CD".into(),
            customer_id: "guest_0123456789abcdef01234567".into(),
            user_id: None,
            is_guest: true,
            customer_name: "Asha <Rao>".into(),
            customer_email: "asha@example.com".into(),
            customer_phone: "9876543210".into(),
            subtotal_paise: 200_000,
            tax_paise: 36_000,
            shipping_paise: 0,
            discount_paise: 15_000,
            total_paise: 221_000,
            coupon_id: None,
            coupon_code: Some("SAVE10".into()),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: Some("cod".into()),
            shipping_address: address(state).to_json(),
            billing_address: address(state).to_json(),
            tracking_number: None,
            estimated_delivery: None,
            notes: None,
            cancellation_reason: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn items() -> Vec<order_item::Model> {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 0).unwrap();
        vec![order_item::Model {
            id: Uuid::nil(),
            order_id: Uuid::nil(),
            product_id: Uuid::nil(),
            product_name: "Gold Hoop Earrings".into(),
            sku: "EAR-GH-01".into(),
            quantity: 2,
            unit_price_paise: 100_000,
            total_price_paise: 200_000,
            created_at: at,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{items, order};
    use super::*;

    fn dispatcher(email: MockEmailClient, sms: MockSmsClient) -> NotificationDispatcher {
        NotificationDispatcher::new(
            Arc::new(email),
            Arc::new(sms),
            StoreConfig::default(),
            "+91",
        )
    }

    #[tokio::test]
    async fn unconfigured_channels_are_skipped() {
        let mut email = MockEmailClient::new();
        email.expect_is_configured().return_const(false);
        email.expect_send().never();
        let mut sms = MockSmsClient::new();
        sms.expect_is_configured().return_const(false);
        sms.expect_send().never();

        let report = dispatcher(email, sms)
            .order_confirmation(&order("Karnataka"), &items())
            .await;
        assert!(matches!(report.email, ChannelOutcome::Skipped(_)));
        assert!(matches!(report.sms, ChannelOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn provider_failure_is_reported_not_raised() {
        let mut email = MockEmailClient::new();
        email.expect_is_configured().return_const(true);
        email.expect_send().returning(|_| {
            Err(NotificationError::Provider {
                status: 503,
                body: "down".into(),
            })
        });
        let mut sms = MockSmsClient::new();
        sms.expect_is_configured().return_const(true);
        sms.expect_send()
            .withf(|m| m.phone_number == "+919876543210")
            .returning(|_| Ok("sms-1".into()));

        let report = dispatcher(email, sms)
            .order_cancelled(&order("Karnataka"), &items())
            .await;
        assert!(matches!(report.email, ChannelOutcome::Failed(_)));
        assert_eq!(report.sms, ChannelOutcome::Sent("sms-1".into()));
    }

    #[tokio::test]
    async fn shipped_email_carries_invoice() {
        let mut email = MockEmailClient::new();
        email.expect_is_configured().return_const(true);
        email
            .expect_send()
            .withf(|m| {
                m.attachments.len() == 1
                    && m.attachments[0].content_type == "application/pdf"
                    && m.attachments[0].data.starts_with(b"%PDF-1.4")
            })
            .returning(|_| Ok("email-1".into()));
        let mut sms = MockSmsClient::new();
        sms.expect_is_configured().return_const(true);
        sms.expect_send().returning(|_| Ok("sms-2".into()));

        let report = dispatcher(email, sms)
            .order_shipped(&order("Karnataka"), &items())
            .await;
        assert!(report.email.is_sent());
        assert!(report.sms.is_sent());
    }

    #[tokio::test]
    async fn bad_phone_skips_sms() {
        let mut email = MockEmailClient::new();
        email.expect_is_configured().return_const(true);
        email.expect_send().returning(|_| Ok("email-2".into()));
        let mut sms = MockSmsClient::new();
        sms.expect_is_configured().return_const(true);
        sms.expect_send().never();

        let mut o = order("Karnataka");
        o.customer_phone = "12345".into();
        let report = dispatcher(email, sms).order_confirmation(&o, &items()).await;
        assert!(report.email.is_sent());
        assert!(matches!(report.sms, ChannelOutcome::Skipped(_)));
    }
}
