#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use storefront_api::{
    app,
    auth::{ADMIN_ROLE, CUSTOMER_ROLE},
    config::{AppConfig, StoreConfig},
    db::{self, DbConfig},
    events::{self, EventSender},
    notifications::{
        EmailClient, EmailMessage, NotificationDispatcher, NotificationError, SmsClient,
        SmsMessage,
    },
    services::products::{CreateProductRequest, ProductView},
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const SESSION_HEADER: &str = "x-session-id";

/// Email provider double that keeps every message it was handed.
#[derive(Default)]
pub struct RecordingEmail {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl EmailClient for RecordingEmail {
    async fn send(&self, message: &EmailMessage) -> Result<String, NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Provider {
                status: 503,
                body: "provider down".into(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(format!("email-{}", sent.len()))
    }

    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct RecordingSms {
    pub sent: Mutex<Vec<SmsMessage>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl SmsClient for RecordingSms {
    async fn send(&self, message: &SmsMessage) -> Result<String, NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Provider {
                status: 500,
                body: "gateway error".into(),
            });
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(format!("sms-{}", sent.len()))
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Application harness over a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub email: Arc<RecordingEmail>,
    pub sms: Arc<RecordingSms>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "guest_identity_secret_for_tests".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let email = Arc::new(RecordingEmail::default());
        let sms = Arc::new(RecordingSms::default());
        let notifier = Arc::new(
            NotificationDispatcher::new(email.clone(), sms.clone(), StoreConfig::default(), "+91")
                .with_tax_rate_bp(cfg.pricing.tax_rate_bp),
        );

        let state = AppState::new(Arc::new(pool), cfg, Arc::new(event_sender), notifier);
        let router = app(state.clone());

        Self {
            router,
            state,
            email,
            sms,
            _event_task: event_task,
        }
    }

    pub fn customer_token(&self, user_id: Uuid) -> String {
        self.state
            .auth
            .issue_token(
                user_id,
                Some(format!("{}@example.com", &user_id.simple().to_string()[..8])),
                Some("Test Customer".into()),
                vec![CUSTOMER_ROLE.to_string()],
            )
            .expect("issue customer token")
    }

    pub fn admin_token(&self, admin_id: Uuid) -> String {
        self.state
            .auth
            .issue_token(
                admin_id,
                Some("admin@example.com".into()),
                Some("Store Admin".into()),
                vec![CUSTOMER_ROLE.to_string(), ADMIN_ROLE.to_string()],
            )
            .expect("issue admin token")
    }

    /// Send a request with an optional bearer token and extra headers.
    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        self.request_with_headers(method, uri, body, token, &[]).await
    }

    /// Sends a request and returns the status with the decoded JSON body.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, token).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    pub async fn call_as_guest(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        session: &str,
    ) -> (StatusCode, Value) {
        let response = self
            .request_with_headers(method, uri, body, None, &[(SESSION_HEADER, session)])
            .await;
        let status = response.status();
        (status, response_json(response).await)
    }

    pub async fn seed_product(&self, sku: &str, price_rupees: i64, stock: i32) -> ProductView {
        self.state
            .services
            .products
            .create(CreateProductRequest {
                sku: sku.to_string(),
                name: format!("Test piece {}", sku),
                description: Some("Seeded for integration tests".into()),
                category: Some("rings".into()),
                price: Decimal::from(price_rupees),
                initial_stock: stock,
                reorder_point: 2,
            })
            .await
            .expect("seed product for tests")
    }

    pub async fn available(&self, product_id: Uuid) -> i32 {
        self.state
            .services
            .inventory
            .get(product_id)
            .await
            .expect("inventory row")
            .available()
    }

    pub fn emails(&self) -> Vec<EmailMessage> {
        self.email.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<SmsMessage> {
        self.sms.sent.lock().unwrap().clone()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes) }))
}

/// Reads a money field, which serializes as a decimal string.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a money value: {other}"),
    }
}

pub fn shipping_address() -> Value {
    json!({
        "fullName": "Asha Verma",
        "phone": "9876543210",
        "line1": "12 MG Road",
        "city": "Bengaluru",
        "state": "Karnataka",
        "postalCode": "560001"
    })
}

/// Checkout body for explicit lines.
pub fn checkout_body(items: &[(Uuid, i32)], coupon: Option<&str>) -> Value {
    let items: Vec<Value> = items
        .iter()
        .map(|(id, qty)| json!({ "productId": id, "quantity": qty }))
        .collect();
    let mut body = json!({
        "items": items,
        "customerName": "Asha Verma",
        "customerEmail": "asha@example.com",
        "customerPhone": "9876543210",
        "shippingAddress": shipping_address(),
        "paymentMethod": "upi"
    });
    if let Some(code) = coupon {
        body["couponCode"] = json!(code);
    }
    body
}
