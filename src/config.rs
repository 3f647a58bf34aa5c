use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str = "storefront_development_jwt_secret_do_not_use_in_production";
const DEV_DEFAULT_GUEST_SECRET: &str = "storefront_development_guest_identity_key";

/// Checkout pricing policy. All amounts in paise.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Tax rate in basis points (1800 = 18 %)
    #[serde(default = "default_tax_rate_bp")]
    #[validate(range(min = 0, max = 10000, message = "tax_rate_bp must be between 0 and 10000"))]
    pub tax_rate_bp: i64,

    /// Flat shipping fee charged below the free-shipping threshold
    #[serde(default = "default_shipping_fee_paise")]
    #[validate(range(min = 0, message = "shipping_fee_paise must not be negative"))]
    pub shipping_fee_paise: i64,

    /// Subtotal at or above which shipping is free
    #[serde(default = "default_free_shipping_threshold_paise")]
    #[validate(range(min = 0, message = "free_shipping_threshold_paise must not be negative"))]
    pub free_shipping_threshold_paise: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate_bp: default_tax_rate_bp(),
            shipping_fee_paise: default_shipping_fee_paise(),
            free_shipping_threshold_paise: default_free_shipping_threshold_paise(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CartConfig {
    #[serde(default = "default_user_cart_ttl_days")]
    #[validate(range(min = 1, max = 365))]
    pub user_ttl_days: i64,

    #[serde(default = "default_guest_cart_ttl_days")]
    #[validate(range(min = 1, max = 365))]
    pub guest_ttl_days: i64,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            user_ttl_days: default_user_cart_ttl_days(),
            guest_ttl_days: default_guest_cart_ttl_days(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CouponConfig {
    /// How long a looked-up coupon stays in the in-process cache
    #[serde(default = "default_coupon_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

impl Default for CouponConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_coupon_cache_ttl_secs(),
        }
    }
}

/// Transactional email and SMS providers. A provider whose URL or key is
/// missing is treated as unconfigured and its sends are skipped.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    #[serde(default)]
    pub email_api_url: Option<String>,
    #[serde(default)]
    pub email_api_key: Option<String>,
    #[serde(default = "default_email_from")]
    pub email_from: String,
    #[serde(default)]
    pub sms_api_url: Option<String>,
    #[serde(default)]
    pub sms_api_key: Option<String>,
    #[serde(default = "default_sms_sender_id")]
    pub sms_sender_id: String,
    /// Prefix applied to bare 10-digit phone numbers
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    #[serde(default = "default_notification_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            email_api_url: None,
            email_api_key: None,
            email_from: default_email_from(),
            sms_api_url: None,
            sms_api_key: None,
            sms_sender_id: default_sms_sender_id(),
            default_country_code: default_country_code(),
            request_timeout_secs: default_notification_timeout_secs(),
        }
    }
}

/// Seller details printed on invoices and emails.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_store_name")]
    pub name: String,
    #[serde(default)]
    pub gstin: Option<String>,
    #[serde(default = "default_store_address")]
    pub address: String,
    /// Seller state, used to choose CGST+SGST over IGST
    #[serde(default = "default_store_state")]
    pub state: String,
    #[serde(default = "default_support_email")]
    pub support_email: String,
    #[serde(default)]
    pub support_phone: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: default_store_name(),
            gstin: None,
            address: default_store_address(),
            state: default_store_state(),
            support_email: default_support_email(),
            support_phone: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    #[serde(default = "default_failed_action_threshold")]
    #[validate(range(min = 1))]
    pub failed_action_threshold: u64,
    #[serde(default = "default_off_hours_threshold")]
    #[validate(range(min = 1))]
    pub off_hours_threshold: u64,
    /// Local hour (inclusive) at which the business day starts
    #[serde(default = "default_business_hours_start")]
    #[validate(range(min = 0, max = 23))]
    pub business_hours_start: u32,
    /// Local hour (exclusive) at which the business day ends
    #[serde(default = "default_business_hours_end")]
    #[validate(range(min = 1, max = 24))]
    pub business_hours_end: u32,
    #[serde(default = "default_audit_window_hours")]
    #[validate(range(min = 1))]
    pub window_hours: i64,
    /// Offset of store-local time from UTC, in minutes (IST = 330)
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            failed_action_threshold: default_failed_action_threshold(),
            off_hours_threshold: default_off_hours_threshold(),
            business_hours_start: default_business_hours_start(),
            business_hours_end: default_business_hours_end(),
            window_hours: default_audit_window_hours(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub database_url: String,

    /// HS256 secret shared with the identity provider
    #[validate(custom = "validate_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,

    #[serde(default = "default_jwt_audience")]
    pub jwt_audience: String,

    /// Lifetime of tokens minted by the CLI, in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: i64,

    /// Key for deriving guest customer identities
    #[validate(custom = "validate_secret")]
    pub guest_identity_secret: String,

    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1, message = "port must be non-zero"))]
    pub port: u16,

    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    #[serde(default)]
    pub auto_migrate: bool,

    /// Comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    pub cors_allow_any_origin: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1, message = "event_channel_capacity must be greater than 0"))]
    pub event_channel_capacity: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub pricing: PricingConfig,

    #[serde(default)]
    #[validate]
    pub carts: CartConfig,

    #[serde(default)]
    #[validate]
    pub coupons: CouponConfig,

    #[serde(default)]
    #[validate]
    pub notifications: NotificationConfig,

    #[serde(default)]
    #[validate]
    pub store: StoreConfig,

    #[serde(default)]
    #[validate]
    pub audit: AuditConfig,
}

impl AppConfig {
    /// Builds a configuration with defaults for everything but the essentials.
    pub fn new(
        database_url: String,
        jwt_secret: String,
        guest_identity_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            jwt_secret,
            jwt_issuer: default_jwt_issuer(),
            jwt_audience: default_jwt_audience(),
            jwt_expiration_secs: default_jwt_expiration(),
            guest_identity_secret,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            request_timeout_secs: default_request_timeout_secs(),
            pricing: PricingConfig::default(),
            carts: CartConfig::default(),
            coupons: CouponConfig::default(),
            notifications: NotificationConfig::default(),
            store: StoreConfig::default(),
            audit: AuditConfig::default(),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn coupon_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.coupons.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development".into(),
            );
            errors.add("jwt_secret", err);
        }

        if !self.is_development() && self.guest_identity_secret.trim() == DEV_DEFAULT_GUEST_SECRET
        {
            let mut err = ValidationError::new("guest_identity_secret_default_dev");
            err.message = Some(
                "The bundled development guest identity key must not be used outside development"
                    .into(),
            );
            errors.add("guest_identity_secret", err);
        }

        if self.audit.business_hours_start >= self.audit.business_hours_end {
            let mut err = ValidationError::new("business_hours");
            err.message = Some("audit.business_hours_start must be before business_hours_end".into());
            errors.add("audit", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_jwt_issuer() -> String {
    "storefront-auth".to_string()
}
fn default_jwt_audience() -> String {
    "storefront-api".to_string()
}
fn default_jwt_expiration() -> i64 {
    3600
}
fn default_db_max_connections() -> u32 {
    20
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    10
}
fn default_db_idle_timeout_secs() -> u64 {
    300
}
fn default_db_acquire_timeout_secs() -> u64 {
    10
}
fn default_event_channel_capacity() -> usize {
    1024
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_tax_rate_bp() -> i64 {
    1800
}
fn default_shipping_fee_paise() -> i64 {
    10_000
}
fn default_free_shipping_threshold_paise() -> i64 {
    200_000
}
fn default_user_cart_ttl_days() -> i64 {
    30
}
fn default_guest_cart_ttl_days() -> i64 {
    7
}
fn default_coupon_cache_ttl_secs() -> u64 {
    300
}
fn default_email_from() -> String {
    "orders@storefront.local".to_string()
}
fn default_sms_sender_id() -> String {
    "JWLSTR".to_string()
}
fn default_country_code() -> String {
    "+91".to_string()
}
fn default_notification_timeout_secs() -> u64 {
    10
}
fn default_store_name() -> String {
    "Storefront Jewels".to_string()
}
fn default_store_address() -> String {
    "Mumbai, Maharashtra, India".to_string()
}
fn default_store_state() -> String {
    "Maharashtra".to_string()
}
fn default_support_email() -> String {
    "support@storefront.local".to_string()
}
fn default_failed_action_threshold() -> u64 {
    5
}
fn default_off_hours_threshold() -> u64 {
    10
}
fn default_business_hours_start() -> u32 {
    8
}
fn default_business_hours_end() -> u32 {
    22
}
fn default_audit_window_hours() -> i64 {
    24
}
fn default_utc_offset_minutes() -> i32 {
    330
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 32 {
        let mut err = ValidationError::new("secret_length");
        err.message = Some("Secrets must be at least 32 characters".into());
        return Err(err);
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("secret_entropy");
        err.message = Some("Secrets must have at least 10 unique characters".into());
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter.
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. `config/default.toml`
/// 3. `config/{RUN_ENV}.toml`
/// 4. Environment variables (`APP__*`)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let mut builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?;

    // Development gets working secrets out of the box; every other environment
    // must provide its own.
    if run_env.eq_ignore_ascii_case(DEFAULT_ENV) {
        builder = builder
            .set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?
            .set_default("guest_identity_secret", DEV_DEFAULT_GUEST_SECRET)?;
    }

    let config = builder
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    for key in ["jwt_secret", "guest_identity_secret"] {
        if config.get_string(key).is_err() {
            error!(
                "{} is not configured. Set APP__{} to a secure random string (minimum 32 characters).",
                key,
                key.to_ascii_uppercase()
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(key.into())));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "k7Qe2vN9xLp4Zt8Rw1Ys6Bu3Hc5Jd0Fg".into(),
            "Gm4Tz8Vq1Lx6Nc3Rb9Ps2Wk7Hy5Jd0Fe".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn defaults_match_storefront_policy() {
        let cfg = base_config();
        assert_eq!(cfg.pricing.tax_rate_bp, 1800);
        assert_eq!(cfg.pricing.free_shipping_threshold_paise, 200_000);
        assert_eq!(cfg.carts.user_ttl_days, 30);
        assert_eq!(cfg.carts.guest_ttl_days, 7);
        assert_eq!(cfg.notifications.default_country_code, "+91");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://shop.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn dev_secrets_rejected_outside_development() {
        let mut cfg = base_config();
        cfg.cors_allow_any_origin = true;
        cfg.guest_identity_secret = DEV_DEFAULT_GUEST_SECRET.into();
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("guest_identity_secret"));
    }

    #[test]
    fn short_secret_fails_validation() {
        let mut cfg = base_config();
        cfg.jwt_secret = "short".into();
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("jwt_secret"));
    }

    #[test]
    fn tax_rate_out_of_range_fails_validation() {
        let mut cfg = base_config();
        cfg.pricing.tax_rate_bp = 20_000;
        assert!(cfg.validate().is_err());
    }
}
