use crate::{
    cache::CouponCache,
    entities::{
        coupon::{self, uuid_list_json, DiscountType, Entity as Coupon},
        user_coupon::{self, Entity as UserCoupon},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::{apply_basis_points, paise_to_rupees, rupees_to_paise},
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

static COUPON_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9_-]{3,32}$").expect("valid coupon code regex"));

/// Why a coupon was refused. Variants are listed in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponRejection {
    NotFound,
    Inactive,
    NotYetValid,
    Expired,
    MinimumNotMet { minimum_paise: i64 },
    UsageLimitReached,
    UserLimitReached,
    NotEligible,
    SignInRequired,
    NotApplicableToCart,
    ContainsExcludedProducts,
}

impl std::fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Invalid coupon code"),
            Self::Inactive => write!(f, "This coupon is no longer active"),
            Self::NotYetValid => write!(f, "This coupon is not yet valid"),
            Self::Expired => write!(f, "This coupon has expired"),
            Self::MinimumNotMet { minimum_paise } => write!(
                f,
                "Minimum order amount of ₹{} required for this coupon",
                paise_to_rupees(*minimum_paise)
            ),
            Self::UsageLimitReached => write!(f, "This coupon has reached its usage limit"),
            Self::UserLimitReached => write!(
                f,
                "You have already used this coupon the maximum number of times"
            ),
            Self::NotEligible => write!(f, "This coupon is not available for your account"),
            Self::SignInRequired => write!(
                f,
                "This coupon is not available for your account. Please sign in to use it"
            ),
            Self::NotApplicableToCart => write!(
                f,
                "This coupon is not applicable to the products in your cart"
            ),
            Self::ContainsExcludedProducts => write!(
                f,
                "This coupon cannot be applied to some products in your cart"
            ),
        }
    }
}

/// What the validator needs to know about the cart being checked out.
#[derive(Debug, Clone)]
pub struct CouponContext<'a> {
    pub code: &'a str,
    pub user_id: Option<Uuid>,
    pub subtotal_paise: i64,
    pub product_ids: &'a [Uuid],
}

/// Outcome of a validation. Rejections are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponValidation {
    pub is_valid: bool,
    pub discount_paise: i64,
    pub rejection: Option<CouponRejection>,
    pub coupon: Option<coupon::Model>,
}

impl CouponValidation {
    fn accepted(coupon: coupon::Model, discount_paise: i64) -> Self {
        Self {
            is_valid: true,
            discount_paise,
            rejection: None,
            coupon: Some(coupon),
        }
    }

    fn rejected(rejection: CouponRejection, coupon: Option<coupon::Model>) -> Self {
        Self {
            is_valid: false,
            discount_paise: 0,
            rejection: Some(rejection),
            coupon,
        }
    }

    pub fn error(&self) -> Option<String> {
        self.rejection.as_ref().map(ToString::to_string)
    }
}

/// Discount a coupon yields on `subtotal_paise`, capped and never above the subtotal.
pub fn discount_for(coupon: &coupon::Model, subtotal_paise: i64) -> i64 {
    let subtotal = subtotal_paise.max(0);
    let raw = match coupon.discount_type {
        DiscountType::Percentage => {
            let pct = apply_basis_points(subtotal, coupon.discount_value);
            match coupon.maximum_discount_paise {
                Some(cap) => pct.min(cap),
                None => pct,
            }
        }
        DiscountType::FixedAmount => coupon.discount_value,
    };
    raw.clamp(0, subtotal)
}

/// Runs the ordered rule chain. `user_usage` is how many times the current
/// user already redeemed this coupon.
pub fn evaluate_coupon(
    coupon: &coupon::Model,
    ctx: &CouponContext<'_>,
    user_usage: i32,
    now: DateTime<Utc>,
) -> Result<i64, CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if let Some(from) = coupon.valid_from {
        if now < from {
            return Err(CouponRejection::NotYetValid);
        }
    }
    if let Some(until) = coupon.valid_until {
        if now > until {
            return Err(CouponRejection::Expired);
        }
    }
    if let Some(minimum) = coupon.minimum_order_paise {
        if ctx.subtotal_paise < minimum {
            return Err(CouponRejection::MinimumNotMet {
                minimum_paise: minimum,
            });
        }
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.usage_count >= limit {
            return Err(CouponRejection::UsageLimitReached);
        }
    }

    let allowed = coupon.allowed_user_ids();
    let excluded = coupon.excluded_user_ids();
    match ctx.user_id {
        Some(user_id) => {
            if let Some(limit) = coupon.user_usage_limit {
                if user_usage >= limit {
                    return Err(CouponRejection::UserLimitReached);
                }
            }
            if excluded.contains(&user_id) || (!allowed.is_empty() && !allowed.contains(&user_id))
            {
                return Err(CouponRejection::NotEligible);
            }
        }
        None => {
            if coupon.has_user_restrictions() {
                return Err(CouponRejection::SignInRequired);
            }
        }
    }

    let applicable = coupon.applicable_product_ids();
    if !applicable.is_empty() && !ctx.product_ids.iter().any(|p| applicable.contains(p)) {
        return Err(CouponRejection::NotApplicableToCart);
    }
    let excluded_products = coupon.excluded_product_ids();
    if ctx
        .product_ids
        .iter()
        .any(|p| excluded_products.contains(p))
    {
        return Err(CouponRejection::ContainsExcludedProducts);
    }

    Ok(discount_for(coupon, ctx.subtotal_paise))
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn validate_coupon_code(code: &str) -> Result<(), ValidationError> {
    if COUPON_CODE.is_match(&normalize_code(code)) {
        Ok(())
    } else {
        let mut err = ValidationError::new("coupon_code");
        err.message =
            Some("Coupon code must be 3-32 letters, digits, dashes or underscores".into());
        Err(err)
    }
}

fn validate_positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() || value.is_zero() {
        let mut err = ValidationError::new("amount");
        err.message = Some("Amounts must be greater than zero".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCouponRequest {
    #[validate(custom = "validate_coupon_code")]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Percent for percentage coupons (e.g. 10 or 12.5), rupees for fixed ones
    #[validate(custom = "validate_positive_amount")]
    pub discount_value: Decimal,
    #[validate(custom = "validate_positive_amount")]
    pub minimum_order_amount: Option<Decimal>,
    #[validate(custom = "validate_positive_amount")]
    pub maximum_discount_amount: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[validate(range(min = 1, message = "usageLimit must be at least 1"))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 1, message = "userUsageLimit must be at least 1"))]
    pub user_usage_limit: Option<i32>,
    #[serde(default)]
    pub allowed_users: Vec<Uuid>,
    #[serde(default)]
    pub excluded_users: Vec<Uuid>,
    #[serde(default)]
    pub applicable_products: Vec<Uuid>,
    #[serde(default)]
    pub excluded_products: Vec<Uuid>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial coupon update. Omitted fields are left unchanged; `null` clears a
/// nullable field and empties a list.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCouponRequest {
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[validate(custom = "validate_positive_amount")]
    pub discount_value: Option<Decimal>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    #[validate(custom = "validate_positive_amount")]
    pub minimum_order_amount: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    #[validate(custom = "validate_positive_amount")]
    pub maximum_discount_amount: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub valid_from: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub valid_until: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<i32>)]
    #[validate(range(min = 1, message = "usageLimit must be at least 1"))]
    pub usage_limit: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<i32>)]
    #[validate(range(min = 1, message = "userUsageLimit must be at least 1"))]
    pub user_usage_limit: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Vec<String>>)]
    pub allowed_users: Option<Option<Vec<Uuid>>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Vec<String>>)]
    pub excluded_users: Option<Option<Vec<Uuid>>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Vec<String>>)]
    pub applicable_products: Option<Option<Vec<Uuid>>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Vec<String>>)]
    pub excluded_products: Option<Option<Vec<Uuid>>>,
    pub is_active: Option<bool>,
}

fn id_list(ids: Option<Vec<Uuid>>) -> Option<serde_json::Value> {
    uuid_list_json(&ids.unwrap_or_default())
}

/// Converts the API discount value to storage units.
fn stored_discount_value(kind: DiscountType, value: Decimal) -> Result<i64, ServiceError> {
    let stored = match kind {
        // percent -> basis points; 12.5 % == 1250 bp, same scaling as rupees -> paise
        DiscountType::Percentage => {
            if value > Decimal::from(100) {
                return Err(ServiceError::ValidationError(
                    "Percentage discounts cannot exceed 100".into(),
                ));
            }
            rupees_to_paise(value)
        }
        DiscountType::FixedAmount => rupees_to_paise(value),
    };
    stored.ok_or_else(|| ServiceError::ValidationError("Discount value is out of range".into()))
}

fn optional_paise(value: Option<Decimal>) -> Result<Option<i64>, ServiceError> {
    value
        .map(|v| {
            rupees_to_paise(v)
                .ok_or_else(|| ServiceError::ValidationError("Amount is out of range".into()))
        })
        .transpose()
}

fn check_window(
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> Result<(), ServiceError> {
    match (from, until) {
        (Some(f), Some(u)) if f >= u => Err(ServiceError::ValidationError(
            "validFrom must be before validUntil".into(),
        )),
        _ => Ok(()),
    }
}

/// API view of a coupon, amounts in rupees / percent.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CouponView {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_order_amount: Option<Decimal>,
    pub maximum_discount_amount: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub user_usage_limit: Option<i32>,
    pub usage_count: i32,
    pub allowed_users: Vec<Uuid>,
    pub excluded_users: Vec<Uuid>,
    pub applicable_products: Vec<Uuid>,
    pub excluded_products: Vec<Uuid>,
    pub is_active: bool,
}

impl From<coupon::Model> for CouponView {
    fn from(c: coupon::Model) -> Self {
        Self {
            allowed_users: c.allowed_user_ids(),
            excluded_users: c.excluded_user_ids(),
            applicable_products: c.applicable_product_ids(),
            excluded_products: c.excluded_product_ids(),
            id: c.id,
            code: c.code,
            description: c.description,
            discount_type: c.discount_type,
            discount_value: paise_to_rupees(c.discount_value),
            minimum_order_amount: c.minimum_order_paise.map(paise_to_rupees),
            maximum_discount_amount: c.maximum_discount_paise.map(paise_to_rupees),
            valid_from: c.valid_from,
            valid_until: c.valid_until,
            usage_limit: c.usage_limit,
            user_usage_limit: c.user_usage_limit,
            usage_count: c.usage_count,
            is_active: c.is_active,
        }
    }
}

/// Coupon lookup, validation, redemption bookkeeping and administration.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    cache: Arc<CouponCache>,
    event_sender: Option<Arc<EventSender>>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, cache: Arc<CouponCache>) -> Self {
        Self {
            db,
            cache,
            event_sender: None,
        }
    }

    pub fn with_event_sender(mut self, sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Looks up a coupon by code, consulting the cache first.
    #[instrument(skip(self))]
    pub async fn find_by_code(&self, code: &str) -> Result<Option<coupon::Model>, ServiceError> {
        let code = normalize_code(code);
        if let Some(hit) = self.cache.get(&code) {
            debug!(code = %code, "coupon cache hit");
            return Ok(Some(hit));
        }

        let found = Coupon::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if let Some(model) = &found {
            self.cache.insert(code, model.clone());
        }
        Ok(found)
    }

    async fn user_usage_count(&self, coupon_id: Uuid, user_id: Uuid) -> Result<i32, ServiceError> {
        let row = UserCoupon::find()
            .filter(user_coupon::Column::CouponId.eq(coupon_id))
            .filter(user_coupon::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(row.map(|r| r.usage_count).unwrap_or(0))
    }

    /// Validates a coupon for a cart. Business rejections come back as
    /// `is_valid == false`; only store failures are `Err`.
    #[instrument(skip(self, ctx), fields(code = %ctx.code, user_id = ?ctx.user_id))]
    pub async fn validate(
        &self,
        ctx: CouponContext<'_>,
    ) -> Result<CouponValidation, ServiceError> {
        let Some(coupon) = self.find_by_code(ctx.code).await? else {
            return Ok(CouponValidation::rejected(CouponRejection::NotFound, None));
        };

        let user_usage = match (ctx.user_id, coupon.user_usage_limit) {
            (Some(user_id), Some(_)) => self.user_usage_count(coupon.id, user_id).await?,
            _ => 0,
        };

        let outcome = match evaluate_coupon(&coupon, &ctx, user_usage, Utc::now()) {
            Ok(discount) => CouponValidation::accepted(coupon, discount),
            Err(rejection) => {
                debug!(reason = %rejection, "coupon rejected");
                CouponValidation::rejected(rejection, Some(coupon))
            }
        };
        Ok(outcome)
    }

    /// Records one redemption by a registered user. Runs on the caller's
    /// connection so it can join the order transaction. The global counter is
    /// bumped with a guarded update, so a coupon can never exceed its limit.
    #[instrument(skip(self, conn, coupon), fields(coupon_id = %coupon.id))]
    pub async fn record_usage<C: ConnectionTrait>(
        &self,
        conn: &C,
        coupon: &coupon::Model,
        user_id: Uuid,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(now))
            .filter(coupon::Column::Id.eq(coupon.id))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsageCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            self.cache.invalidate(&coupon.code);
            return Err(ServiceError::InvalidOperation(
                CouponRejection::UsageLimitReached.to_string(),
            ));
        }

        let existing = UserCoupon::find()
            .filter(user_coupon::Column::CouponId.eq(coupon.id))
            .filter(user_coupon::Column::UserId.eq(user_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        match existing {
            Some(row) => {
                UserCoupon::update_many()
                    .col_expr(
                        user_coupon::Column::UsageCount,
                        Expr::col(user_coupon::Column::UsageCount).add(1),
                    )
                    .col_expr(user_coupon::Column::LastUsedAt, Expr::value(now))
                    .filter(user_coupon::Column::Id.eq(row.id))
                    .exec(conn)
                    .await
                    .map_err(ServiceError::db_error)?;
            }
            None => {
                user_coupon::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    coupon_id: Set(coupon.id),
                    usage_count: Set(1),
                    last_used_at: Set(now),
                }
                .insert(conn)
                .await
                .map_err(ServiceError::db_error)?;
            }
        }

        self.cache.invalidate(&coupon.code);
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::CouponRedeemed {
                coupon_id: coupon.id,
                user_id: Some(user_id),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create(&self, request: CreateCouponRequest) -> Result<CouponView, ServiceError> {
        request.validate()?;
        check_window(request.valid_from, request.valid_until)?;

        let code = normalize_code(&request.code);
        let exists = Coupon::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if exists > 0 {
            return Err(ServiceError::Conflict(format!(
                "Coupon code {} already exists",
                code
            )));
        }

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            description: Set(request.description),
            discount_type: Set(request.discount_type),
            discount_value: Set(stored_discount_value(
                request.discount_type,
                request.discount_value,
            )?),
            minimum_order_paise: Set(optional_paise(request.minimum_order_amount)?),
            maximum_discount_paise: Set(optional_paise(request.maximum_discount_amount)?),
            valid_from: Set(request.valid_from),
            valid_until: Set(request.valid_until),
            usage_limit: Set(request.usage_limit),
            user_usage_limit: Set(request.user_usage_limit),
            usage_count: Set(0),
            allowed_users: Set(uuid_list_json(&request.allowed_users)),
            excluded_users: Set(uuid_list_json(&request.excluded_users)),
            applicable_products: Set(uuid_list_json(&request.applicable_products)),
            excluded_products: Set(uuid_list_json(&request.excluded_products)),
            is_active: Set(request.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        self.cache.invalidate(&code);
        info!(coupon_id = %model.id, "Coupon created");
        Ok(model.into())
    }

    async fn load(&self, id: Uuid) -> Result<coupon::Model, ServiceError> {
        Coupon::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))
    }

    pub async fn get(&self, id: Uuid) -> Result<CouponView, ServiceError> {
        self.load(id).await.map(Into::into)
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateCouponRequest,
    ) -> Result<CouponView, ServiceError> {
        request.validate()?;
        let existing = self.load(id).await?;
        check_window(
            request.valid_from.unwrap_or(existing.valid_from),
            request.valid_until.unwrap_or(existing.valid_until),
        )?;

        let code = existing.code.clone();
        let kind = existing.discount_type;
        let mut active: coupon::ActiveModel = existing.into();
        if let Some(description) = request.description {
            active.description = Set(description);
        }
        if let Some(value) = request.discount_value {
            active.discount_value = Set(stored_discount_value(kind, value)?);
        }
        if let Some(amount) = request.minimum_order_amount {
            active.minimum_order_paise = Set(optional_paise(amount)?);
        }
        if let Some(amount) = request.maximum_discount_amount {
            active.maximum_discount_paise = Set(optional_paise(amount)?);
        }
        if let Some(from) = request.valid_from {
            active.valid_from = Set(from);
        }
        if let Some(until) = request.valid_until {
            active.valid_until = Set(until);
        }
        if let Some(limit) = request.usage_limit {
            active.usage_limit = Set(limit);
        }
        if let Some(limit) = request.user_usage_limit {
            active.user_usage_limit = Set(limit);
        }
        if let Some(ids) = request.allowed_users {
            active.allowed_users = Set(id_list(ids));
        }
        if let Some(ids) = request.excluded_users {
            active.excluded_users = Set(id_list(ids));
        }
        if let Some(ids) = request.applicable_products {
            active.applicable_products = Set(id_list(ids));
        }
        if let Some(ids) = request.excluded_products {
            active.excluded_products = Set(id_list(ids));
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        self.cache.invalidate(&code);
        Ok(updated.into())
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<CouponView, ServiceError> {
        self.update(
            id,
            UpdateCouponRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.load(id).await?;
        Coupon::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        self.cache.invalidate(&existing.code);
        info!(coupon_id = %id, "Coupon deleted");
        Ok(())
    }

    pub async fn list(
        &self,
        page: u64,
        limit: u64,
        active_only: bool,
    ) -> Result<(Vec<CouponView>, u64), ServiceError> {
        let mut query = Coupon::find().order_by_desc(coupon::Column::CreatedAt);
        if active_only {
            query = query.filter(coupon::Column::IsActive.eq(true));
        }
        let paginator = query.paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((items.into_iter().map(Into::into).collect(), total))
    }
}
