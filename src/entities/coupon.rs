use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Discount code.
///
/// `discount_value` is in basis points for percentage coupons and in paise for
/// fixed-amount coupons. The user and product scope lists are JSON arrays of
/// UUID strings; `None` and `[]` both mean "no restriction".
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub minimum_order_paise: Option<i64>,
    pub maximum_discount_paise: Option<i64>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub user_usage_limit: Option<i32>,
    pub usage_count: i32,
    #[sea_orm(column_type = "Json", nullable)]
    pub allowed_users: Option<Json>,
    #[sea_orm(column_type = "Json", nullable)]
    pub excluded_users: Option<Json>,
    #[sea_orm(column_type = "Json", nullable)]
    pub applicable_products: Option<Json>,
    #[sea_orm(column_type = "Json", nullable)]
    pub excluded_products: Option<Json>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn allowed_user_ids(&self) -> Vec<Uuid> {
        uuid_list(self.allowed_users.as_ref())
    }

    pub fn excluded_user_ids(&self) -> Vec<Uuid> {
        uuid_list(self.excluded_users.as_ref())
    }

    pub fn applicable_product_ids(&self) -> Vec<Uuid> {
        uuid_list(self.applicable_products.as_ref())
    }

    pub fn excluded_product_ids(&self) -> Vec<Uuid> {
        uuid_list(self.excluded_products.as_ref())
    }

    /// True when the coupon names specific accounts it is for or not for.
    pub fn has_user_restrictions(&self) -> bool {
        !self.allowed_user_ids().is_empty() || !self.excluded_user_ids().is_empty()
    }
}

/// Reads a JSON array of UUID strings, skipping anything that does not parse.
pub fn uuid_list(value: Option<&Json>) -> Vec<Uuid> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .filter_map(|s| Uuid::parse_str(s).ok())
                .collect()
        })
        .unwrap_or_default()
}

pub fn uuid_list_json(ids: &[Uuid]) -> Option<Json> {
    if ids.is_empty() {
        None
    } else {
        Some(Json::Array(
            ids.iter().map(|id| Json::String(id.to_string())).collect(),
        ))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_coupon::Entity")]
    UserCoupon,
}

impl Related<super::user_coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserCoupon.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed_amount")]
    FixedAmount,
}
