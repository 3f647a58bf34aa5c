use crate::{
    entities::customer_address::{self, Entity as CustomerAddress},
    errors::ServiceError,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{10}$").expect("valid phone regex"));
static PIN_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{6}$").expect("valid pin code regex"));

fn default_country() -> String {
    "India".to_string()
}

/// A postal address. Used both as request payload and as the snapshot
/// stored on orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressDetails {
    #[validate(length(min = 1, max = 120, message = "Full name is required"))]
    pub full_name: String,
    #[validate(regex(path = "PHONE", message = "Phone number must be 10 digits"))]
    pub phone: String,
    #[validate(length(min = 1, max = 200, message = "Address line 1 is required"))]
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, max = 100, message = "State is required"))]
    pub state: String,
    #[validate(regex(path = "PIN_CODE", message = "PIN code must be 6 digits"))]
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
}

impl AddressDetails {
    /// Trims fields and strips separators users commonly type into numbers.
    pub fn normalized(self) -> Self {
        let digits = |s: &str| -> String {
            s.chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect()
        };
        Self {
            full_name: self.full_name.trim().to_string(),
            phone: digits(&self.phone),
            line1: self.line1.trim().to_string(),
            line2: self
                .line2
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            postal_code: digits(&self.postal_code),
            country: self.country.trim().to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Single-line rendering for emails and invoices.
    pub fn one_line(&self) -> String {
        let mut parts = vec![self.line1.as_str()];
        if let Some(line2) = &self.line2 {
            parts.push(line2);
        }
        parts.push(&self.city);
        format!("{}, {} - {}", parts.join(", "), self.state, self.postal_code)
    }
}

impl From<customer_address::Model> for AddressDetails {
    fn from(m: customer_address::Model) -> Self {
        Self {
            full_name: m.full_name,
            phone: m.phone,
            line1: m.line1,
            line2: m.line2,
            city: m.city,
            state: m.state,
            postal_code: m.postal_code,
            country: m.country,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressView {
    pub id: Uuid,
    #[serde(flatten)]
    pub details: AddressDetails,
    pub is_default: bool,
}

impl From<customer_address::Model> for AddressView {
    fn from(m: customer_address::Model) -> Self {
        Self {
            id: m.id,
            is_default: m.is_default,
            details: m.into(),
        }
    }
}

/// Address book for registered customers.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<AddressView>, ServiceError> {
        let rows = CustomerAddress::find()
            .filter(customer_address::Column::UserId.eq(user_id))
            .order_by_desc(customer_address::Column::IsDefault)
            .order_by_desc(customer_address::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Fetches an address, failing with not-found when it belongs to someone else.
    pub async fn get_owned(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<customer_address::Model, ServiceError> {
        CustomerAddress::find_by_id(id)
            .filter(customer_address::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", id)))
    }

    /// Adds an address. The first address a customer saves becomes the default.
    #[instrument(skip(self, details))]
    pub async fn create(
        &self,
        user_id: Uuid,
        details: AddressDetails,
    ) -> Result<AddressView, ServiceError> {
        let details = details.normalized();
        details.validate()?;

        let existing = CustomerAddress::find()
            .filter(customer_address::Column::UserId.eq(user_id))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let now = Utc::now();
        let model = customer_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            full_name: Set(details.full_name),
            phone: Set(details.phone),
            line1: Set(details.line1),
            line2: Set(details.line2),
            city: Set(details.city),
            state: Set(details.state),
            postal_code: Set(details.postal_code),
            country: Set(details.country),
            is_default: Set(existing == 0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(address_id = %model.id, %user_id, "Address saved");
        Ok(model.into())
    }

    #[instrument(skip(self, details))]
    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        details: AddressDetails,
    ) -> Result<AddressView, ServiceError> {
        let details = details.normalized();
        details.validate()?;
        let existing = self.get_owned(user_id, id).await?;

        let mut active: customer_address::ActiveModel = existing.into();
        active.full_name = Set(details.full_name);
        active.phone = Set(details.phone);
        active.line1 = Set(details.line1);
        active.line2 = Set(details.line2);
        active.city = Set(details.city);
        active.state = Set(details.state);
        active.postal_code = Set(details.postal_code);
        active.country = Set(details.country);
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(updated.into())
    }

    /// Deletes an address. When the default goes, the newest remaining one takes over.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get_owned(user_id, id).await?;
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        CustomerAddress::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if existing.is_default {
            let successor = CustomerAddress::find()
                .filter(customer_address::Column::UserId.eq(user_id))
                .order_by_desc(customer_address::Column::CreatedAt)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if let Some(next) = successor {
                let mut active: customer_address::ActiveModel = next.into();
                active.is_default = Set(true);
                active.updated_at = Set(Utc::now());
                active.update(&txn).await.map_err(ServiceError::db_error)?;
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_default(&self, user_id: Uuid, id: Uuid) -> Result<AddressView, ServiceError> {
        self.get_owned(user_id, id).await?;
        let now = Utc::now();
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        CustomerAddress::update_many()
            .col_expr(customer_address::Column::IsDefault, Expr::value(false))
            .col_expr(customer_address::Column::UpdatedAt, Expr::value(now))
            .filter(customer_address::Column::UserId.eq(user_id))
            .filter(customer_address::Column::IsDefault.eq(true))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        CustomerAddress::update_many()
            .col_expr(customer_address::Column::IsDefault, Expr::value(true))
            .col_expr(customer_address::Column::UpdatedAt, Expr::value(now))
            .filter(customer_address::Column::Id.eq(id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(self.get_owned(user_id, id).await?.into())
    }
}
