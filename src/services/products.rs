use crate::{
    entities::{
        inventory_item::{self, Entity as InventoryItem},
        product::{self, Entity as Product},
    },
    errors::ServiceError,
    services::{
        inventory::InventoryService,
        pricing::{paise_to_rupees, rupees_to_paise},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() || price.is_zero() {
        return Err(ValidationError::new("price_must_be_positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 64, message = "SKU must be between 1 and 64 characters"))]
    pub sku: String,
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Initial stock cannot be negative"))]
    #[serde(default)]
    pub initial_stock: i32,
    #[validate(range(min = 0, message = "Reorder point cannot be negative"))]
    #[serde(default)]
    pub reorder_point: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// Catalogue entry as exposed over the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Decimal,
    pub is_active: bool,
    pub available_quantity: i32,
    pub in_stock: bool,
}

impl ProductView {
    fn build(product: product::Model, available: i32) -> Self {
        let available = available.max(0);
        Self {
            id: product.id,
            sku: product.sku,
            name: product.name,
            description: product.description,
            category: product.category,
            price: paise_to_rupees(product.price_paise),
            is_active: product.is_active,
            available_quantity: available,
            in_stock: available > 0,
        }
    }
}

fn to_paise(price: Decimal) -> Result<i64, ServiceError> {
    rupees_to_paise(price)
        .ok_or_else(|| ServiceError::ValidationError("Price is out of range".into()))
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a product and its inventory row in one transaction.
    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create(&self, request: CreateProductRequest) -> Result<ProductView, ServiceError> {
        request.validate()?;
        let price_paise = to_paise(request.price)?;
        let sku = request.sku.trim().to_string();

        let duplicate = Product::find()
            .filter(product::Column::Sku.eq(sku.clone()))
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if duplicate > 0 {
            return Err(ServiceError::Conflict(format!("SKU {} already exists", sku)));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku),
            name: Set(request.name.trim().to_string()),
            description: Set(request.description),
            category: Set(request.category),
            price_paise: Set(price_paise),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;
        let item = InventoryService::ensure_item(
            &txn,
            product.id,
            request.initial_stock,
            request.reorder_point,
        )
        .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(product_id = %product.id, "Product created");
        Ok(ProductView::build(product, item.available()))
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductView, ServiceError> {
        request.validate()?;
        let existing = self.load(id).await?;
        let mut active: product::ActiveModel = existing.into();

        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if request.description.is_some() {
            active.description = Set(request.description);
        }
        if request.category.is_some() {
            active.category = Set(request.category);
        }
        if let Some(price) = request.price {
            active.price_paise = Set(to_paise(price)?);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        let available = self.available_for(&[updated.id]).await?;
        Ok(ProductView::build(
            updated.clone(),
            available.get(&updated.id).copied().unwrap_or(0),
        ))
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<ProductView, ServiceError> {
        self.update(
            id,
            UpdateProductRequest {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
    }

    async fn load(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    async fn available_for(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, i32>, ServiceError> {
        let rows = InventoryItem::find()
            .filter(inventory_item::Column::ProductId.is_in(ids.iter().copied()))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(rows
            .into_iter()
            .map(|row| (row.product_id, row.available()))
            .collect())
    }

    /// Public product detail. Inactive products are hidden unless `include_inactive`.
    pub async fn get(&self, id: Uuid, include_inactive: bool) -> Result<ProductView, ServiceError> {
        let product = self.load(id).await?;
        if !product.is_active && !include_inactive {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }
        let available = self.available_for(&[id]).await?;
        Ok(ProductView::build(
            product,
            available.get(&id).copied().unwrap_or(0),
        ))
    }

    pub async fn list(
        &self,
        category: Option<&str>,
        include_inactive: bool,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<ProductView>, u64), ServiceError> {
        let mut query = Product::find().order_by_asc(product::Column::Name);
        if !include_inactive {
            query = query.filter(product::Column::IsActive.eq(true));
        }
        if let Some(category) = category {
            query = query.filter(product::Column::Category.eq(category));
        }

        let paginator = query.paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let products = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;

        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let available = self.available_for(&ids).await?;
        let views = products
            .into_iter()
            .map(|p| {
                let qty = available.get(&p.id).copied().unwrap_or(0);
                ProductView::build(p, qty)
            })
            .collect();
        Ok((views, total))
    }

    /// Active products keyed by id, for pricing a checkout server-side.
    pub async fn active_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, product::Model>, ServiceError> {
        let rows = Product::find()
            .filter(product::Column::Id.is_in(ids.iter().copied()))
            .filter(product::Column::IsActive.eq(true))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(rows.into_iter().map(|p| (p.id, p)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn price_must_be_positive() {
        assert!(validate_price(&dec!(0)).is_err());
        assert!(validate_price(&dec!(-1.50)).is_err());
        assert!(validate_price(&dec!(1499.00)).is_ok());
    }

    #[test]
    fn view_never_reports_negative_stock() {
        let now = Utc::now();
        let product = product::Model {
            id: Uuid::new_v4(),
            sku: "RING-001".into(),
            name: "Solitaire Ring".into(),
            description: None,
            category: Some("rings".into()),
            price_paise: 1_250_000,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let view = ProductView::build(product, -2);
        assert_eq!(view.available_quantity, 0);
        assert!(!view.in_stock);
        assert_eq!(view.price, dec!(12500.00));
    }
}
