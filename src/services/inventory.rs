use crate::{
    entities::inventory_item::{self, Entity as InventoryItem},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InventoryView {
    pub product_id: Uuid,
    pub stock_quantity: i32,
    pub reserved_quantity: i32,
    pub available: i32,
    pub reorder_point: i32,
}

impl From<inventory_item::Model> for InventoryView {
    fn from(m: inventory_item::Model) -> Self {
        Self {
            available: m.available(),
            product_id: m.product_id,
            stock_quantity: m.stock_quantity,
            reserved_quantity: m.reserved_quantity,
            reorder_point: m.reorder_point,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStockRequest {
    #[validate(range(min = 0, message = "stockQuantity cannot be negative"))]
    pub stock_quantity: i32,
    #[validate(range(min = 0, message = "reorderPoint cannot be negative"))]
    pub reorder_point: Option<i32>,
}

/// Sums quantities per product so each row is touched once, in a stable order.
fn aggregate_lines(lines: &[(Uuid, i32)]) -> BTreeMap<Uuid, i32> {
    let mut merged = BTreeMap::new();
    for (product_id, qty) in lines {
        *merged.entry(*product_id).or_insert(0) += *qty;
    }
    merged
}

/// Stock counters per product.
///
/// Reserve, release and confirm are single conditional `UPDATE` statements,
/// so concurrent checkouts cannot drive availability below zero.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            event_sender: None,
        }
    }

    pub fn with_event_sender(mut self, sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event);
        }
    }

    fn check_quantity(quantity: i32) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    async fn find<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
    ) -> Result<Option<inventory_item::Model>, ServiceError> {
        InventoryItem::find()
            .filter(inventory_item::Column::ProductId.eq(product_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get(&self, product_id: Uuid) -> Result<inventory_item::Model, ServiceError> {
        Self::find(&*self.db, product_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("Inventory not found for product {}", product_id))
        })
    }

    /// Creates the inventory row for a new product.
    pub async fn ensure_item<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        stock_quantity: i32,
        reorder_point: i32,
    ) -> Result<inventory_item::Model, ServiceError> {
        if let Some(existing) = Self::find(conn, product_id).await? {
            return Ok(existing);
        }
        inventory_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            stock_quantity: Set(stock_quantity.max(0)),
            reserved_quantity: Set(0),
            reorder_point: Set(reorder_point.max(0)),
            updated_at: Set(Utc::now()),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)
    }

    /// Holds `quantity` units for an order.
    #[instrument(skip(self))]
    pub async fn reserve(&self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        Self::check_quantity(quantity)?;

        let result = InventoryItem::update_many()
            .col_expr(
                inventory_item::Column::ReservedQuantity,
                Expr::col(inventory_item::Column::ReservedQuantity).add(quantity),
            )
            .col_expr(inventory_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_item::Column::ProductId.eq(product_id))
            .filter(
                Expr::expr(
                    Expr::col(inventory_item::Column::StockQuantity)
                        .sub(Expr::col(inventory_item::Column::ReservedQuantity)),
                )
                .gte(quantity),
            )
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            counter!("storefront_inventory_reservations_rejected_total", 1);
            return match Self::find(&*self.db, product_id).await? {
                None => Err(ServiceError::NotFound(format!(
                    "Inventory not found for product {}",
                    product_id
                ))),
                Some(item) => Err(ServiceError::InsufficientStock(format!(
                    "Insufficient inventory for product {}: requested {}, available {}",
                    product_id,
                    quantity,
                    item.available().max(0)
                ))),
            };
        }

        counter!("storefront_inventory_reservations_total", 1);
        self.publish(Event::InventoryReserved {
            product_id,
            quantity,
        });
        self.check_low_stock(product_id).await;
        Ok(())
    }

    /// Returns reserved units to the available pool. Never drives the
    /// reserved counter below zero.
    #[instrument(skip(self))]
    pub async fn release(&self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        Self::check_quantity(quantity)?;

        let result = InventoryItem::update_many()
            .col_expr(
                inventory_item::Column::ReservedQuantity,
                Expr::case(
                    Expr::col(inventory_item::Column::ReservedQuantity).gte(quantity),
                    Expr::col(inventory_item::Column::ReservedQuantity).sub(quantity),
                )
                .finally(0)
                .into(),
            )
            .col_expr(inventory_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_item::Column::ProductId.eq(product_id))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Inventory not found for product {}",
                product_id
            )));
        }

        self.publish(Event::InventoryReleased {
            product_id,
            quantity,
        });
        Ok(())
    }

    /// Turns a reservation into a permanent deduction once the order is fulfilled.
    #[instrument(skip(self))]
    pub async fn confirm(&self, product_id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        Self::check_quantity(quantity)?;

        let result = InventoryItem::update_many()
            .col_expr(
                inventory_item::Column::StockQuantity,
                Expr::col(inventory_item::Column::StockQuantity).sub(quantity),
            )
            .col_expr(
                inventory_item::Column::ReservedQuantity,
                Expr::case(
                    Expr::col(inventory_item::Column::ReservedQuantity).gte(quantity),
                    Expr::col(inventory_item::Column::ReservedQuantity).sub(quantity),
                )
                .finally(0)
                .into(),
            )
            .col_expr(inventory_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_item::Column::ProductId.eq(product_id))
            .filter(inventory_item::Column::StockQuantity.gte(quantity))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            return match Self::find(&*self.db, product_id).await? {
                None => Err(ServiceError::NotFound(format!(
                    "Inventory not found for product {}",
                    product_id
                ))),
                Some(item) => Err(ServiceError::InsufficientStock(format!(
                    "Cannot deduct {} units of product {}: only {} in stock",
                    quantity, product_id, item.stock_quantity
                ))),
            };
        }

        self.publish(Event::InventoryConfirmed {
            product_id,
            quantity,
        });
        Ok(())
    }

    /// Administrative overwrite of the on-hand count.
    #[instrument(skip(self))]
    pub async fn update_stock(
        &self,
        product_id: Uuid,
        request: UpdateStockRequest,
    ) -> Result<inventory_item::Model, ServiceError> {
        request.validate()?;
        let current = self.get(product_id).await?;
        if request.stock_quantity < current.reserved_quantity {
            return Err(ServiceError::Conflict(format!(
                "Cannot set stock to {} while {} units are reserved",
                request.stock_quantity, current.reserved_quantity
            )));
        }

        let mut update = InventoryItem::update_many()
            .col_expr(
                inventory_item::Column::StockQuantity,
                Expr::value(request.stock_quantity),
            )
            .col_expr(inventory_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(inventory_item::Column::ProductId.eq(product_id))
            .filter(inventory_item::Column::ReservedQuantity.lte(request.stock_quantity));
        if let Some(reorder_point) = request.reorder_point {
            update = update.col_expr(
                inventory_item::Column::ReorderPoint,
                Expr::value(reorder_point),
            );
        }
        let result = update
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Reservations changed while updating stock; retry".into(),
            ));
        }

        info!(
            %product_id,
            old = current.stock_quantity,
            new = request.stock_quantity,
            "Stock level overwritten"
        );
        self.publish(Event::StockAdjusted {
            product_id,
            old_quantity: current.stock_quantity,
            new_quantity: request.stock_quantity,
        });
        self.check_low_stock(product_id).await;
        self.get(product_id).await
    }

    /// Reserves every line or none: a failure releases what was already held.
    #[instrument(skip(self, lines))]
    pub async fn reserve_all(&self, lines: &[(Uuid, i32)]) -> Result<(), ServiceError> {
        let merged = aggregate_lines(lines);
        let mut held: Vec<(Uuid, i32)> = Vec::with_capacity(merged.len());

        for (product_id, qty) in merged {
            if let Err(err) = self.reserve(product_id, qty).await {
                for (held_id, held_qty) in &held {
                    if let Err(release_err) = self.release(*held_id, *held_qty).await {
                        warn!(
                            product_id = %held_id,
                            error = %release_err,
                            "Failed to roll back reservation"
                        );
                    }
                }
                return Err(err);
            }
            held.push((product_id, qty));
        }
        Ok(())
    }

    /// Releases every line, continuing past failures. Returns the first error.
    pub async fn release_all(&self, lines: &[(Uuid, i32)]) -> Result<(), ServiceError> {
        let mut first_error = None;
        for (product_id, qty) in aggregate_lines(lines) {
            if let Err(err) = self.release(product_id, qty).await {
                warn!(%product_id, error = %err, "Failed to release reservation");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Confirms every line, continuing past failures. Returns the first error.
    pub async fn confirm_all(&self, lines: &[(Uuid, i32)]) -> Result<(), ServiceError> {
        let mut first_error = None;
        for (product_id, qty) in aggregate_lines(lines) {
            if let Err(err) = self.confirm(product_id, qty).await {
                warn!(%product_id, error = %err, "Failed to confirm reservation");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Items whose available quantity is at or below their reorder point.
    pub async fn low_stock(&self) -> Result<Vec<inventory_item::Model>, ServiceError> {
        InventoryItem::find()
            .filter(
                Expr::expr(
                    Expr::col(inventory_item::Column::StockQuantity)
                        .sub(Expr::col(inventory_item::Column::ReservedQuantity)),
                )
                .lte(Expr::col(inventory_item::Column::ReorderPoint)),
            )
            .order_by_asc(inventory_item::Column::StockQuantity)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn check_low_stock(&self, product_id: Uuid) {
        if self.event_sender.is_none() {
            return;
        }
        match Self::find(&*self.db, product_id).await {
            Ok(Some(item)) if item.is_low_stock() => self.publish(Event::LowStock {
                product_id,
                available: item.available(),
                reorder_point: item.reorder_point,
            }),
            Ok(_) => {}
            Err(err) => warn!(%product_id, error = %err, "Low stock check failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_lines_are_merged() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = aggregate_lines(&[(a, 1), (b, 2), (a, 3)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[&a], 4);
        assert_eq!(merged[&b], 2);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        assert!(InventoryService::check_quantity(0).is_err());
        assert!(InventoryService::check_quantity(-3).is_err());
        assert!(InventoryService::check_quantity(1).is_ok());
    }
}
