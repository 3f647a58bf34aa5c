use crate::{
    config::CartConfig,
    entities::{
        cart::{self, CartStatus, Entity as Cart},
        cart_item::{self, Entity as CartItem},
        inventory_item::{self, Entity as InventoryItem},
        product::Entity as Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::{
        calculate_totals, paise_to_rupees, LineAmount, PricingPolicy, Totals, TotalsView,
    },
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait,
    DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

const MAX_LINE_QUANTITY: i32 = 100;

/// Who a cart belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(Uuid),
    Guest(String),
}

impl CartOwner {
    fn condition(&self) -> Condition {
        match self {
            CartOwner::User(id) => Condition::all().add(cart::Column::UserId.eq(*id)),
            CartOwner::Guest(session) => {
                Condition::all().add(cart::Column::SessionId.eq(session.as_str()))
            }
        }
    }

    fn owns(&self, cart: &cart::Model) -> bool {
        match self {
            CartOwner::User(id) => cart.user_id == Some(*id),
            CartOwner::Guest(session) => cart.session_id.as_deref() == Some(session.as_str()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 100, message = "Quantity must be between 1 and 100"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartItemRequest {
    /// Zero or less removes the line
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl From<cart_item::Model> for CartItemView {
    fn from(item: cart_item::Model) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: paise_to_rupees(item.unit_price_paise),
            line_total: paise_to_rupees(item.line_total_paise),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub id: Uuid,
    pub status: CartStatus,
    pub items: Vec<CartItemView>,
    pub item_count: i32,
    pub totals: TotalsView,
    pub expires_at: DateTime<Utc>,
}

/// Server-side carts for registered customers and guest sessions.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    policy: PricingPolicy,
    config: CartConfig,
    event_sender: Option<Arc<EventSender>>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, policy: PricingPolicy, config: CartConfig) -> Self {
        Self {
            db,
            policy,
            config,
            event_sender: None,
        }
    }

    pub fn with_event_sender(mut self, sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    fn ttl_for(&self, owner: &CartOwner) -> Duration {
        match owner {
            CartOwner::User(_) => Duration::days(self.config.user_ttl_days),
            CartOwner::Guest(_) => Duration::days(self.config.guest_ttl_days),
        }
    }

    async fn find_active<C: ConnectionTrait>(
        conn: &C,
        owner: &CartOwner,
    ) -> Result<Option<cart::Model>, ServiceError> {
        Cart::find()
            .filter(owner.condition())
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .order_by_desc(cart::Column::CreatedAt)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Returns the owner's live cart, replacing an expired one with a fresh cart.
    async fn get_or_create_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        owner: &CartOwner,
    ) -> Result<cart::Model, ServiceError> {
        let now = Utc::now();
        if let Some(existing) = Self::find_active(conn, owner).await? {
            if !existing.is_expired(now) {
                return Ok(existing);
            }
            let mut stale: cart::ActiveModel = existing.into();
            stale.status = Set(CartStatus::Expired);
            stale.updated_at = Set(now);
            stale.update(conn).await.map_err(ServiceError::db_error)?;
        }

        let (user_id, session_id) = match owner {
            CartOwner::User(id) => (Some(*id), None),
            CartOwner::Guest(session) => (None, Some(session.clone())),
        };
        cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            session_id: Set(session_id),
            status: Set(CartStatus::Active),
            subtotal_paise: Set(0),
            tax_paise: Set(0),
            shipping_paise: Set(0),
            total_paise: Set(0),
            expires_at: Set(now + self.ttl_for(owner)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)
    }

    async fn view<C: ConnectionTrait>(
        conn: &C,
        cart: cart::Model,
    ) -> Result<CartView, ServiceError> {
        let items = cart
            .find_related(CartItem)
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        let totals = Totals {
            subtotal: cart.subtotal_paise,
            tax: cart.tax_paise,
            shipping: cart.shipping_paise,
            discount: 0,
            total: cart.total_paise,
        };
        Ok(CartView {
            id: cart.id,
            status: cart.status,
            item_count: items.iter().map(|i| i.quantity).sum(),
            items: items.into_iter().map(Into::into).collect(),
            totals: totals.into(),
            expires_at: cart.expires_at,
        })
    }

    /// Recomputes totals from the stored lines and pushes expiry forward.
    async fn recalculate<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: cart::Model,
        owner: &CartOwner,
    ) -> Result<cart::Model, ServiceError> {
        let items = cart
            .find_related(CartItem)
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;
        let lines: Vec<LineAmount> = items
            .iter()
            .map(|i| LineAmount::new(i.quantity, i.unit_price_paise))
            .collect();
        let totals = calculate_totals(&lines, &self.policy);

        let now = Utc::now();
        let mut active: cart::ActiveModel = cart.into();
        active.subtotal_paise = Set(totals.subtotal);
        active.tax_paise = Set(totals.tax);
        active.shipping_paise = Set(totals.shipping);
        active.total_paise = Set(totals.total);
        active.expires_at = Set(now + self.ttl_for(owner));
        active.updated_at = Set(now);
        active.update(conn).await.map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let cart = self.get_or_create_in(&*self.db, owner).await?;
        Self::view(&*self.db, cart).await
    }

    #[instrument(skip(self, request), fields(product_id = %request.product_id))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        request: AddCartItemRequest,
    ) -> Result<CartView, ServiceError> {
        request.validate()?;

        let product = Product::find_by_id(request.product_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .filter(|p| p.is_active)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", request.product_id))
            })?;
        let available = InventoryItem::find()
            .filter(inventory_item::Column::ProductId.eq(product.id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .map(|i| i.available())
            .unwrap_or(0);

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let cart = self.get_or_create_in(&txn, owner).await?;
        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product.id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let quantity = existing.as_ref().map(|i| i.quantity).unwrap_or(0) + request.quantity;
        if quantity > MAX_LINE_QUANTITY {
            return Err(ServiceError::ValidationError(format!(
                "Quantity cannot exceed {} per item",
                MAX_LINE_QUANTITY
            )));
        }
        if quantity > available {
            return Err(ServiceError::InsufficientStock(format!(
                "Only {} units of {} are available",
                available.max(0),
                product.name
            )));
        }

        let now = Utc::now();
        match existing {
            Some(item) => {
                let unit_price = item.unit_price_paise;
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(quantity);
                item.line_total_paise = Set(unit_price * i64::from(quantity));
                item.updated_at = Set(now);
                item.update(&txn).await.map_err(ServiceError::db_error)?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product.id),
                    product_name: Set(product.name.clone()),
                    quantity: Set(quantity),
                    unit_price_paise: Set(product.price_paise),
                    line_total_paise: Set(product.price_paise * i64::from(quantity)),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            }
        }

        let cart = self.recalculate(&txn, cart, owner).await?;
        let view = Self::view(&txn, cart).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(cart_id = %view.id, product_id = %product.id, quantity, "Cart line added");
        Ok(view)
    }

    async fn owned_item<C: ConnectionTrait>(
        conn: &C,
        cart: &cart::Model,
        item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))
    }

    /// Sets a line's quantity. Zero or less removes the line.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity > MAX_LINE_QUANTITY {
            return Err(ServiceError::ValidationError(format!(
                "Quantity cannot exceed {} per item",
                MAX_LINE_QUANTITY
            )));
        }

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let cart = self.get_or_create_in(&txn, owner).await?;
        let item = Self::owned_item(&txn, &cart, item_id).await?;

        if quantity <= 0 {
            item.delete(&txn).await.map_err(ServiceError::db_error)?;
        } else {
            let available = InventoryItem::find()
                .filter(inventory_item::Column::ProductId.eq(item.product_id))
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?
                .map(|i| i.available())
                .unwrap_or(0);
            if quantity > available {
                return Err(ServiceError::InsufficientStock(format!(
                    "Only {} units of {} are available",
                    available.max(0),
                    item.product_name
                )));
            }
            let unit_price = item.unit_price_paise;
            let mut item: cart_item::ActiveModel = item.into();
            item.quantity = Set(quantity);
            item.line_total_paise = Set(unit_price * i64::from(quantity));
            item.updated_at = Set(Utc::now());
            item.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let cart = self.recalculate(&txn, cart, owner).await?;
        let view = Self::view(&txn, cart).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(view)
    }

    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        self.update_item(owner, item_id, 0).await
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, owner: &CartOwner) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let cart = self.get_or_create_in(&txn, owner).await?;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let cart = self.recalculate(&txn, cart, owner).await?;
        let view = Self::view(&txn, cart).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(view)
    }

    /// Folds a guest session's cart into the user's cart after sign-in.
    /// Quantities for products present in both are added together.
    #[instrument(skip(self, session_id))]
    pub async fn merge_guest_cart(
        &self,
        session_id: &str,
        user_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let guest = CartOwner::Guest(session_id.to_string());
        let user = CartOwner::User(user_id);
        let now = Utc::now();

        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        let user_cart = self.get_or_create_in(&txn, &user).await?;

        let guest_cart = Self::find_active(&txn, &guest)
            .await?
            .filter(|c| !c.is_expired(now));
        let Some(guest_cart) = guest_cart else {
            let view = Self::view(&txn, user_cart).await?;
            txn.commit().await.map_err(ServiceError::db_error)?;
            return Ok(view);
        };

        let guest_items = guest_cart
            .find_related(CartItem)
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let mut merged = 0usize;
        for guest_item in guest_items {
            let existing = CartItem::find()
                .filter(cart_item::Column::CartId.eq(user_cart.id))
                .filter(cart_item::Column::ProductId.eq(guest_item.product_id))
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            match existing {
                Some(item) => {
                    let quantity = (item.quantity + guest_item.quantity).min(MAX_LINE_QUANTITY);
                    let unit_price = item.unit_price_paise;
                    let mut item: cart_item::ActiveModel = item.into();
                    item.quantity = Set(quantity);
                    item.line_total_paise = Set(unit_price * i64::from(quantity));
                    item.updated_at = Set(now);
                    item.update(&txn).await.map_err(ServiceError::db_error)?;
                }
                None => {
                    cart_item::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        cart_id: Set(user_cart.id),
                        product_id: Set(guest_item.product_id),
                        product_name: Set(guest_item.product_name),
                        quantity: Set(guest_item.quantity),
                        unit_price_paise: Set(guest_item.unit_price_paise),
                        line_total_paise: Set(guest_item.line_total_paise),
                        created_at: Set(now),
                        updated_at: Set(now),
                    }
                    .insert(&txn)
                    .await
                    .map_err(ServiceError::db_error)?;
                }
            }
            merged += 1;
        }

        Cart::delete_by_id(guest_cart.id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let user_cart = self.recalculate(&txn, user_cart, &user).await?;
        let view = Self::view(&txn, user_cart).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        info!(%user_id, merged, "Guest cart merged");
        Ok(view)
    }

    /// Lines of the owner's cart, for checkout. Fails when the cart is not the
    /// owner's live cart or has nothing in it.
    pub async fn checkout_lines(
        &self,
        owner: &CartOwner,
        cart_id: Uuid,
    ) -> Result<Vec<(Uuid, i32)>, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .filter(|c| owner.owns(c))
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;
        if cart.status != CartStatus::Active || cart.is_expired(Utc::now()) {
            return Err(ServiceError::InvalidOperation(
                "Cart is no longer active".into(),
            ));
        }

        let items = cart
            .find_related(CartItem)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".into()));
        }
        Ok(items.into_iter().map(|i| (i.product_id, i.quantity)).collect())
    }

    /// Marks an active cart as checked out on the caller's connection. Fails
    /// when the cart was already converted or expired, so a concurrent second
    /// checkout of the same cart rolls back with it.
    pub async fn mark_converted<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = Cart::update_many()
            .col_expr(cart::Column::Status, Expr::value(CartStatus::Converted))
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidOperation(
                "Cart is no longer active".into(),
            ));
        }
        Ok(())
    }

    /// Flags every active cart past its expiry. Returns how many were swept.
    #[instrument(skip(self))]
    pub async fn expire_stale(&self) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let result = Cart::update_many()
            .col_expr(cart::Column::Status, Expr::value(CartStatus::Expired))
            .col_expr(cart::Column::UpdatedAt, Expr::value(now))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .filter(cart::Column::ExpiresAt.lte(now))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected > 0 {
            info!(count = result.rows_affected, "Expired stale carts");
            if let Some(sender) = &self.event_sender {
                sender.send_or_log(Event::CartsExpired {
                    count: result.rows_affected,
                    at: now,
                });
            }
        }
        Ok(result.rows_affected)
    }
}
