use crate::{
    auth::GuestIdentity,
    entities::{
        order::{self, Entity as Order, OrderStatus, PaymentStatus},
        order_item::{self, Entity as OrderItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{DispatchReport, NotificationDispatcher},
    services::{
        addresses::{AddressDetails, AddressService},
        carts::{CartOwner, CartService},
        coupons::{CouponContext, CouponService},
        inventory::InventoryService,
        pricing::{calculate_totals, paise_to_rupees, LineAmount, PricingPolicy},
        products::ProductService,
    },
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Alias, Expr},
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction,
    EntityTrait, FromQueryResult, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// `ORD-<base36 millis>-<6 random base36>`, upper-cased.
pub fn generate_confirmation_number() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("ORD-{}-{}", to_base36(millis), suffix).to_uppercase()
}

/// Allowed lifecycle moves. Re-applying the current status is allowed so
/// tracking details can be amended.
pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    from == to
        || matches!(
            (from, to),
            (Pending, Processing | Cancelled | Refunded)
                | (Processing, Shipped | Cancelled | Refunded)
                | (Shipped, Delivered)
        )
}

fn cancel_refusal(status: OrderStatus) -> Option<&'static str> {
    match status {
        OrderStatus::Pending | OrderStatus::Processing => None,
        OrderStatus::Shipped => Some("Order has already been shipped and cannot be cancelled"),
        OrderStatus::Delivered => Some("Order has already been delivered and cannot be cancelled"),
        OrderStatus::Cancelled => Some("Order is already cancelled"),
        OrderStatus::Refunded => Some("Order has already been refunded"),
    }
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// Compares phone numbers on their last ten digits so `+91` prefixes and
/// separators do not matter.
fn same_phone(a: &str, b: &str) -> bool {
    let (a, b) = (digits(a), digits(b));
    if a.len() < 10 || b.len() < 10 {
        return false;
    }
    a[a.len() - 10..] == b[b.len() - 10..]
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 100, message = "Quantity must be between 1 and 100"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Explicit lines; when empty the lines of `cart_id` are used
    #[serde(default)]
    #[validate]
    pub items: Vec<CheckoutItem>,
    pub cart_id: Option<Uuid>,
    #[validate(length(min = 1, max = 120, message = "Customer name is required"))]
    pub customer_name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub customer_email: String,
    #[validate(length(min = 10, max = 16, message = "A valid phone number is required"))]
    pub customer_phone: String,
    #[validate]
    pub shipping_address: Option<AddressDetails>,
    /// Saved address of a signed-in customer
    pub shipping_address_id: Option<Uuid>,
    #[validate]
    pub billing_address: Option<AddressDetails>,
    pub coupon_code: Option<String>,
    #[validate(length(max = 32))]
    pub payment_method: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    #[validate(length(min = 1, max = 64, message = "Tracking number must be 1-64 characters"))]
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GuestLookupQuery {
    pub confirmation_number: String,
    pub email: String,
    pub phone: String,
}

/// Admin order search. Every set field narrows the result.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub customer_id: Option<String>,
    pub email: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    /// Matches confirmation number or customer name
    pub search: Option<String>,
}

impl OrderFilter {
    pub fn condition(&self) -> Condition {
        let mut cond = Condition::all();
        if let Some(status) = self.status {
            cond = cond.add(order::Column::Status.eq(status));
        }
        if let Some(payment_status) = self.payment_status {
            cond = cond.add(order::Column::PaymentStatus.eq(payment_status));
        }
        if let Some(customer_id) = &self.customer_id {
            cond = cond.add(order::Column::CustomerId.eq(customer_id.as_str()));
        }
        if let Some(email) = &self.email {
            cond = cond.add(order::Column::CustomerEmail.eq(email.trim().to_lowercase()));
        }
        if let Some(from) = self.created_from {
            cond = cond.add(order::Column::CreatedAt.gte(from));
        }
        if let Some(to) = self.created_to {
            cond = cond.add(order::Column::CreatedAt.lte(to));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            cond = cond.add(
                Condition::any()
                    .add(order::Column::ConfirmationNumber.contains(search.to_uppercase()))
                    .add(order::Column::CustomerName.contains(search)),
            );
        }
        cond
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl From<order_item::Model> for OrderItemView {
    fn from(i: order_item::Model) -> Self {
        Self {
            id: i.id,
            product_id: i.product_id,
            product_name: i.product_name,
            sku: i.sku,
            quantity: i.quantity,
            unit_price: paise_to_rupees(i.unit_price_paise),
            total_price: paise_to_rupees(i.total_price_paise),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub id: Uuid,
    pub confirmation_number: String,
    pub customer_id: String,
    pub is_guest: bool,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<String>,
    pub shipping_address: Option<AddressDetails>,
    pub billing_address: Option<AddressDetails>,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<OrderItemView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderView {
    pub fn build(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            shipping_address: AddressDetails::from_json(&order.shipping_address),
            billing_address: AddressDetails::from_json(&order.billing_address),
            id: order.id,
            confirmation_number: order.confirmation_number,
            customer_id: order.customer_id,
            is_guest: order.is_guest,
            customer_name: order.customer_name,
            customer_email: order.customer_email,
            customer_phone: order.customer_phone,
            status: order.status,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            subtotal: paise_to_rupees(order.subtotal_paise),
            tax: paise_to_rupees(order.tax_paise),
            shipping: paise_to_rupees(order.shipping_paise),
            discount: paise_to_rupees(order.discount_paise),
            total: paise_to_rupees(order.total_paise),
            coupon_code: order.coupon_code,
            tracking_number: order.tracking_number,
            estimated_delivery: order.estimated_delivery,
            notes: order.notes,
            cancellation_reason: order.cancellation_reason,
            items: items.into_iter().map(Into::into).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromQueryResult)]
struct CustomerSummaryRow {
    customer_id: String,
    customer_name: Option<String>,
    customer_email: Option<String>,
    order_count: i64,
    total_spent_paise: Option<i64>,
    last_order_at: Option<DateTime<Utc>>,
}

/// Per-customer rollup for the admin customers view.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub customer_id: String,
    pub is_guest: bool,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub order_count: i64,
    pub total_spent: Decimal,
    pub last_order_at: Option<DateTime<Utc>>,
}

impl From<CustomerSummaryRow> for CustomerSummary {
    fn from(row: CustomerSummaryRow) -> Self {
        Self {
            is_guest: row.customer_id.starts_with("guest_"),
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            order_count: row.order_count,
            total_spent: paise_to_rupees(row.total_spent_paise.unwrap_or(0)),
            last_order_at: row.last_order_at,
        }
    }
}

/// Who is asking for a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelRequester {
    Customer(Uuid),
    Admin(Uuid),
}

/// Everything the order writer needs to persist one checkout.
struct PreparedOrder {
    header: order::ActiveModel,
    items: Vec<order_item::ActiveModel>,
    coupon: Option<crate::entities::coupon::Model>,
    user_id: Option<Uuid>,
    cart_id: Option<Uuid>,
}

/// Checkout, order lifecycle and order queries.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    products: ProductService,
    inventory: InventoryService,
    coupons: CouponService,
    carts: CartService,
    addresses: AddressService,
    notifier: Arc<NotificationDispatcher>,
    guests: GuestIdentity,
    policy: PricingPolicy,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DatabaseConnection>,
        products: ProductService,
        inventory: InventoryService,
        coupons: CouponService,
        carts: CartService,
        addresses: AddressService,
        notifier: Arc<NotificationDispatcher>,
        guests: GuestIdentity,
        policy: PricingPolicy,
    ) -> Self {
        Self {
            db,
            products,
            inventory,
            coupons,
            carts,
            addresses,
            notifier,
            guests,
            policy,
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

    async fn checkout_lines(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<&str>,
        request: &CheckoutRequest,
    ) -> Result<Vec<(Uuid, i32)>, ServiceError> {
        let raw: Vec<(Uuid, i32)> = if !request.items.is_empty() {
            request
                .items
                .iter()
                .map(|i| (i.product_id, i.quantity))
                .collect()
        } else if let Some(cart_id) = request.cart_id {
            let owner = match (user_id, session_id) {
                (Some(id), _) => CartOwner::User(id),
                (None, Some(session)) => CartOwner::Guest(session.to_string()),
                (None, None) => {
                    return Err(ServiceError::ValidationError(
                        "A session id is required to check out a guest cart".into(),
                    ))
                }
            };
            self.carts.checkout_lines(&owner, cart_id).await?
        } else {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one item".into(),
            ));
        };

        // Merge repeated products, keeping first-seen order.
        let mut merged: Vec<(Uuid, i32)> = Vec::with_capacity(raw.len());
        for (product_id, qty) in raw {
            match merged.iter_mut().find(|(id, _)| *id == product_id) {
                Some((_, existing)) => *existing += qty,
                None => merged.push((product_id, qty)),
            }
        }
        Ok(merged)
    }

    async fn resolve_shipping(
        &self,
        user_id: Option<Uuid>,
        request: &CheckoutRequest,
    ) -> Result<AddressDetails, ServiceError> {
        if let Some(address) = &request.shipping_address {
            let address = address.clone().normalized();
            address.validate()?;
            return Ok(address);
        }
        match (request.shipping_address_id, user_id) {
            (Some(address_id), Some(user_id)) => Ok(self
                .addresses
                .get_owned(user_id, address_id)
                .await?
                .into()),
            (Some(_), None) => Err(ServiceError::Unauthorized(
                "Sign in to use a saved address".into(),
            )),
            (None, _) => Err(ServiceError::ValidationError(
                "Shipping address is required".into(),
            )),
        }
    }

    /// Places an order.
    ///
    /// Prices come from the catalogue, never from the client. Stock is
    /// reserved before the order is written; if the write fails the
    /// reservations are released again. Notification outcomes are logged and
    /// never fail the checkout.
    #[instrument(skip(self, request), fields(user_id = ?user_id, order_id = tracing::field::Empty))]
    pub async fn place_order(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<&str>,
        request: CheckoutRequest,
    ) -> Result<OrderView, ServiceError> {
        request.validate()?;

        let lines = self.checkout_lines(user_id, session_id, &request).await?;
        let shipping = self.resolve_shipping(user_id, &request).await?;
        let billing = match &request.billing_address {
            Some(address) => {
                let address = address.clone().normalized();
                address.validate()?;
                address
            }
            None => shipping.clone(),
        };

        let product_ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();
        let products = self.products.active_by_ids(&product_ids).await?;
        if let Some(missing) = product_ids.iter().find(|id| !products.contains_key(id)) {
            return Err(ServiceError::ValidationError(format!(
                "Product {} is not available",
                missing
            )));
        }

        let amounts: Vec<LineAmount> = lines
            .iter()
            .map(|(id, qty)| LineAmount::new(*qty, products[id].price_paise))
            .collect();
        let mut totals = calculate_totals(&amounts, &self.policy);

        let mut coupon = None;
        if let Some(code) = request
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            let validation = self
                .coupons
                .validate(CouponContext {
                    code,
                    user_id,
                    subtotal_paise: totals.subtotal,
                    product_ids: &product_ids,
                })
                .await?;
            if !validation.is_valid {
                return Err(ServiceError::ValidationError(
                    validation.error().unwrap_or_else(|| "Invalid coupon code".into()),
                ));
            }
            totals = totals.with_discount(validation.discount_paise);
            coupon = validation.coupon;
        }

        let email = request.customer_email.trim().to_lowercase();
        let phone = digits(&request.customer_phone);
        let customer_id = match user_id {
            Some(id) => id.to_string(),
            None => self.guests.customer_id(&email, &phone),
        };

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let confirmation_number = generate_confirmation_number();
        tracing::Span::current().record("order_id", tracing::field::display(order_id));

        let header = order::ActiveModel {
            id: Set(order_id),
            confirmation_number: Set(confirmation_number.clone()),
            customer_id: Set(customer_id),
            user_id: Set(user_id),
            is_guest: Set(user_id.is_none()),
            customer_name: Set(request.customer_name.trim().to_string()),
            customer_email: Set(email),
            customer_phone: Set(phone),
            subtotal_paise: Set(totals.subtotal),
            tax_paise: Set(totals.tax),
            shipping_paise: Set(totals.shipping),
            discount_paise: Set(totals.discount),
            total_paise: Set(totals.total),
            coupon_id: Set(coupon.as_ref().map(|c| c.id)),
            coupon_code: Set(coupon.as_ref().map(|c| c.code.clone())),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(request.payment_method.clone()),
            shipping_address: Set(shipping.to_json()),
            billing_address: Set(billing.to_json()),
            tracking_number: Set(None),
            estimated_delivery: Set(None),
            notes: Set(request.notes.clone()),
            cancellation_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let items = lines
            .iter()
            .map(|(product_id, qty)| {
                let product = &products[product_id];
                order_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    order_id: Set(order_id),
                    product_id: Set(*product_id),
                    product_name: Set(product.name.clone()),
                    sku: Set(product.sku.clone()),
                    quantity: Set(*qty),
                    unit_price_paise: Set(product.price_paise),
                    total_price_paise: Set(product.price_paise * i64::from(*qty)),
                    created_at: Set(now),
                }
            })
            .collect();

        self.inventory.reserve_all(&lines).await?;

        let prepared = PreparedOrder {
            header,
            items,
            coupon,
            user_id,
            cart_id: request.cart_id.filter(|_| request.items.is_empty()),
        };
        let (order, items) = match self.write_order(prepared).await {
            Ok(written) => written,
            Err(err) => {
                error!(error = %err, "Order write failed; releasing reservations");
                if let Err(release_err) = self.inventory.release_all(&lines).await {
                    warn!(error = %release_err, "Reservation rollback incomplete");
                }
                return Err(err);
            }
        };

        counter!("storefront_orders_placed_total", 1);
        self.publish(Event::OrderPlaced {
            order_id,
            confirmation_number: confirmation_number.clone(),
            total_paise: order.total_paise,
        });
        info!(%order_id, confirmation_number = %confirmation_number, total_paise = order.total_paise, "Order placed");

        let report = self.notifier.order_confirmation(&order, &items).await;
        log_dispatch(order_id, "order_confirmation", &report);

        Ok(OrderView::build(order, items))
    }

    /// Writes header, items, coupon usage and cart conversion in one
    /// transaction.
    async fn write_order(
        &self,
        prepared: PreparedOrder,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        match self.write_order_in(&txn, prepared).await {
            Ok(written) => {
                txn.commit().await.map_err(ServiceError::db_error)?;
                Ok(written)
            }
            Err(err) => {
                if let Err(rollback) = txn.rollback().await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn write_order_in(
        &self,
        txn: &DatabaseTransaction,
        prepared: PreparedOrder,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let order = prepared
            .header
            .insert(txn)
            .await
            .map_err(ServiceError::db_error)?;

        let mut items = Vec::with_capacity(prepared.items.len());
        for item in prepared.items {
            items.push(item.insert(txn).await.map_err(ServiceError::db_error)?);
        }

        if let (Some(coupon), Some(user_id)) = (&prepared.coupon, prepared.user_id) {
            self.coupons.record_usage(txn, coupon, user_id).await?;
        }
        if let Some(cart_id) = prepared.cart_id {
            self.carts.mark_converted(txn, cart_id).await?;
        }
        Ok((order, items))
    }

    pub async fn get(&self, id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))
    }

    async fn items_of(&self, order: &order::Model) -> Result<Vec<order_item::Model>, ServiceError> {
        order
            .find_related(OrderItem)
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn get_with_items(&self, id: Uuid) -> Result<OrderView, ServiceError> {
        let order = self.get(id).await?;
        let items = self.items_of(&order).await?;
        Ok(OrderView::build(order, items))
    }

    /// A customer's own order. Someone else's order reads as not found.
    pub async fn get_for_user(&self, user_id: Uuid, id: Uuid) -> Result<OrderView, ServiceError> {
        let order = self.get(id).await?;
        if order.user_id != Some(user_id) {
            return Err(ServiceError::NotFound(format!("Order {} not found", id)));
        }
        let items = self.items_of(&order).await?;
        Ok(OrderView::build(order, items))
    }

    pub async fn list(
        &self,
        filter: &OrderFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderView>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(filter.condition())
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let orders = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((
            orders
                .into_iter()
                .map(|o| OrderView::build(o, Vec::new()))
                .collect(),
            total,
        ))
    }

    pub async fn list_for_customer(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderView>, u64), ServiceError> {
        let filter = OrderFilter {
            customer_id: Some(user_id.to_string()),
            ..Default::default()
        };
        self.list(&filter, page, limit).await
    }

    /// Guest order lookup. Email and phone must both match; any mismatch is
    /// reported exactly like a missing order.
    #[instrument(skip(self, email, phone))]
    pub async fn lookup_guest_order(
        &self,
        confirmation_number: &str,
        email: &str,
        phone: &str,
    ) -> Result<OrderView, ServiceError> {
        let not_found = || ServiceError::NotFound("Order not found".into());
        let order = Order::find()
            .filter(order::Column::ConfirmationNumber.eq(confirmation_number.trim().to_uppercase()))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(not_found)?;

        let email_matches = order
            .customer_email
            .eq_ignore_ascii_case(email.trim());
        if !email_matches || !same_phone(&order.customer_phone, phone) {
            return Err(not_found());
        }
        let items = self.items_of(&order).await?;
        Ok(OrderView::build(order, items))
    }

    /// Order count and spend per customer, biggest spenders first. Cancelled
    /// and refunded orders are left out.
    pub async fn customer_summaries(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<Vec<CustomerSummary>, ServiceError> {
        let limit = limit.max(1);
        let rows = Order::find()
            .select_only()
            .column(order::Column::CustomerId)
            .column_as(order::Column::CustomerName.max(), "customer_name")
            .column_as(order::Column::CustomerEmail.max(), "customer_email")
            .column_as(order::Column::Id.count(), "order_count")
            .column_as(
                Expr::expr(order::Column::TotalPaise.sum()).cast_as(Alias::new("BIGINT")),
                "total_spent_paise",
            )
            .column_as(order::Column::CreatedAt.max(), "last_order_at")
            .filter(
                order::Column::Status.is_not_in([OrderStatus::Cancelled, OrderStatus::Refunded]),
            )
            .group_by(order::Column::CustomerId)
            .order_by_desc(order::Column::TotalPaise.sum())
            .limit(limit)
            .offset(page.saturating_sub(1) * limit)
            .into_model::<CustomerSummaryRow>()
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    fn inventory_lines(items: &[order_item::Model]) -> Vec<(Uuid, i32)> {
        items.iter().map(|i| (i.product_id, i.quantity)).collect()
    }

    /// Moves `order` from its current status to `to` with a guarded update,
    /// so a concurrent change makes this one fail instead of overwriting it.
    async fn apply_status(
        &self,
        order: &order::Model,
        to: OrderStatus,
        changes: StatusChanges,
    ) -> Result<order::Model, ServiceError> {
        let mut update = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(to))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(order.status));
        if let Some(tracking) = changes.tracking_number {
            update = update.col_expr(order::Column::TrackingNumber, Expr::value(tracking));
        }
        if let Some(eta) = changes.estimated_delivery {
            update = update.col_expr(order::Column::EstimatedDelivery, Expr::value(eta));
        }
        if let Some(notes) = changes.notes {
            update = update.col_expr(order::Column::Notes, Expr::value(notes));
        }
        if let Some(reason) = changes.cancellation_reason {
            update = update.col_expr(order::Column::CancellationReason, Expr::value(reason));
        }
        if let Some(payment_status) = changes.payment_status {
            update = update.col_expr(order::Column::PaymentStatus, Expr::value(payment_status));
        }

        let result = update
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Order was modified by another request; reload and retry".into(),
            ));
        }
        self.get(order.id).await
    }

    /// Releases or confirms stock for a status change.
    async fn adjust_inventory(&self, from: OrderStatus, to: OrderStatus, items: &[order_item::Model]) {
        if from == to {
            return;
        }
        let lines = Self::inventory_lines(items);
        let result = match to {
            OrderStatus::Delivered => self.inventory.confirm_all(&lines).await,
            OrderStatus::Cancelled | OrderStatus::Refunded
                if matches!(from, OrderStatus::Pending | OrderStatus::Processing) =>
            {
                self.inventory.release_all(&lines).await
            }
            _ => Ok(()),
        };
        if let Err(e) = result {
            warn!(error = %e, from = %from, to = %to, "Inventory adjustment incomplete");
        }
    }

    async fn notify_status(&self, order: &order::Model, items: &[order_item::Model]) {
        let (kind, report) = match order.status {
            OrderStatus::Shipped => ("order_shipped", self.notifier.order_shipped(order, items).await),
            OrderStatus::Cancelled => (
                "order_cancelled",
                self.notifier.order_cancelled(order, items).await,
            ),
            _ => ("status_update", self.notifier.status_update(order, items).await),
        };
        log_dispatch(order.id, kind, &report);
    }

    /// Admin status change.
    #[instrument(skip(self, request), fields(status = %request.status))]
    pub async fn update_status(
        &self,
        id: Uuid,
        request: UpdateOrderStatusRequest,
    ) -> Result<OrderView, ServiceError> {
        request.validate()?;
        let order = self.get(id).await?;
        let from = order.status;
        let to = request.status;
        if !can_transition(from, to) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot change order status from {} to {}",
                from, to
            )));
        }
        if to == OrderStatus::Shipped && request.tracking_number.is_none() && order.tracking_number.is_none() {
            warn!(order_id = %id, "Order shipped without a tracking number");
        }

        let cancellation_reason = if to == OrderStatus::Cancelled && from != to {
            request.notes.clone()
        } else {
            None
        };
        let updated = self
            .apply_status(
                &order,
                to,
                StatusChanges {
                    tracking_number: request.tracking_number,
                    estimated_delivery: request.estimated_delivery,
                    notes: request.notes,
                    cancellation_reason,
                    payment_status: None,
                },
            )
            .await?;
        let items = self.items_of(&updated).await?;

        if from != to {
            self.adjust_inventory(from, to, &items).await;
            self.publish(Event::OrderStatusChanged {
                order_id: id,
                old_status: from.to_string(),
                new_status: to.to_string(),
            });
            info!(order_id = %id, from = %from, to = %to, "Order status changed");
            self.notify_status(&updated, &items).await;
        }

        Ok(OrderView::build(updated, items))
    }

    /// Cancels a pending or processing order, releasing its reservations.
    /// Notification failures never undo the cancellation.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        id: Uuid,
        reason: Option<String>,
        requester: CancelRequester,
    ) -> Result<OrderView, ServiceError> {
        let order = self.get(id).await?;
        if let CancelRequester::Customer(user_id) = requester {
            if order.user_id != Some(user_id) {
                return Err(ServiceError::NotFound(format!("Order {} not found", id)));
            }
        }
        if let Some(message) = cancel_refusal(order.status) {
            return Err(ServiceError::InvalidOperation(message.to_string()));
        }

        let from = order.status;
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let updated = self
            .apply_status(
                &order,
                OrderStatus::Cancelled,
                StatusChanges {
                    cancellation_reason: reason.clone(),
                    ..Default::default()
                },
            )
            .await?;
        let items = self.items_of(&updated).await?;

        self.adjust_inventory(from, OrderStatus::Cancelled, &items).await;
        self.publish(Event::OrderCancelled {
            order_id: id,
            reason,
        });
        info!(order_id = %id, ?requester, "Order cancelled");

        let report = self.notifier.order_cancelled(&updated, &items).await;
        log_dispatch(id, "order_cancelled", &report);

        Ok(OrderView::build(updated, items))
    }

    /// Records a payment outcome. A payment on a pending order moves it to
    /// processing; a refund on an unshipped order marks the order refunded.
    #[instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<OrderView, ServiceError> {
        let order = self.get(id).await?;
        let from = order.status;
        let to = match payment_status {
            PaymentStatus::Paid if from == OrderStatus::Pending => OrderStatus::Processing,
            PaymentStatus::Refunded
                if from != OrderStatus::Refunded && can_transition(from, OrderStatus::Refunded) =>
            {
                OrderStatus::Refunded
            }
            _ => from,
        };

        let updated = self
            .apply_status(
                &order,
                to,
                StatusChanges {
                    payment_status: Some(payment_status),
                    ..Default::default()
                },
            )
            .await?;
        let items = self.items_of(&updated).await?;

        self.publish(Event::PaymentStatusChanged {
            order_id: id,
            payment_status: payment_status.to_string(),
        });
        if from != to {
            self.adjust_inventory(from, to, &items).await;
            self.publish(Event::OrderStatusChanged {
                order_id: id,
                old_status: from.to_string(),
                new_status: to.to_string(),
            });
            self.notify_status(&updated, &items).await;
        }
        info!(order_id = %id, payment_status = %payment_status, status = %to, "Payment status recorded");

        Ok(OrderView::build(updated, items))
    }
}

#[derive(Debug, Default)]
struct StatusChanges {
    tracking_number: Option<String>,
    estimated_delivery: Option<DateTime<Utc>>,
    notes: Option<String>,
    cancellation_reason: Option<String>,
    payment_status: Option<PaymentStatus>,
}

fn log_dispatch(order_id: Uuid, kind: &str, report: &DispatchReport) {
    info!(%order_id, kind, email = ?report.email, sms = ?report.sms, "Notification dispatch finished");
}
