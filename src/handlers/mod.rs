use crate::{
    auth::GuestIdentity,
    cache::CouponCache,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    notifications::NotificationDispatcher,
    services::{
        addresses::AddressService, audit::AuditService, carts::CartService,
        coupons::CouponService, inventory::InventoryService, orders::OrderService,
        pricing::PricingPolicy, products::ProductService,
    },
};
use std::sync::Arc;

pub mod addresses;
pub mod audit;
pub mod carts;
pub mod common;
pub mod coupons;
pub mod health;
pub mod inventory;
pub mod orders;
pub mod products;

/// Service container shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<ProductService>,
    pub inventory: Arc<InventoryService>,
    pub coupons: Arc<CouponService>,
    pub carts: Arc<CartService>,
    pub addresses: Arc<AddressService>,
    pub orders: Arc<OrderService>,
    pub audit: Arc<AuditService>,
}

impl AppServices {
    /// Wires every service over one pool. The dispatcher is passed in so
    /// callers choose real providers or test doubles.
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: Arc<EventSender>,
        notifier: Arc<NotificationDispatcher>,
    ) -> Self {
        let policy = PricingPolicy::from(&config.pricing);
        let coupon_cache = Arc::new(CouponCache::new(config.coupon_cache_ttl()));

        let products = ProductService::new(db_pool.clone());
        let inventory =
            InventoryService::new(db_pool.clone()).with_event_sender(event_sender.clone());
        let coupons = CouponService::new(db_pool.clone(), coupon_cache)
            .with_event_sender(event_sender.clone());
        let carts = CartService::new(db_pool.clone(), policy, config.carts.clone())
            .with_event_sender(event_sender.clone());
        let addresses = AddressService::new(db_pool.clone());
        let orders = OrderService::new(
            db_pool.clone(),
            products.clone(),
            inventory.clone(),
            coupons.clone(),
            carts.clone(),
            addresses.clone(),
            notifier,
            GuestIdentity::new(&config.guest_identity_secret),
            policy,
        )
        .with_event_sender(event_sender.clone());
        let audit =
            AuditService::new(db_pool, config.audit.clone()).with_event_sender(event_sender);

        Self {
            products: Arc::new(products),
            inventory: Arc::new(inventory),
            coupons: Arc::new(coupons),
            carts: Arc::new(carts),
            addresses: Arc::new(addresses),
            orders: Arc::new(orders),
            audit: Arc::new(audit),
        }
    }
}
