pub mod admin_session;
pub mod audit_log;
pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod customer_address;
pub mod inventory_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod security_event;
pub mod user_coupon;
