// Money and promotions
pub mod coupons;
pub mod pricing;

// Catalogue and stock
pub mod inventory;
pub mod products;

// Customer-facing
pub mod addresses;
pub mod carts;
pub mod orders;

// Back office
pub mod audit;
