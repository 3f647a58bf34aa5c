pub use sea_orm_migration::prelude::*;

mod m20250101_000001_create_products_and_inventory;
mod m20250101_000002_create_coupons;
mod m20250101_000003_create_orders;
mod m20250101_000004_create_carts;
mod m20250101_000005_create_customer_addresses;
mod m20250101_000006_create_audit_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_products_and_inventory::Migration),
            Box::new(m20250101_000002_create_coupons::Migration),
            Box::new(m20250101_000003_create_orders::Migration),
            Box::new(m20250101_000004_create_carts::Migration),
            Box::new(m20250101_000005_create_customer_addresses::Migration),
            Box::new(m20250101_000006_create_audit_tables::Migration),
        ]
    }
}
