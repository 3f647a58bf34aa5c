use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Coupons::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Coupons::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Coupons::Code)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Coupons::Description).text().null())
                    .col(ColumnDef::new(Coupons::DiscountType).string_len(20).not_null())
                    .col(ColumnDef::new(Coupons::DiscountValue).big_integer().not_null())
                    .col(ColumnDef::new(Coupons::MinimumOrderPaise).big_integer().null())
                    .col(ColumnDef::new(Coupons::MaximumDiscountPaise).big_integer().null())
                    .col(
                        ColumnDef::new(Coupons::ValidFrom)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Coupons::ValidUntil)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Coupons::UsageLimit).integer().null())
                    .col(ColumnDef::new(Coupons::UserUsageLimit).integer().null())
                    .col(
                        ColumnDef::new(Coupons::UsageCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Coupons::AllowedUsers).json().null())
                    .col(ColumnDef::new(Coupons::ExcludedUsers).json().null())
                    .col(ColumnDef::new(Coupons::ApplicableProducts).json().null())
                    .col(ColumnDef::new(Coupons::ExcludedProducts).json().null())
                    .col(
                        ColumnDef::new(Coupons::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Coupons::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Coupons::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserCoupons::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserCoupons::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(UserCoupons::UserId).uuid().not_null())
                    .col(ColumnDef::new(UserCoupons::CouponId).uuid().not_null())
                    .col(
                        ColumnDef::new(UserCoupons::UsageCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserCoupons::LastUsedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_user_coupons_coupon_id")
                            .from(UserCoupons::Table, UserCoupons::CouponId)
                            .to(Coupons::Table, Coupons::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_coupons_user_coupon")
                    .table(UserCoupons::Table)
                    .col(UserCoupons::UserId)
                    .col(UserCoupons::CouponId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserCoupons::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Coupons::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Coupons {
    Table,
    Id,
    Code,
    Description,
    DiscountType,
    DiscountValue,
    MinimumOrderPaise,
    MaximumDiscountPaise,
    ValidFrom,
    ValidUntil,
    UsageLimit,
    UserUsageLimit,
    UsageCount,
    AllowedUsers,
    ExcludedUsers,
    ApplicableProducts,
    ExcludedProducts,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum UserCoupons {
    Table,
    Id,
    UserId,
    CouponId,
    UsageCount,
    LastUsedAt,
}
