use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CustomerAddresses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CustomerAddresses::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CustomerAddresses::UserId).uuid().not_null())
                    .col(ColumnDef::new(CustomerAddresses::FullName).string().not_null())
                    .col(
                        ColumnDef::new(CustomerAddresses::Phone)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CustomerAddresses::Line1).string().not_null())
                    .col(ColumnDef::new(CustomerAddresses::Line2).string().null())
                    .col(ColumnDef::new(CustomerAddresses::City).string().not_null())
                    .col(ColumnDef::new(CustomerAddresses::State).string().not_null())
                    .col(
                        ColumnDef::new(CustomerAddresses::PostalCode)
                            .string_len(12)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomerAddresses::Country)
                            .string_len(2)
                            .not_null()
                            .default("IN"),
                    )
                    .col(
                        ColumnDef::new(CustomerAddresses::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(CustomerAddresses::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CustomerAddresses::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customer_addresses_user_id")
                    .table(CustomerAddresses::Table)
                    .col(CustomerAddresses::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CustomerAddresses::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CustomerAddresses {
    Table,
    Id,
    UserId,
    FullName,
    Phone,
    Line1,
    Line2,
    City,
    State,
    PostalCode,
    Country,
    IsDefault,
    CreatedAt,
    UpdatedAt,
}
