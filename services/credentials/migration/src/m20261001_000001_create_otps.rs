use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Otps::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Otps::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Otps::Email).string().not_null())
                    .col(ColumnDef::new(Otps::Purpose).string().not_null())
                    .col(ColumnDef::new(Otps::Code).string().not_null())
                    .col(
                        ColumnDef::new(Otps::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Otps::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Otps::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Otps::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One live OTP per (email, purpose).
        manager
            .create_index(
                Index::create()
                    .table(Otps::Table)
                    .col(Otps::Email)
                    .col(Otps::Purpose)
                    .unique()
                    .name("uq_otps_email_purpose")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(Otps::Table)
                    .col(Otps::ExpiresAt)
                    .name("idx_otps_expires_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Otps::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Otps {
    Table,
    Id,
    Email,
    Purpose,
    Code,
    Attempts,
    CreatedAt,
    UpdatedAt,
    ExpiresAt,
}
