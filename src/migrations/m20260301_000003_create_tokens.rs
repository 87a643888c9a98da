//! Migration: Create onboarding tokens table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tokens::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Tokens::Token)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Tokens::Status)
                            .string_len(16)
                            .not_null()
                            .default("Active"),
                    )
                    .col(ColumnDef::new(Tokens::Duration).string_len(16).not_null())
                    .col(ColumnDef::new(Tokens::UserId).big_integer().null())
                    .col(
                        ColumnDef::new(Tokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Tokens::Table, Tokens::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tokens_user_status")
                    .table(Tokens::Table)
                    .col(Tokens::UserId)
                    .col(Tokens::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tokens::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Tokens {
    Table,
    Id,
    Token,
    Status,
    Duration,
    #[iden = "user_id"]
    UserId,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "expires_at"]
    ExpiresAt,
}

#[derive(Iden)]
pub enum Users {
    Table,
    Id,
}
