//! Migration to create the repository_connections table.
//!
//! Each row links a user to one GitHub repository, holds the encrypted access
//! token, and embeds the most recently synced commits, pull requests and issues.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RepositoryConnections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RepositoryConnections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::UserId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::FullName)
                            .string_len(140)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::AccessToken)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::SyncStatus)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::SyncError)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::LastSyncTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::Commits)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::PullRequests)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::Issues)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(RepositoryConnections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // full_name is unique across the whole system, not per user
        manager
            .create_index(
                Index::create()
                    .name("idx_repository_connections_full_name")
                    .table(RepositoryConnections::Table)
                    .col(RepositoryConnections::FullName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_repository_connections_user_id")
                    .table(RepositoryConnections::Table)
                    .col(RepositoryConnections::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_repository_connections_active_last_sync")
                    .table(RepositoryConnections::Table)
                    .col(RepositoryConnections::IsActive)
                    .col(RepositoryConnections::LastSyncTime)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_repository_connections_active_last_sync",
            "idx_repository_connections_user_id",
            "idx_repository_connections_full_name",
        ] {
            manager
                .drop_index(
                    Index::drop()
                        .name(name)
                        .table(RepositoryConnections::Table)
                        .to_owned(),
                )
                .await?;
        }

        manager
            .drop_table(
                Table::drop()
                    .table(RepositoryConnections::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum RepositoryConnections {
    Table,
    Id,
    UserId,
    FullName,
    AccessToken,
    IsActive,
    SyncStatus,
    SyncError,
    LastSyncTime,
    Commits,
    PullRequests,
    Issues,
    CreatedAt,
    UpdatedAt,
}
