use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ClientDatabase::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClientDatabase::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ClientDatabase::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(ClientDatabase::Name).string().not_null())
                    .col(ColumnDef::new(ClientDatabase::Engine).string().not_null())
                    .col(
                        ColumnDef::new(ClientDatabase::Config)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(
                        ColumnDef::new(ClientDatabase::SecureConfig)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(ClientDatabase::LastExtractedAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ClientDatabase::LastExtractionResult)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ClientDatabase::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ClientDatabase::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Display names are unique per owner, not globally.
        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_client_database_owner_name")
                    .table(ClientDatabase::Table)
                    .col(ClientDatabase::OwnerId)
                    .col(ClientDatabase::Name)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ClientDatabase::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ClientDatabase {
    Table,
    Id,
    OwnerId,
    Name,
    Engine,
    Config,
    SecureConfig,
    LastExtractedAt,
    LastExtractionResult,
    CreatedAt,
    UpdatedAt,
}
