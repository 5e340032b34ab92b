use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // table_metadata
        manager
            .create_table(
                Table::create()
                    .table(TableMetadata::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TableMetadata::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TableMetadata::DatabaseId).uuid().not_null())
                    .col(ColumnDef::new(TableMetadata::SchemaName).string().not_null())
                    .col(ColumnDef::new(TableMetadata::TableName).string().not_null())
                    .col(ColumnDef::new(TableMetadata::TableType).string().not_null())
                    .col(ColumnDef::new(TableMetadata::RowCount).big_integer().null())
                    .col(ColumnDef::new(TableMetadata::Description).text().null())
                    .col(
                        ColumnDef::new(TableMetadata::ExtractedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(TableMetadata::Table, TableMetadata::DatabaseId)
                            .to(ClientDatabase::Table, ClientDatabase::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_table_metadata_db_schema_name")
                    .table(TableMetadata::Table)
                    .col(TableMetadata::DatabaseId)
                    .col(TableMetadata::SchemaName)
                    .col(TableMetadata::TableName)
                    .to_owned(),
            )
            .await?;

        // column_metadata
        manager
            .create_table(
                Table::create()
                    .table(ColumnMetadata::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ColumnMetadata::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ColumnMetadata::TableId).uuid().not_null())
                    .col(
                        ColumnDef::new(ColumnMetadata::ColumnName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ColumnMetadata::OrdinalPosition)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ColumnMetadata::DataType).string().not_null())
                    .col(
                        ColumnDef::new(ColumnMetadata::TypeFamily)
                            .string()
                            .not_null()
                            .default("other"),
                    )
                    .col(
                        ColumnDef::new(ColumnMetadata::IsNullable)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ColumnMetadata::IsPrimaryKey)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ColumnMetadata::IsForeignKey)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ColumnMetadata::Description).text().null())
                    .col(
                        ColumnDef::new(ColumnMetadata::ExtractedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(ColumnMetadata::Table, ColumnMetadata::TableId)
                            .to(TableMetadata::Table, TableMetadata::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_column_metadata_table_name")
                    .table(ColumnMetadata::Table)
                    .col(ColumnMetadata::TableId)
                    .col(ColumnMetadata::ColumnName)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ColumnMetadata::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TableMetadata::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ClientDatabase {
    Table,
    Id,
}

#[derive(Iden)]
enum TableMetadata {
    Table,
    Id,
    DatabaseId,
    SchemaName,
    TableName,
    TableType,
    RowCount,
    Description,
    ExtractedAt,
}

#[derive(Iden)]
enum ColumnMetadata {
    Table,
    Id,
    TableId,
    ColumnName,
    OrdinalPosition,
    DataType,
    TypeFamily,
    IsNullable,
    IsPrimaryKey,
    IsForeignKey,
    Description,
    ExtractedAt,
}
