use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // SQLite only accepts one column per ALTER TABLE.
        manager
            .alter_table(
                Table::alter()
                    .table(TableMetadata::Table)
                    .add_column(ColumnDef::new(TableMetadata::Embedding).text().null())
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(ColumnMetadata::Table)
                    .add_column(ColumnDef::new(ColumnMetadata::Embedding).text().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(ColumnMetadata::Table)
                    .drop_column(ColumnMetadata::Embedding)
                    .to_owned(),
            )
            .await?;
        manager
            .alter_table(
                Table::alter()
                    .table(TableMetadata::Table)
                    .drop_column(TableMetadata::Embedding)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum TableMetadata {
    Table,
    Embedding,
}

#[derive(Iden)]
enum ColumnMetadata {
    Table,
    Embedding,
}
