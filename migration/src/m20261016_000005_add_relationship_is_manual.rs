use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(RelationshipMetadata::Table)
                    .add_column(
                        ColumnDef::new(RelationshipMetadata::IsManual)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(RelationshipMetadata::Table)
                    .drop_column(RelationshipMetadata::IsManual)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
enum RelationshipMetadata {
    Table,
    IsManual,
}
