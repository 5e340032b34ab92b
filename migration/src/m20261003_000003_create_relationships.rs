use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RelationshipMetadata::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RelationshipMetadata::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RelationshipMetadata::FromColumnId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RelationshipMetadata::ToColumnId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RelationshipMetadata::RelationshipType)
                            .string()
                            .not_null()
                            .default("many_to_one"),
                    )
                    .col(
                        ColumnDef::new(RelationshipMetadata::IsInferred)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RelationshipMetadata::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(
                                RelationshipMetadata::Table,
                                RelationshipMetadata::FromColumnId,
                            )
                            .to(ColumnMetadata::Table, ColumnMetadata::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(RelationshipMetadata::Table, RelationshipMetadata::ToColumnId)
                            .to(ColumnMetadata::Table, ColumnMetadata::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_relationship_metadata_from_to")
                    .table(RelationshipMetadata::Table)
                    .col(RelationshipMetadata::FromColumnId)
                    .col(RelationshipMetadata::ToColumnId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RelationshipMetadata::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ColumnMetadata {
    Table,
    Id,
}

#[derive(Iden)]
enum RelationshipMetadata {
    Table,
    Id,
    FromColumnId,
    ToColumnId,
    RelationshipType,
    IsInferred,
    CreatedAt,
}
