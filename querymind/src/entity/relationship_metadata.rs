use sea_orm::entity::prelude::*;
use uuid::Uuid;

/// Directed edge from a referencing column to the column it references.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "relationship_metadata")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub from_column_id: Uuid,
    pub to_column_id: Uuid,
    /// "many_to_one", or "one_to_one" when the referencing column is also its table's primary key.
    pub relationship_type: String,
    /// True when derived from naming conventions rather than a declared constraint.
    pub is_inferred: bool,
    /// Recorded by a user; re-extraction never removes it.
    pub is_manual: bool,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::column_metadata::Entity",
        from = "Column::FromColumnId",
        to = "super::column_metadata::Column::Id",
        on_delete = "Cascade"
    )]
    FromColumn,
    #[sea_orm(
        belongs_to = "super::column_metadata::Entity",
        from = "Column::ToColumnId",
        to = "super::column_metadata::Column::Id",
        on_delete = "Cascade"
    )]
    ToColumn,
}

impl ActiveModelBehavior for ActiveModel {}
