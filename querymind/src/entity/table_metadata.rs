use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "table_metadata")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub database_id: Uuid,
    pub schema_name: String,
    pub table_name: String,
    /// "TABLE", "VIEW" or "MATERIALIZED VIEW"
    pub table_type: String,
    pub row_count: Option<i64>,
    pub description: Option<String>,
    /// JSON array of f32, absent until computed or after the description changed.
    pub embedding: Option<String>,
    pub extracted_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::client_database::Entity",
        from = "Column::DatabaseId",
        to = "super::client_database::Column::Id",
        on_delete = "Cascade"
    )]
    ClientDatabase,
    #[sea_orm(has_many = "super::column_metadata::Entity")]
    ColumnMetadata,
}

impl Related<super::client_database::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClientDatabase.def()
    }
}

impl Related<super::column_metadata::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ColumnMetadata.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
