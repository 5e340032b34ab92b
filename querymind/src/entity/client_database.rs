use sea_orm::entity::prelude::*;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "client_database")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Opaque identity of the owning user, issued by the identity layer.
    pub owner_id: Uuid,
    pub name: String,
    /// "postgres", "mysql" or "sqlite"
    pub engine: String,
    /// JSON text: non-secret connection params (host, port, database, username, path, ...)
    pub config: String,
    /// AES-256-GCM encrypted base64: secret params (password)
    pub secure_config: String,
    pub last_extracted_at: Option<DateTime>,
    /// JSON text of the last extraction report
    pub last_extraction_result: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::table_metadata::Entity")]
    TableMetadata,
}

impl Related<super::table_metadata::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TableMetadata.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
