use chrono::{NaiveDateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::discovery::{DiscoveredColumn, DiscoveredTable, TypeFamily};
use crate::entity::{client_database, column_metadata, relationship_metadata, table_metadata};

/// Namespace for deterministic metadata ids derived from natural keys.
const METADATA_NS: Uuid = Uuid::from_bytes([
    0x5c, 0x1e, 0x7a, 0x42, 0x93, 0x0d, 0x4b, 0x61, 0x8f, 0x2a, 0xd4, 0x6e, 0x11, 0x37, 0xc9, 0x08,
]);

pub const MANY_TO_ONE: &str = "many_to_one";
pub const ONE_TO_ONE: &str = "one_to_one";

// ---------- errors ----------

#[derive(Debug)]
pub enum StoreError {
    Db(DbErr),
    NotFound(String),
    InvalidRelationship(String),
    UnsupportedKind(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Db(e) => write!(f, "Metadata store error: {e}"),
            StoreError::NotFound(what) => write!(f, "{what} not found"),
            StoreError::InvalidRelationship(msg) => write!(f, "Invalid relationship: {msg}"),
            StoreError::UnsupportedKind(kind) => {
                write!(f, "Descriptions cannot be stored for '{kind}' metadata")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<DbErr> for StoreError {
    fn from(e: DbErr) -> Self {
        StoreError::Db(e)
    }
}

// ---------- kinds ----------

/// The three kinds of metadata element a description can be about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataKind {
    Table,
    Column,
    Relationship,
}

impl MetadataKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "table" => Some(Self::Table),
            "column" => Some(Self::Column),
            "relationship" => Some(Self::Relationship),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Column => "column",
            Self::Relationship => "relationship",
        }
    }
}

/// Whether an upsert created a row or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Updated,
}

// ---------- ids ----------

pub fn table_uuid(database_id: Uuid, schema_name: &str, table_name: &str) -> Uuid {
    let key = format!("{database_id}:{schema_name}:{table_name}");
    Uuid::new_v5(&METADATA_NS, key.as_bytes())
}

pub fn column_uuid(table_id: Uuid, column_name: &str) -> Uuid {
    let key = format!("{table_id}:{column_name}");
    Uuid::new_v5(&METADATA_NS, key.as_bytes())
}

fn relationship_uuid(from_column_id: Uuid, to_column_id: Uuid) -> Uuid {
    let key = format!("{from_column_id}->{to_column_id}");
    Uuid::new_v5(&METADATA_NS, key.as_bytes())
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

// ---------- client databases ----------

pub async fn find_database<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
) -> Result<Option<client_database::Model>, StoreError> {
    Ok(client_database::Entity::find_by_id(id).one(db).await?)
}

/// A database the caller does not own is indistinguishable from a missing one.
pub async fn find_owned_database<C: ConnectionTrait>(
    db: &C,
    id: Uuid,
    owner_id: Uuid,
) -> Result<client_database::Model, StoreError> {
    client_database::Entity::find_by_id(id)
        .filter(client_database::Column::OwnerId.eq(owner_id))
        .one(db)
        .await?
        .ok_or_else(|| StoreError::NotFound("Database".to_string()))
}

pub async fn list_databases<C: ConnectionTrait>(
    db: &C,
    owner_id: Uuid,
) -> Result<Vec<client_database::Model>, StoreError> {
    Ok(client_database::Entity::find()
        .filter(client_database::Column::OwnerId.eq(owner_id))
        .order_by_asc(client_database::Column::Name)
        .all(db)
        .await?)
}

// ---------- reads ----------

pub async fn tables_for_database<C: ConnectionTrait>(
    db: &C,
    database_id: Uuid,
) -> Result<Vec<table_metadata::Model>, StoreError> {
    Ok(table_metadata::Entity::find()
        .filter(table_metadata::Column::DatabaseId.eq(database_id))
        .order_by_asc(table_metadata::Column::SchemaName)
        .order_by_asc(table_metadata::Column::TableName)
        .all(db)
        .await?)
}

pub async fn columns_for_table<C: ConnectionTrait>(
    db: &C,
    table_id: Uuid,
) -> Result<Vec<column_metadata::Model>, StoreError> {
    Ok(column_metadata::Entity::find()
        .filter(column_metadata::Column::TableId.eq(table_id))
        .order_by_asc(column_metadata::Column::OrdinalPosition)
        .all(db)
        .await?)
}

pub async fn table_by_name<C: ConnectionTrait>(
    db: &C,
    database_id: Uuid,
    schema_name: &str,
    table_name: &str,
) -> Result<Option<table_metadata::Model>, StoreError> {
    Ok(table_metadata::Entity::find()
        .filter(table_metadata::Column::DatabaseId.eq(database_id))
        .filter(table_metadata::Column::SchemaName.eq(schema_name))
        .filter(table_metadata::Column::TableName.eq(table_name))
        .one(db)
        .await?)
}

/// Resolve a table by name alone; the first schema in order wins when several match.
pub async fn table_by_bare_name<C: ConnectionTrait>(
    db: &C,
    database_id: Uuid,
    table_name: &str,
) -> Result<Option<table_metadata::Model>, StoreError> {
    Ok(table_metadata::Entity::find()
        .filter(table_metadata::Column::DatabaseId.eq(database_id))
        .filter(table_metadata::Column::TableName.eq(table_name))
        .order_by_asc(table_metadata::Column::SchemaName)
        .one(db)
        .await?)
}

pub async fn column_by_name<C: ConnectionTrait>(
    db: &C,
    table_id: Uuid,
    column_name: &str,
) -> Result<Option<column_metadata::Model>, StoreError> {
    Ok(column_metadata::Entity::find()
        .filter(column_metadata::Column::TableId.eq(table_id))
        .filter(column_metadata::Column::ColumnName.eq(column_name))
        .one(db)
        .await?)
}

/// Every table of the database with its columns, ordered by schema, table and ordinal.
pub async fn tables_with_columns<C: ConnectionTrait>(
    db: &C,
    database_id: Uuid,
) -> Result<Vec<(table_metadata::Model, Vec<column_metadata::Model>)>, StoreError> {
    let tables = tables_for_database(db, database_id).await?;
    if tables.is_empty() {
        return Ok(Vec::new());
    }

    let table_ids: Vec<Uuid> = tables.iter().map(|t| t.id).collect();
    let mut by_table: HashMap<Uuid, Vec<column_metadata::Model>> = HashMap::new();
    for col in column_metadata::Entity::find()
        .filter(column_metadata::Column::TableId.is_in(table_ids))
        .order_by_asc(column_metadata::Column::OrdinalPosition)
        .all(db)
        .await?
    {
        by_table.entry(col.table_id).or_default().push(col);
    }

    Ok(tables
        .into_iter()
        .map(|t| {
            let cols = by_table.remove(&t.id).unwrap_or_default();
            (t, cols)
        })
        .collect())
}

// ---------- upserts ----------

/// Insert or refresh a discovered table. Never touches `description`.
pub async fn upsert_table<C: ConnectionTrait>(
    db: &C,
    database_id: Uuid,
    table: &DiscoveredTable,
) -> Result<(table_metadata::Model, Upserted), StoreError> {
    let now = now();
    match table_by_name(db, database_id, &table.schema_name, &table.table_name).await? {
        Some(existing) => {
            let mut active: table_metadata::ActiveModel = existing.into();
            active.table_type = Set(table.table_type.clone());
            active.row_count = Set(table.row_count);
            active.extracted_at = Set(now);
            Ok((active.update(db).await?, Upserted::Updated))
        }
        None => {
            let model = table_metadata::ActiveModel {
                id: Set(table_uuid(database_id, &table.schema_name, &table.table_name)),
                database_id: Set(database_id),
                schema_name: Set(table.schema_name.clone()),
                table_name: Set(table.table_name.clone()),
                table_type: Set(table.table_type.clone()),
                row_count: Set(table.row_count),
                description: Set(None),
                embedding: Set(None),
                extracted_at: Set(now),
            }
            .insert(db)
            .await?;
            Ok((model, Upserted::Inserted))
        }
    }
}

/// Insert or refresh a discovered column. Never touches `description` or `is_foreign_key`.
pub async fn upsert_column<C: ConnectionTrait>(
    db: &C,
    table_id: Uuid,
    column: &DiscoveredColumn,
) -> Result<(column_metadata::Model, Upserted), StoreError> {
    let now = now();
    let family = TypeFamily::from_engine_type(&column.data_type).as_str();
    match column_by_name(db, table_id, &column.column_name).await? {
        Some(existing) => {
            let mut active: column_metadata::ActiveModel = existing.into();
            active.ordinal_position = Set(column.ordinal_position);
            active.data_type = Set(column.data_type.clone());
            active.type_family = Set(family.to_string());
            active.is_nullable = Set(column.is_nullable);
            active.is_primary_key = Set(column.is_primary_key);
            active.extracted_at = Set(now);
            Ok((active.update(db).await?, Upserted::Updated))
        }
        None => {
            let model = column_metadata::ActiveModel {
                id: Set(column_uuid(table_id, &column.column_name)),
                table_id: Set(table_id),
                column_name: Set(column.column_name.clone()),
                ordinal_position: Set(column.ordinal_position),
                data_type: Set(column.data_type.clone()),
                type_family: Set(family.to_string()),
                is_nullable: Set(column.is_nullable),
                is_primary_key: Set(column.is_primary_key),
                is_foreign_key: Set(false),
                description: Set(None),
                embedding: Set(None),
                extracted_at: Set(now),
            }
            .insert(db)
            .await?;
            Ok((model, Upserted::Inserted))
        }
    }
}

/// Set the foreign-key flag on a referencing column if it is not set yet.
pub async fn mark_foreign_key<C: ConnectionTrait>(
    db: &C,
    column: column_metadata::Model,
) -> Result<(), StoreError> {
    if column.is_foreign_key {
        return Ok(());
    }
    let mut active: column_metadata::ActiveModel = column.into();
    active.is_foreign_key = Set(true);
    active.update(db).await?;
    Ok(())
}

/// Where an edge came from. When the same edge is recorded twice the higher
/// rank wins: a declared constraint over a manual edge over an inferred one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EdgeOrigin {
    Inferred,
    Manual,
    Declared,
}

impl EdgeOrigin {
    fn of(edge: &relationship_metadata::Model) -> Self {
        match (edge.is_manual, edge.is_inferred) {
            (true, _) => EdgeOrigin::Manual,
            (false, true) => EdgeOrigin::Inferred,
            (false, false) => EdgeOrigin::Declared,
        }
    }
}

fn relationship_type_for(from: &column_metadata::Model) -> &'static str {
    if from.is_primary_key {
        ONE_TO_ONE
    } else {
        MANY_TO_ONE
    }
}

/// Insert or refresh the edge `from -> to` and flag the referencing column.
/// A column never relates to itself.
pub async fn upsert_relationship<C: ConnectionTrait>(
    db: &C,
    from: column_metadata::Model,
    to: &column_metadata::Model,
    origin: EdgeOrigin,
) -> Result<(relationship_metadata::Model, Upserted), StoreError> {
    if from.id == to.id {
        return Err(StoreError::InvalidRelationship(
            "a column cannot reference itself".to_string(),
        ));
    }
    let relationship_type = relationship_type_for(&from);
    let existing = relationship_metadata::Entity::find()
        .filter(relationship_metadata::Column::FromColumnId.eq(from.id))
        .filter(relationship_metadata::Column::ToColumnId.eq(to.id))
        .one(db)
        .await?;

    let from_id = from.id;
    mark_foreign_key(db, from).await?;

    match existing {
        Some(existing) => {
            let origin = origin.max(EdgeOrigin::of(&existing));
            let mut active: relationship_metadata::ActiveModel = existing.into();
            active.relationship_type = Set(relationship_type.to_string());
            active.is_inferred = Set(origin == EdgeOrigin::Inferred);
            active.is_manual = Set(origin == EdgeOrigin::Manual);
            Ok((active.update(db).await?, Upserted::Updated))
        }
        None => {
            let model = relationship_metadata::ActiveModel {
                id: Set(relationship_uuid(from_id, to.id)),
                from_column_id: Set(from_id),
                to_column_id: Set(to.id),
                relationship_type: Set(relationship_type.to_string()),
                is_inferred: Set(origin == EdgeOrigin::Inferred),
                is_manual: Set(origin == EdgeOrigin::Manual),
                created_at: Set(now()),
            }
            .insert(db)
            .await?;
            Ok((model, Upserted::Inserted))
        }
    }
}

async fn database_of_column<C: ConnectionTrait>(
    db: &C,
    column_id: Uuid,
) -> Result<Option<(column_metadata::Model, Uuid)>, StoreError> {
    let found = column_metadata::Entity::find_by_id(column_id)
        .find_also_related(table_metadata::Entity)
        .one(db)
        .await?;
    Ok(found.and_then(|(col, table)| table.map(|t| (col, t.database_id))))
}

/// Manually record a relationship between two stored columns of one database.
pub async fn create_relationship<C: ConnectionTrait>(
    db: &C,
    database_id: Uuid,
    from_column_id: Uuid,
    to_column_id: Uuid,
) -> Result<relationship_metadata::Model, StoreError> {
    if from_column_id == to_column_id {
        return Err(StoreError::InvalidRelationship(
            "a column cannot reference itself".to_string(),
        ));
    }

    let (from, from_db) = database_of_column(db, from_column_id)
        .await?
        .ok_or_else(|| StoreError::InvalidRelationship("source column does not exist".into()))?;
    let (to, to_db) = database_of_column(db, to_column_id)
        .await?
        .ok_or_else(|| StoreError::InvalidRelationship("target column does not exist".into()))?;

    if from_db != to_db {
        return Err(StoreError::InvalidRelationship(
            "columns belong to different databases".to_string(),
        ));
    }
    if from_db != database_id {
        return Err(StoreError::NotFound("Column".to_string()));
    }

    let (model, _) = upsert_relationship(db, from, &to, EdgeOrigin::Manual).await?;
    Ok(model)
}

// ---------- relationship views ----------

/// A relationship with both endpoints resolved to names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipView {
    pub id: Uuid,
    pub from_schema: String,
    pub from_table: String,
    pub from_column: String,
    pub to_schema: String,
    pub to_table: String,
    pub to_column: String,
    pub relationship_type: String,
    pub is_inferred: bool,
    pub is_manual: bool,
}

impl RelationshipView {
    /// `schema.table.column -> schema.table.column`
    pub fn label(&self) -> String {
        format!(
            "{}.{}.{} -> {}.{}.{}",
            self.from_schema,
            self.from_table,
            self.from_column,
            self.to_schema,
            self.to_table,
            self.to_column
        )
    }
}

pub async fn relationships_for_database<C: ConnectionTrait>(
    db: &C,
    database_id: Uuid,
) -> Result<Vec<RelationshipView>, StoreError> {
    let mut columns: HashMap<Uuid, (&str, &str, String)> = HashMap::new();
    let schema = tables_with_columns(db, database_id).await?;
    for (table, cols) in &schema {
        for col in cols {
            columns.insert(
                col.id,
                (
                    table.schema_name.as_str(),
                    table.table_name.as_str(),
                    col.column_name.clone(),
                ),
            );
        }
    }
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let edges = relationship_metadata::Entity::find()
        .filter(relationship_metadata::Column::FromColumnId.is_in(columns.keys().copied()))
        .all(db)
        .await?;

    let mut views: Vec<RelationshipView> = edges
        .into_iter()
        .filter_map(|edge| {
            let (from_schema, from_table, from_column) = columns.get(&edge.from_column_id)?;
            let (to_schema, to_table, to_column) = columns.get(&edge.to_column_id)?;
            Some(RelationshipView {
                id: edge.id,
                from_schema: from_schema.to_string(),
                from_table: from_table.to_string(),
                from_column: from_column.clone(),
                to_schema: to_schema.to_string(),
                to_table: to_table.to_string(),
                to_column: to_column.clone(),
                relationship_type: edge.relationship_type,
                is_inferred: edge.is_inferred,
                is_manual: edge.is_manual,
            })
        })
        .collect();

    views.sort_by(|a, b| {
        (&a.from_schema, &a.from_table, &a.from_column, &a.to_table).cmp(&(
            &b.from_schema,
            &b.from_table,
            &b.from_column,
            &b.to_table,
        ))
    });
    Ok(views)
}

/// Delete edges by id and clear the foreign-key flag of every referencing
/// column left without an outgoing edge.
pub async fn delete_relationships<C: ConnectionTrait>(
    db: &C,
    ids: &[Uuid],
) -> Result<(), StoreError> {
    if ids.is_empty() {
        return Ok(());
    }
    let edges = relationship_metadata::Entity::find()
        .filter(relationship_metadata::Column::Id.is_in(ids.iter().copied()))
        .all(db)
        .await?;
    relationship_metadata::Entity::delete_many()
        .filter(relationship_metadata::Column::Id.is_in(ids.iter().copied()))
        .exec(db)
        .await?;

    let referencing: HashSet<Uuid> = edges.iter().map(|e| e.from_column_id).collect();
    for column_id in referencing {
        let remaining = relationship_metadata::Entity::find()
            .filter(relationship_metadata::Column::FromColumnId.eq(column_id))
            .count(db)
            .await?;
        if remaining > 0 {
            continue;
        }
        if let Some(column) = column_metadata::Entity::find_by_id(column_id).one(db).await? {
            let mut active: column_metadata::ActiveModel = column.into();
            active.is_foreign_key = Set(false);
            active.update(db).await?;
        }
    }
    Ok(())
}

// ---------- descriptions and embeddings ----------

/// Replace the description of a table or column of `database_id`.
/// The stored embedding is cleared so search recomputes it.
pub async fn update_description<C: ConnectionTrait>(
    db: &C,
    database_id: Uuid,
    kind: MetadataKind,
    id: Uuid,
    description: &str,
) -> Result<(), StoreError> {
    match kind {
        MetadataKind::Table => {
            let table = table_metadata::Entity::find_by_id(id)
                .filter(table_metadata::Column::DatabaseId.eq(database_id))
                .one(db)
                .await?
                .ok_or_else(|| StoreError::NotFound("Table".to_string()))?;
            let mut active: table_metadata::ActiveModel = table.into();
            active.description = Set(Some(description.to_string()));
            active.embedding = Set(None);
            active.update(db).await?;
        }
        MetadataKind::Column => {
            let (column, owner) = database_of_column(db, id)
                .await?
                .ok_or_else(|| StoreError::NotFound("Column".to_string()))?;
            if owner != database_id {
                return Err(StoreError::NotFound("Column".to_string()));
            }
            let mut active: column_metadata::ActiveModel = column.into();
            active.description = Set(Some(description.to_string()));
            active.embedding = Set(None);
            active.update(db).await?;
        }
        MetadataKind::Relationship => {
            return Err(StoreError::UnsupportedKind(kind.as_str().to_string()));
        }
    }
    Ok(())
}

pub async fn set_table_embedding<C: ConnectionTrait>(
    db: &C,
    table: table_metadata::Model,
    embedding: Option<String>,
) -> Result<table_metadata::Model, StoreError> {
    let mut active: table_metadata::ActiveModel = table.into();
    active.embedding = Set(embedding);
    Ok(active.update(db).await?)
}

pub async fn set_column_embedding<C: ConnectionTrait>(
    db: &C,
    column: column_metadata::Model,
    embedding: Option<String>,
) -> Result<column_metadata::Model, StoreError> {
    let mut active: column_metadata::ActiveModel = column.into();
    active.embedding = Set(embedding);
    Ok(active.update(db).await?)
}

// ---------- full schema view ----------

#[derive(Debug, Clone, Serialize)]
pub struct ColumnView {
    pub id: Uuid,
    pub name: String,
    pub data_type: String,
    pub type_family: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableView {
    pub id: Uuid,
    pub schema_name: String,
    pub table_name: String,
    pub table_type: String,
    pub description: Option<String>,
    pub row_count: Option<i64>,
    pub columns: Vec<ColumnView>,
}

/// Stored schema of one database with ids, for display and editing.
pub async fn full_schema<C: ConnectionTrait>(
    db: &C,
    database_id: Uuid,
) -> Result<Vec<TableView>, StoreError> {
    Ok(tables_with_columns(db, database_id)
        .await?
        .into_iter()
        .map(|(t, cols)| TableView {
            id: t.id,
            schema_name: t.schema_name,
            table_name: t.table_name,
            table_type: t.table_type,
            description: t.description,
            row_count: t.row_count,
            columns: cols
                .into_iter()
                .map(|c| ColumnView {
                    id: c.id,
                    name: c.column_name,
                    data_type: c.data_type,
                    type_family: c.type_family,
                    is_nullable: c.is_nullable,
                    is_primary_key: c.is_primary_key,
                    is_foreign_key: c.is_foreign_key,
                    description: c.description,
                })
                .collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn table(schema: &str, name: &str, rows: Option<i64>) -> DiscoveredTable {
        DiscoveredTable {
            schema_name: schema.to_string(),
            table_name: name.to_string(),
            table_type: "TABLE".to_string(),
            row_count: rows,
        }
    }

    fn column(table: &str, name: &str, ordinal: i32, pk: bool) -> DiscoveredColumn {
        DiscoveredColumn {
            schema_name: "public".to_string(),
            table_name: table.to_string(),
            column_name: name.to_string(),
            ordinal_position: ordinal,
            data_type: "integer".to_string(),
            is_nullable: !pk,
            is_primary_key: pk,
        }
    }

    #[tokio::test]
    async fn test_upsert_table_is_idempotent_and_keeps_description() {
        let db = testing::setup_db().await;
        let database = testing::insert_database(&db, Uuid::now_v7(), "shop").await;

        let (first, outcome) = upsert_table(&db, database.id, &table("public", "orders", Some(5)))
            .await
            .unwrap();
        assert_eq!(outcome, Upserted::Inserted);

        update_description(&db, database.id, MetadataKind::Table, first.id, "Customer orders")
            .await
            .unwrap();

        let (second, outcome) = upsert_table(&db, database.id, &table("public", "orders", Some(9)))
            .await
            .unwrap();
        assert_eq!(outcome, Upserted::Updated);
        assert_eq!(second.id, first.id);
        assert_eq!(second.row_count, Some(9));
        assert_eq!(second.description.as_deref(), Some("Customer orders"));
        assert_eq!(tables_for_database(&db, database.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_columns_ordered_by_ordinal_and_type_family_stored() {
        let db = testing::setup_db().await;
        let database = testing::insert_database(&db, Uuid::now_v7(), "shop").await;
        let (t, _) = upsert_table(&db, database.id, &table("public", "orders", None))
            .await
            .unwrap();

        let mut total = column("orders", "total", 2, false);
        total.data_type = "numeric(10,2)".to_string();
        upsert_column(&db, t.id, &total).await.unwrap();
        upsert_column(&db, t.id, &column("orders", "id", 1, true))
            .await
            .unwrap();

        let cols = columns_for_table(&db, t.id).await.unwrap();
        let names: Vec<&str> = cols.iter().map(|c| c.column_name.as_str()).collect();
        assert_eq!(names, vec!["id", "total"]);
        assert_eq!(cols[1].type_family, "decimal");
    }

    #[tokio::test]
    async fn test_relationship_upsert_flags_fk_and_builds_view() {
        let db = testing::setup_db().await;
        let database = testing::insert_database(&db, Uuid::now_v7(), "shop").await;
        let (customers, _) = upsert_table(&db, database.id, &table("public", "customers", None))
            .await
            .unwrap();
        let (orders, _) = upsert_table(&db, database.id, &table("public", "orders", None))
            .await
            .unwrap();
        let (pk, _) = upsert_column(&db, customers.id, &column("customers", "id", 1, true))
            .await
            .unwrap();
        let (fk, _) = upsert_column(&db, orders.id, &column("orders", "customer_id", 2, false))
            .await
            .unwrap();

        let (_, outcome) = upsert_relationship(&db, fk.clone(), &pk, EdgeOrigin::Inferred)
            .await
            .unwrap();
        assert_eq!(outcome, Upserted::Inserted);
        let (edge, outcome) = upsert_relationship(&db, fk.clone(), &pk, EdgeOrigin::Declared)
            .await
            .unwrap();
        assert_eq!(outcome, Upserted::Updated);
        assert!(!edge.is_inferred);
        assert_eq!(edge.relationship_type, MANY_TO_ONE);

        let refreshed = column_by_name(&db, orders.id, "customer_id")
            .await
            .unwrap()
            .unwrap();
        assert!(refreshed.is_foreign_key);

        let views = relationships_for_database(&db, database.id).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].from_table, "orders");
        assert_eq!(views[0].from_column, "customer_id");
        assert_eq!(views[0].to_table, "customers");
        assert_eq!(views[0].to_column, "id");
    }

    #[tokio::test]
    async fn test_relationship_origin_rank_and_self_reference() {
        let db = testing::setup_db().await;
        let database = testing::insert_database(&db, Uuid::now_v7(), "shop").await;
        let (t, _) = upsert_table(&db, database.id, &table("public", "tree", None))
            .await
            .unwrap();
        let (id, _) = upsert_column(&db, t.id, &column("tree", "id", 1, true)).await.unwrap();
        let (parent, _) = upsert_column(&db, t.id, &column("tree", "parent_id", 2, false))
            .await
            .unwrap();

        assert!(matches!(
            upsert_relationship(&db, id.clone(), &id, EdgeOrigin::Declared).await,
            Err(StoreError::InvalidRelationship(_))
        ));
        assert!(!column_by_name(&db, t.id, "id").await.unwrap().unwrap().is_foreign_key);

        let (edge, _) = upsert_relationship(&db, parent.clone(), &id, EdgeOrigin::Manual)
            .await
            .unwrap();
        assert!(edge.is_manual);
        let (edge, _) = upsert_relationship(&db, parent.clone(), &id, EdgeOrigin::Inferred)
            .await
            .unwrap();
        assert!(edge.is_manual && !edge.is_inferred);
        let (edge, _) = upsert_relationship(&db, parent, &id, EdgeOrigin::Declared)
            .await
            .unwrap();
        assert!(!edge.is_manual && !edge.is_inferred);
    }

    #[tokio::test]
    async fn test_delete_relationships_clears_orphaned_fk_flag() {
        let db = testing::setup_db().await;
        let database = testing::insert_database(&db, Uuid::now_v7(), "shop").await;
        let (customers, _) = upsert_table(&db, database.id, &table("public", "customers", None))
            .await
            .unwrap();
        let (orders, _) = upsert_table(&db, database.id, &table("public", "orders", None))
            .await
            .unwrap();
        let (pk, _) = upsert_column(&db, customers.id, &column("customers", "id", 1, true))
            .await
            .unwrap();
        let (alt, _) = upsert_column(&db, customers.id, &column("customers", "legacy_id", 2, false))
            .await
            .unwrap();
        let (fk, _) = upsert_column(&db, orders.id, &column("orders", "customer_id", 2, false))
            .await
            .unwrap();

        let (first, _) = upsert_relationship(&db, fk.clone(), &pk, EdgeOrigin::Declared)
            .await
            .unwrap();
        let (second, _) = upsert_relationship(&db, fk, &alt, EdgeOrigin::Declared)
            .await
            .unwrap();

        delete_relationships(&db, &[first.id]).await.unwrap();
        let flagged = column_by_name(&db, orders.id, "customer_id").await.unwrap().unwrap();
        assert!(flagged.is_foreign_key);

        delete_relationships(&db, &[second.id]).await.unwrap();
        let cleared = column_by_name(&db, orders.id, "customer_id").await.unwrap().unwrap();
        assert!(!cleared.is_foreign_key);
        assert!(relationships_for_database(&db, database.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_relationship_validation() {
        let db = testing::setup_db().await;
        let shop = testing::insert_database(&db, Uuid::now_v7(), "shop").await;
        let crm = testing::insert_database(&db, shop.owner_id, "crm").await;
        let (a, _) = upsert_table(&db, shop.id, &table("public", "a", None)).await.unwrap();
        let (b, _) = upsert_table(&db, crm.id, &table("public", "b", None)).await.unwrap();
        let (a_id, _) = upsert_column(&db, a.id, &column("a", "id", 1, true)).await.unwrap();
        let (b_id, _) = upsert_column(&db, b.id, &column("b", "id", 1, true)).await.unwrap();

        assert!(matches!(
            create_relationship(&db, shop.id, a_id.id, a_id.id).await,
            Err(StoreError::InvalidRelationship(_))
        ));
        assert!(matches!(
            create_relationship(&db, shop.id, a_id.id, Uuid::now_v7()).await,
            Err(StoreError::InvalidRelationship(_))
        ));
        assert!(matches!(
            create_relationship(&db, shop.id, a_id.id, b_id.id).await,
            Err(StoreError::InvalidRelationship(_))
        ));
    }

    #[tokio::test]
    async fn test_update_description_scoped_to_database() {
        let db = testing::setup_db().await;
        let shop = testing::insert_database(&db, Uuid::now_v7(), "shop").await;
        let other = testing::insert_database(&db, shop.owner_id, "other").await;
        let (t, _) = upsert_table(&db, shop.id, &table("public", "orders", None))
            .await
            .unwrap();
        let (c, _) = upsert_column(&db, t.id, &column("orders", "id", 1, true))
            .await
            .unwrap();
        set_column_embedding(&db, c.clone(), Some("[1.0]".to_string()))
            .await
            .unwrap();

        assert!(matches!(
            update_description(&db, other.id, MetadataKind::Column, c.id, "x").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            update_description(&db, shop.id, MetadataKind::Relationship, c.id, "x").await,
            Err(StoreError::UnsupportedKind(_))
        ));

        update_description(&db, shop.id, MetadataKind::Column, c.id, "Order key")
            .await
            .unwrap();
        let stored = column_by_name(&db, t.id, "id").await.unwrap().unwrap();
        assert_eq!(stored.description.as_deref(), Some("Order key"));
        assert_eq!(stored.embedding, None);
    }

    #[tokio::test]
    async fn test_find_owned_database_hides_foreign_rows() {
        let db = testing::setup_db().await;
        let owner = Uuid::now_v7();
        let database = testing::insert_database(&db, owner, "shop").await;

        assert!(find_owned_database(&db, database.id, owner).await.is_ok());
        assert!(matches!(
            find_owned_database(&db, database.id, Uuid::now_v7()).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(list_databases(&db, owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_full_schema_orders_tables_and_columns() {
        let db = testing::setup_db().await;
        let database = testing::insert_database(&db, Uuid::now_v7(), "shop").await;
        let (b, _) = upsert_table(&db, database.id, &table("public", "b", Some(3)))
            .await
            .unwrap();
        upsert_table(&db, database.id, &table("public", "a", None))
            .await
            .unwrap();
        upsert_column(&db, b.id, &column("b", "z", 2, false)).await.unwrap();
        upsert_column(&db, b.id, &column("b", "y", 1, true)).await.unwrap();

        let schema = full_schema(&db, database.id).await.unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema[0].table_name, "a");
        assert!(schema[0].columns.is_empty());
        assert_eq!(schema[1].row_count, Some(3));
        let names: Vec<&str> = schema[1].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["y", "z"]);
    }
}
