pub use sea_orm_migration::prelude::*;

mod m20261001_000001_create_client_databases;
mod m20261001_000002_create_metadata_tables;
mod m20261003_000003_create_relationships;
mod m20261008_000004_add_embeddings;
mod m20261016_000005_add_relationship_is_manual;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_client_databases::Migration),
            Box::new(m20261001_000002_create_metadata_tables::Migration),
            Box::new(m20261003_000003_create_relationships::Migration),
            Box::new(m20261008_000004_add_embeddings::Migration),
            Box::new(m20261016_000005_add_relationship_is_manual::Migration),
        ]
    }
}
