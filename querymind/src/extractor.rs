use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set, TransactionTrait};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::connector::{ConnectionConfig, Connector};
use crate::crypto::CredentialCipher;
use crate::discovery::{self, DiscoveredForeignKey, SchemaSnapshot};
use crate::entity::{client_database, column_metadata};
use crate::error::{OperationStatus, ServiceError};
use crate::store::{self, Upserted};

/// Counts of what one extraction run wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub tables_inserted: usize,
    pub tables_updated: usize,
    pub columns_inserted: usize,
    pub columns_updated: usize,
    pub relationships_inserted: usize,
    pub relationships_updated: usize,
    pub relationships_inferred: usize,
    /// Stored tables the target no longer reports, as `schema.table`. Kept, not deleted.
    pub stale_tables: Vec<String>,
    /// Extracted relationships the target no longer reports, as
    /// `schema.table.column -> schema.table.column`. Deleted from the store.
    pub stale_relationships: Vec<String>,
}

impl ExtractionReport {
    fn tally(outcome: Upserted, inserted: &mut usize, updated: &mut usize) {
        match outcome {
            Upserted::Inserted => *inserted += 1,
            Upserted::Updated => *updated += 1,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Metadata extracted: {} tables, {} columns, {} relationships",
            self.tables_inserted + self.tables_updated,
            self.columns_inserted + self.columns_updated,
            self.relationships_inserted + self.relationships_updated,
        )
    }
}

/// Copies a target database's structure into the metadata store.
///
/// Runs for the same database are serialized; runs for different databases
/// proceed independently.
pub struct MetadataExtractor {
    db: DatabaseConnection,
    cipher: CredentialCipher,
    connector: Arc<dyn Connector>,
    infer_relationships: bool,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl MetadataExtractor {
    pub fn new(
        db: DatabaseConnection,
        cipher: CredentialCipher,
        connector: Arc<dyn Connector>,
        infer_relationships: bool,
    ) -> Self {
        Self {
            db,
            cipher,
            connector,
            infer_relationships,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, database_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(database_id).or_default().clone()
    }

    /// Drop the database's lock entry once no other run holds or awaits it.
    fn release(&self, database_id: Uuid, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(&database_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Outward form of [`Self::extract`]: failures become `(false, message)`.
    pub async fn extract_full_metadata(&self, database_id: Uuid) -> OperationStatus {
        match self.extract(database_id).await {
            Ok(report) => OperationStatus::ok(report.summary()),
            Err(e) => {
                tracing::error!(%database_id, error = %e, "metadata extraction failed");
                OperationStatus::failed(e.to_string())
            }
        }
    }

    pub async fn extract(&self, database_id: Uuid) -> Result<ExtractionReport, ServiceError> {
        let lock = self.lock_for(database_id);
        let result = {
            let _guard = lock.lock().await;
            self.extract_locked(database_id).await
        };
        self.release(database_id, lock);
        result
    }

    async fn extract_locked(&self, database_id: Uuid) -> Result<ExtractionReport, ServiceError> {
        let database = store::find_database(&self.db, database_id)
            .await?
            .ok_or(ServiceError::DatabaseNotFound(database_id))?;
        let cfg = ConnectionConfig::from_model(&database, &self.cipher)?;

        tracing::info!(%database_id, target_db = %cfg.display_target(), "extracting metadata");

        let snapshot = self.snapshot(&cfg).await?;
        let report = self.persist(database_id, &snapshot).await?;

        let mut active: client_database::ActiveModel = database.into();
        active.last_extracted_at = Set(Some(Utc::now().naive_utc()));
        active.last_extraction_result = Set(serde_json::to_string(&report).ok());
        active.update(&self.db).await?;

        tracing::info!(
            %database_id,
            tables = report.tables_inserted + report.tables_updated,
            columns = report.columns_inserted + report.columns_updated,
            relationships = report.relationships_inserted + report.relationships_updated,
            stale = report.stale_tables.len(),
            pruned = report.stale_relationships.len(),
            "metadata extraction finished"
        );
        Ok(report)
    }

    async fn snapshot(&self, cfg: &ConnectionConfig) -> Result<SchemaSnapshot, ServiceError> {
        let mut session = self.connector.connect(cfg).await?;
        let provider = discovery::create_provider(cfg.engine);
        let result = discovery::discover(provider.as_ref(), session.as_mut()).await;
        session.close().await;
        Ok(result?)
    }

    async fn persist(
        &self,
        database_id: Uuid,
        snapshot: &SchemaSnapshot,
    ) -> Result<ExtractionReport, ServiceError> {
        let mut report = ExtractionReport::default();
        let previously_stored = store::tables_for_database(&self.db, database_id).await?;

        // tables
        let txn = self.db.begin().await?;
        let mut table_ids: HashMap<(&str, &str), Uuid> = HashMap::new();
        for table in &snapshot.tables {
            let (model, outcome) = store::upsert_table(&txn, database_id, table).await?;
            ExtractionReport::tally(
                outcome,
                &mut report.tables_inserted,
                &mut report.tables_updated,
            );
            table_ids.insert((table.schema_name.as_str(), table.table_name.as_str()), model.id);
        }
        txn.commit().await?;

        // columns
        let txn = self.db.begin().await?;
        let mut columns: HashMap<(&str, &str, &str), column_metadata::Model> = HashMap::new();
        for column in &snapshot.columns {
            let key = (column.schema_name.as_str(), column.table_name.as_str());
            let Some(&table_id) = table_ids.get(&key) else {
                tracing::debug!(
                    table = %column.table_name,
                    column = %column.column_name,
                    "column of an unlisted table skipped"
                );
                continue;
            };
            let (model, outcome) = store::upsert_column(&txn, table_id, column).await?;
            ExtractionReport::tally(
                outcome,
                &mut report.columns_inserted,
                &mut report.columns_updated,
            );
            columns.insert(
                (
                    column.schema_name.as_str(),
                    column.table_name.as_str(),
                    column.column_name.as_str(),
                ),
                model,
            );
        }
        txn.commit().await?;

        // relationships
        let inferred = if self.infer_relationships {
            discovery::infer_foreign_keys(&snapshot.columns, &snapshot.foreign_keys)
        } else {
            Vec::new()
        };
        let edges = snapshot
            .foreign_keys
            .iter()
            .map(|fk| (fk, false))
            .chain(inferred.iter().map(|fk| (fk, true)));

        let present: HashSet<(&str, &str)> = table_ids.keys().copied().collect();
        let mut seen: HashSet<Uuid> = HashSet::new();

        let txn = self.db.begin().await?;
        for (fk, is_inferred) in edges {
            let Some((from, to)) = resolve_edge(&columns, fk) else {
                tracing::debug!(
                    from = %format!("{}.{}.{}", fk.from_schema, fk.from_table, fk.from_column),
                    to = %format!("{}.{}.{}", fk.to_schema, fk.to_table, fk.to_column),
                    "relationship endpoint not stored, skipped"
                );
                continue;
            };
            if from.id == to.id {
                tracing::debug!(
                    column = %format!("{}.{}.{}", fk.from_schema, fk.from_table, fk.from_column),
                    "self-referencing column constraint skipped"
                );
                continue;
            }
            let origin = if is_inferred {
                store::EdgeOrigin::Inferred
            } else {
                store::EdgeOrigin::Declared
            };
            let (edge, outcome) = store::upsert_relationship(&txn, from, &to, origin).await?;
            seen.insert(edge.id);
            ExtractionReport::tally(
                outcome,
                &mut report.relationships_inserted,
                &mut report.relationships_updated,
            );
            if is_inferred {
                report.relationships_inferred += 1;
            }
            let from_key = (
                fk.from_schema.as_str(),
                fk.from_table.as_str(),
                fk.from_column.as_str(),
            );
            if let Some(col) = columns.get_mut(&from_key) {
                col.is_foreign_key = true;
            }
        }

        // Prune only edges this run could have re-reported. Manual edges and
        // edges leaving a stale table are kept.
        let stale: Vec<store::RelationshipView> =
            store::relationships_for_database(&txn, database_id)
                .await?
                .into_iter()
                .filter(|edge| {
                    !seen.contains(&edge.id)
                        && !edge.is_manual
                        && (self.infer_relationships || !edge.is_inferred)
                        && present.contains(&(edge.from_schema.as_str(), edge.from_table.as_str()))
                })
                .collect();
        let stale_ids: Vec<Uuid> = stale.iter().map(|edge| edge.id).collect();
        store::delete_relationships(&txn, &stale_ids).await?;
        txn.commit().await?;

        report.stale_relationships = stale.iter().map(store::RelationshipView::label).collect();
        if !report.stale_relationships.is_empty() {
            tracing::warn!(
                %database_id,
                stale = ?report.stale_relationships,
                "relationships no longer present in the target database were removed"
            );
        }

        report.stale_tables = previously_stored
            .iter()
            .filter(|t| !present.contains(&(t.schema_name.as_str(), t.table_name.as_str())))
            .map(|t| format!("{}.{}", t.schema_name, t.table_name))
            .collect();
        if !report.stale_tables.is_empty() {
            tracing::warn!(
                %database_id,
                stale = ?report.stale_tables,
                "stored tables no longer present in the target database"
            );
        }

        Ok(report)
    }
}

fn resolve_edge(
    columns: &HashMap<(&str, &str, &str), column_metadata::Model>,
    fk: &DiscoveredForeignKey,
) -> Option<(column_metadata::Model, column_metadata::Model)> {
    let from = columns.get(&(
        fk.from_schema.as_str(),
        fk.from_table.as_str(),
        fk.from_column.as_str(),
    ))?;
    let to = columns.get(&(
        fk.to_schema.as_str(),
        fk.to_table.as_str(),
        fk.to_column.as_str(),
    ))?;
    Some((from.clone(), to.clone()))
}
