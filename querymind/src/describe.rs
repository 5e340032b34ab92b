use sea_orm::DatabaseConnection;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::LlmSettings;
use crate::connector::{ConnectionConfig, Connector};
use crate::crypto::CredentialCipher;
use crate::error::ServiceError;
use crate::llm::parser::parse_description;
use crate::llm::{GatewayError, GenerationRequest, LanguageModel};
use crate::prompt::{DescriptionContext, MAX_SAMPLE_VALUES, description_prompt};
use crate::store::{self, MetadataKind};

/// Writes natural-language descriptions of tables, columns and relationships.
#[derive(Clone)]
pub struct DescriptionGenerator {
    db: DatabaseConnection,
    cipher: CredentialCipher,
    connector: Arc<dyn Connector>,
    model: Arc<dyn LanguageModel>,
    settings: LlmSettings,
}

impl DescriptionGenerator {
    pub fn new(
        db: DatabaseConnection,
        cipher: CredentialCipher,
        connector: Arc<dyn Connector>,
        model: Arc<dyn LanguageModel>,
        settings: LlmSettings,
    ) -> Self {
        Self {
            db,
            cipher,
            connector,
            model,
            settings,
        }
    }

    /// Generate one description.
    ///
    /// `kind` must be `table`, `column` or `relationship`; anything else is
    /// rejected before any I/O. Column descriptions quote up to ten real
    /// values when the context names a registered database and a table.
    pub async fn describe(
        &self,
        kind: &str,
        name: &str,
        mut context: DescriptionContext,
    ) -> Result<String, ServiceError> {
        let kind = MetadataKind::parse(kind.trim())
            .ok_or_else(|| ServiceError::InvalidMetadataKind(kind.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::InvalidInput("name is empty".to_string()));
        }

        let samples = match kind {
            MetadataKind::Column => match self.column_samples(name, &mut context).await {
                Ok(samples) => samples,
                Err(e) => {
                    tracing::warn!(column = name, error = %e, "sample values unavailable");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        let prompt = description_prompt(kind, name, &context, &samples);
        tracing::info!(kind = kind.as_str(), name, samples = samples.len(), "generating description");

        let raw = self
            .model
            .generate(&GenerationRequest::new(prompt, &self.settings))
            .await
            .map_err(|e| match e {
                GatewayError::CredentialMissing(_) => ServiceError::from(e),
                other => {
                    tracing::warn!(kind = kind.as_str(), name, error = %other, "description generation failed");
                    ServiceError::GenerationFailed(other.to_string())
                }
            })?;
        Ok(parse_description(&raw))
    }

    /// Same as [`Self::describe`], with the context pinned to one database.
    pub async fn generate_description(
        &self,
        database_id: Uuid,
        kind: &str,
        name: &str,
        mut context: DescriptionContext,
    ) -> Result<String, ServiceError> {
        context.database_id = Some(database_id);
        self.describe(kind, name, context).await
    }

    /// Fill gaps in `context` from the metadata store, then fetch sample
    /// values from the target database. Returns nothing when the context
    /// does not identify a table.
    async fn column_samples(
        &self,
        column: &str,
        context: &mut DescriptionContext,
    ) -> Result<Vec<serde_json::Value>, ServiceError> {
        let (Some(database_id), Some(table)) = (context.database_id, context.table.clone()) else {
            return Ok(Vec::new());
        };

        let database = store::find_database(&self.db, database_id)
            .await?
            .ok_or(ServiceError::DatabaseNotFound(database_id))?;

        let stored_table = match &context.schema {
            Some(schema) => store::table_by_name(&self.db, database_id, schema, &table).await?,
            None => store::table_by_bare_name(&self.db, database_id, &table).await?,
        };
        if let Some(stored) = &stored_table {
            context.schema.get_or_insert_with(|| stored.schema_name.clone());
            if let Some(col) = store::column_by_name(&self.db, stored.id, column).await? {
                context.data_type.get_or_insert(col.data_type);
                context.nullable.get_or_insert(col.is_nullable);
                context.is_primary_key.get_or_insert(col.is_primary_key);
                context.is_foreign_key.get_or_insert(col.is_foreign_key);
            }
        }
        let Some(schema) = context.schema.clone() else {
            return Ok(Vec::new());
        };

        let cfg = ConnectionConfig::from_model(&database, &self.cipher)?;
        let mut session = self.connector.connect(&cfg).await?;
        let samples = session
            .sample_values(&schema, &table, column, MAX_SAMPLE_VALUES)
            .await;
        session.close().await;
        Ok(samples?)
    }
}
