use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::LlmSettings;
use crate::error::ServiceError;
use crate::llm::parser::parse_sql_response;
use crate::llm::{GatewayError, GenerationRequest, LanguageModel};
use crate::prompt::sql_generation_prompt;
use crate::serializer::{build_schema_representation, fit_to_budget};
use crate::store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlTranslation {
    pub sql_query: String,
    pub explanation: String,
    /// Set when the schema had to be cut down to fit the prompt budget.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Turns a natural-language question into SQL for one registered database.
/// The SQL is returned, never executed.
#[derive(Clone)]
pub struct NlToSql {
    db: DatabaseConnection,
    model: Arc<dyn LanguageModel>,
    settings: LlmSettings,
    prompt_token_budget: usize,
}

impl NlToSql {
    pub fn new(
        db: DatabaseConnection,
        model: Arc<dyn LanguageModel>,
        settings: LlmSettings,
        prompt_token_budget: usize,
    ) -> Self {
        Self {
            db,
            model,
            settings,
            prompt_token_budget,
        }
    }

    pub async fn translate(
        &self,
        question: &str,
        database_id: Uuid,
    ) -> Result<SqlTranslation, ServiceError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::InvalidInput("question is empty".to_string()));
        }

        store::find_database(&self.db, database_id)
            .await?
            .ok_or(ServiceError::DatabaseNotFound(database_id))?;

        let schema = build_schema_representation(&self.db, database_id).await?;
        if schema.is_empty() {
            return Err(ServiceError::SchemaNotExtracted(database_id));
        }

        let (schema, warnings) = fit_to_budget(schema, question, self.prompt_token_budget);
        let prompt = sql_generation_prompt(&schema, question);

        tracing::info!(%database_id, tables = schema.len(), "generating SQL");
        let raw = self
            .model
            .generate(&GenerationRequest::new(prompt, &self.settings))
            .await
            .map_err(|e| match e {
                GatewayError::CredentialMissing(_) => ServiceError::from(e),
                other => {
                    tracing::warn!(%database_id, error = %other, "SQL generation failed");
                    ServiceError::GenerationFailed(other.to_string())
                }
            })?;

        let parsed = parse_sql_response(&raw);
        Ok(SqlTranslation {
            sql_query: parsed.sql_query,
            explanation: parsed.explanation,
            warnings,
        })
    }
}
