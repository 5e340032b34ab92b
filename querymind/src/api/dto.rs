use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::client_database;
use crate::prompt::DescriptionContext;

// ---------- client database requests ----------

#[derive(Debug, Deserialize)]
pub struct CreateDatabaseRequest {
    pub name: String,
    pub engine: String,
    /// Flat config object containing all fields (secret and non-secret).
    /// Split into config/secure_config using the type registry.
    pub config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDatabaseRequest {
    pub name: Option<String>,
    /// Flat config update: absent fields are preserved, empty-string secrets kept as-is.
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<String>,
}

// ---------- client database responses ----------

/// Never carries credentials: `secure_config` is not part of the response.
#[derive(Debug, Serialize)]
pub struct DatabaseResponse {
    pub id: Uuid,
    pub name: String,
    pub engine: String,
    pub config: serde_json::Value,
    pub last_extracted_at: Option<NaiveDateTime>,
    pub last_extraction_result: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<client_database::Model> for DatabaseResponse {
    type Error = serde_json::Error;

    fn try_from(m: client_database::Model) -> Result<Self, Self::Error> {
        let last_extraction_result = m
            .last_extraction_result
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(Self {
            id: m.id,
            name: m.name,
            engine: m.engine,
            config: serde_json::from_str(&m.config)?,
            last_extracted_at: m.last_extracted_at,
            last_extraction_result,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}

// ---------- metadata requests ----------

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDescriptionRequest {
    /// `table` or `column`
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Uuid,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRelationshipRequest {
    pub from_column_id: Uuid,
    pub to_column_id: Uuid,
}

/// Body of both description-generation endpoints.
#[derive(Debug, Deserialize)]
pub struct DescribeRequest {
    /// `table`, `column` or `relationship`
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub context: DescriptionContext,
}

#[derive(Debug, Serialize)]
pub struct DescriptionResponse {
    pub success: bool,
    pub description: String,
}

// ---------- assistant ----------

#[derive(Debug, Deserialize)]
pub struct NlToSqlRequest {
    pub question: String,
    pub database_id: Uuid,
}
