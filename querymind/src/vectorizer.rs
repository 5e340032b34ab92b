use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::entity::{column_metadata, table_metadata};
use crate::error::{OperationStatus, ServiceError};
use crate::llm::{GatewayError, LlmGateway, Provider};
use crate::store::{self, MetadataKind};

/// Selects [`HashingEmbedder`] instead of a remote embedding model.
pub const LOCAL_EMBEDDING_MODEL: &str = "local-hashing";

const EMBED_BATCH: usize = 64;

// ---------- embedders ----------

#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    fn model(&self) -> &str;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// `POST {base}/embeddings` against an OpenAI-compatible endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    provider: Provider,
    model: String,
}

impl OpenAiEmbedder {
    /// Reuse the gateway's HTTP client, endpoints and credentials.
    pub fn from_gateway(gateway: &LlmGateway) -> Self {
        let model = gateway.settings().embedding_model.clone();
        let provider = Provider::for_model(&model);
        let (base_url, api_key) = gateway.endpoint(provider);
        Self {
            client: gateway.client().clone(),
            base_url,
            api_key: api_key.map(str::to_string),
            provider,
            model,
        }
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAiEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let key = self
            .api_key
            .as_deref()
            .ok_or(GatewayError::CredentialMissing(self.provider))?;

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        if parsed.data.len() != texts.len() {
            return Err(GatewayError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}

/// Deterministic bag-of-words embedder (FNV-1a feature hashing). Needs no
/// network; useful offline and in tests.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: 256 }
    }
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

impl HashingEmbedder {
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let slot = (fnv1a(token) % self.dimensions as u64) as usize;
            vector[slot] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait::async_trait]
impl Embedder for HashingEmbedder {
    fn model(&self) -> &str {
        LOCAL_EMBEDDING_MODEL
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Embedder configured by `QM_EMBEDDING_MODEL`.
pub fn embedder_for(gateway: &LlmGateway) -> Arc<dyn Embedder> {
    if gateway.settings().embedding_model == LOCAL_EMBEDDING_MODEL {
        Arc::new(HashingEmbedder::default())
    } else {
        Arc::new(OpenAiEmbedder::from_gateway(gateway))
    }
}

// ---------- math and text ----------

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn table_text(t: &table_metadata::Model) -> String {
    format!(
        "{}.{}: {}",
        t.schema_name,
        t.table_name,
        t.description.as_deref().unwrap_or_default()
    )
}

fn column_text(t: &table_metadata::Model, c: &column_metadata::Model) -> String {
    format!(
        "{}.{}.{} ({}): {}",
        t.schema_name,
        t.table_name,
        c.column_name,
        c.data_type,
        c.description.as_deref().unwrap_or_default()
    )
}

fn decode(stored: Option<&str>) -> Option<Vec<f32>> {
    serde_json::from_str(stored?).ok()
}

fn encode(vector: &[f32]) -> Option<String> {
    serde_json::to_string(vector).ok()
}

// ---------- search ----------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub kind: MetadataKind,
    pub id: Uuid,
    pub schema_name: String,
    pub table_name: String,
    pub column_name: Option<String>,
    pub description: Option<String>,
    pub score: f32,
}

enum Pending {
    Table(table_metadata::Model),
    Column(column_metadata::Model),
}

/// Keeps table and column embeddings in the metadata store and ranks them
/// against free-text queries.
#[derive(Clone)]
pub struct Vectorizer {
    db: DatabaseConnection,
    embedder: Arc<dyn Embedder>,
}

impl Vectorizer {
    pub fn new(db: DatabaseConnection, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, embedder }
    }

    /// Recompute every embedding of the database.
    pub async fn update_all_embeddings(&self, database_id: Uuid) -> OperationStatus {
        match self.embed_database(database_id, false).await {
            Ok(count) => OperationStatus::ok(format!("Updated embeddings for {count} items")),
            Err(e) => {
                tracing::error!(%database_id, error = %e, "embedding refresh failed");
                OperationStatus::failed(e.to_string())
            }
        }
    }

    /// Embed tables and columns; with `only_missing`, rows that already
    /// carry an embedding are left alone. Returns how many rows were written.
    pub async fn embed_database(
        &self,
        database_id: Uuid,
        only_missing: bool,
    ) -> Result<usize, ServiceError> {
        store::find_database(&self.db, database_id)
            .await?
            .ok_or(ServiceError::DatabaseNotFound(database_id))?;

        let mut pending = Vec::new();
        let mut texts = Vec::new();
        for (table, columns) in store::tables_with_columns(&self.db, database_id).await? {
            for column in columns {
                if !only_missing || column.embedding.is_none() {
                    texts.push(column_text(&table, &column));
                    pending.push(Pending::Column(column));
                }
            }
            if !only_missing || table.embedding.is_none() {
                texts.push(table_text(&table));
                pending.push(Pending::Table(table));
            }
        }

        let mut written = 0;
        let mut pending = pending.into_iter();
        for chunk in texts.chunks(EMBED_BATCH) {
            let vectors = self.embedder.embed(chunk).await?;
            for (vector, row) in vectors.into_iter().zip(pending.by_ref()) {
                let encoded = encode(&vector);
                match row {
                    Pending::Table(t) => {
                        store::set_table_embedding(&self.db, t, encoded).await?;
                    }
                    Pending::Column(c) => {
                        store::set_column_embedding(&self.db, c, encoded).await?;
                    }
                }
                written += 1;
            }
        }

        tracing::debug!(%database_id, written, model = self.embedder.model(), "embeddings stored");
        Ok(written)
    }

    /// Rank the database's tables and columns against `query`, best first.
    pub async fn search_metadata(
        &self,
        database_id: Uuid,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::InvalidInput("search query is empty".to_string()));
        }

        self.embed_database(database_id, true).await?;

        let query_vector = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                GatewayError::MalformedResponse("no embedding returned for query".to_string())
            })?;

        let mut hits = Vec::new();
        for (table, columns) in store::tables_with_columns(&self.db, database_id).await? {
            if let Some(vector) = decode(table.embedding.as_deref()) {
                hits.push(SearchHit {
                    kind: MetadataKind::Table,
                    id: table.id,
                    schema_name: table.schema_name.clone(),
                    table_name: table.table_name.clone(),
                    column_name: None,
                    description: table.description.clone(),
                    score: cosine_similarity(&query_vector, &vector),
                });
            }
            for column in columns {
                if let Some(vector) = decode(column.embedding.as_deref()) {
                    hits.push(SearchHit {
                        kind: MetadataKind::Column,
                        id: column.id,
                        schema_name: table.schema_name.clone(),
                        table_name: table.table_name.clone(),
                        column_name: Some(column.column_name),
                        description: column.description,
                        score: cosine_similarity(&query_vector, &vector),
                    });
                }
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmSettings;
    use crate::discovery::{DiscoveredColumn, DiscoveredTable};
    use crate::testing;
    use axum::{Json, Router, routing::post};
    use serde_json::{Value, json};

    async fn seed(db: &DatabaseConnection) -> Uuid {
        let database = testing::insert_database(db, Uuid::now_v7(), "shop").await;
        let tables = [
            ("customers", "People who buy from the shop", vec![
                ("id", "Customer key"),
                ("email", "Contact email address"),
            ]),
            ("orders", "Purchases placed by customers", vec![
                ("id", "Order key"),
                ("total", "Order amount in dollars"),
            ]),
        ];
        for (name, description, columns) in tables {
            let (t, _) = store::upsert_table(
                db,
                database.id,
                &DiscoveredTable {
                    schema_name: "public".to_string(),
                    table_name: name.to_string(),
                    table_type: "TABLE".to_string(),
                    row_count: None,
                },
            )
            .await
            .unwrap();
            store::update_description(db, database.id, MetadataKind::Table, t.id, description)
                .await
                .unwrap();
            for (i, (col, col_desc)) in columns.into_iter().enumerate() {
                let (c, _) = store::upsert_column(
                    db,
                    t.id,
                    &DiscoveredColumn {
                        schema_name: "public".to_string(),
                        table_name: name.to_string(),
                        column_name: col.to_string(),
                        ordinal_position: i as i32 + 1,
                        data_type: "text".to_string(),
                        is_nullable: true,
                        is_primary_key: i == 0,
                    },
                )
                .await
                .unwrap();
                store::update_description(db, database.id, MetadataKind::Column, c.id, col_desc)
                    .await
                    .unwrap();
            }
        }
        database.id
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed_one("Contact email address");
        let b = embedder.embed_one("contact EMAIL address");
        assert_eq!(a, b);
        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(embedder.embed_one("").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_update_all_embeddings_covers_every_row() {
        let db = testing::setup_db().await;
        let database_id = seed(&db).await;
        let vectorizer = Vectorizer::new(db.clone(), Arc::new(HashingEmbedder::default()));

        let status = vectorizer.update_all_embeddings(database_id).await;
        assert!(status.success, "{}", status.message);
        assert_eq!(status.message, "Updated embeddings for 6 items");

        for (table, columns) in store::tables_with_columns(&db, database_id).await.unwrap() {
            assert!(table.embedding.is_some());
            assert!(columns.iter().all(|c| c.embedding.is_some()));
        }

        let missing = vectorizer.update_all_embeddings(Uuid::now_v7()).await;
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn test_search_ranks_and_lazily_embeds() {
        let db = testing::setup_db().await;
        let database_id = seed(&db).await;
        let vectorizer = Vectorizer::new(db.clone(), Arc::new(HashingEmbedder::default()));

        let hits = vectorizer
            .search_metadata(database_id, "email address", 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].kind, MetadataKind::Column);
        assert_eq!(hits[0].column_name.as_deref(), Some("email"));
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);

        // a changed description drops the stored vector; the next search recomputes it
        let orders = store::table_by_name(&db, database_id, "public", "orders")
            .await
            .unwrap()
            .unwrap();
        store::update_description(
            &db,
            database_id,
            MetadataKind::Table,
            orders.id,
            "Invoices and shipping labels",
        )
        .await
        .unwrap();
        let hits = vectorizer
            .search_metadata(database_id, "shipping labels", 1)
            .await
            .unwrap();
        assert_eq!(hits[0].id, orders.id);

        assert!(matches!(
            vectorizer.search_metadata(database_id, "  ", 5).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_openai_embedder_orders_by_index() {
        let router = Router::new().route(
            "/embeddings",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "text-embedding-3-small");
                assert_eq!(body["input"], json!(["a", "b"]));
                Json(json!({"data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]}))
            }),
        );
        let base = testing::spawn_http(router).await;
        let gateway = LlmGateway::new(LlmSettings {
            openai_api_key: Some("sk-test".to_string()),
            openai_base_url: Some(base),
            ..Default::default()
        })
        .unwrap();
        let embedder = OpenAiEmbedder::from_gateway(&gateway);

        let vectors = embedder
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_openai_embedder_requires_key() {
        let gateway = LlmGateway::new(LlmSettings::default()).unwrap();
        let err = OpenAiEmbedder::from_gateway(&gateway)
            .embed(&["a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::CredentialMissing(_)));
    }
}
