//! QueryMind - schema-aware natural-language-to-SQL assistant
//!
//! Extracts the structure of registered client databases into a metadata
//! store, keeps human and generated descriptions alongside it, and turns
//! questions into SQL through a language model gateway.

pub mod api;
pub mod config;
pub mod connector;
pub mod crypto;
pub mod database_types;
pub mod describe;
pub mod discovery;
pub mod entity;
pub mod error;
pub mod extractor;
pub mod llm;
pub mod nl2sql;
pub mod prompt;
pub mod serializer;
pub mod store;
pub mod vectorizer;

#[cfg(test)]
pub(crate) mod testing {
    use axum::{
        Router,
        body::Body,
        http::{Method, Request, Response},
    };
    use chrono::Utc;
    use migration::MigratorTrait as _;
    use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::{ConnectOptions, Connection};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    use crate::api::{ApiState, jwt};
    use crate::config::Settings;
    use crate::connector::{ConnectionConfig, ConnectionParams, DriverConnector, Engine};
    use crate::crypto::CredentialCipher;
    use crate::discovery::{DiscoveredColumn, DiscoveredTable};
    use crate::entity::client_database;
    use crate::llm::{GatewayError, GenerationRequest, LanguageModel};
    use crate::store;
    use crate::vectorizer::HashingEmbedder;

    pub const JWT_SECRET: &str = "test-jwt-secret-key-32-chars-pad";
    const KEY_BYTE: u8 = 0x2a;

    pub async fn setup_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    pub fn cipher() -> CredentialCipher {
        CredentialCipher::new([KEY_BYTE; 32])
    }

    pub async fn insert_database(
        db: &DatabaseConnection,
        owner_id: Uuid,
        name: &str,
    ) -> client_database::Model {
        let config = serde_json::json!({
            "host": "localhost",
            "port": 5432,
            "database": name,
            "username": "alice",
            "sslmode": "prefer"
        });
        insert_row(db, owner_id, name, "postgres", config, serde_json::json!({"password": "pw"}))
            .await
    }

    pub async fn insert_sqlite_database(
        db: &DatabaseConnection,
        owner_id: Uuid,
        name: &str,
        path: &Path,
    ) -> client_database::Model {
        let config = serde_json::json!({ "path": path.to_string_lossy() });
        insert_row(db, owner_id, name, "sqlite", config, serde_json::json!({})).await
    }

    async fn insert_row(
        db: &DatabaseConnection,
        owner_id: Uuid,
        name: &str,
        engine: &str,
        config: serde_json::Value,
        secure: serde_json::Value,
    ) -> client_database::Model {
        let now = Utc::now().naive_utc();
        client_database::ActiveModel {
            id: Set(Uuid::now_v7()),
            owner_id: Set(owner_id),
            name: Set(name.to_string()),
            engine: Set(engine.to_string()),
            config: Set(config.to_string()),
            secure_config: Set(cipher().seal(&secure).unwrap()),
            last_extracted_at: Set(None),
            last_extraction_result: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .unwrap()
    }

    /// Store one table with integer columns, as if it had been extracted.
    pub async fn seed_table(
        db: &DatabaseConnection,
        database_id: Uuid,
        schema: &str,
        table: &str,
        columns: &[(&str, bool)],
    ) {
        let (stored, _) = store::upsert_table(
            db,
            database_id,
            &DiscoveredTable {
                schema_name: schema.to_string(),
                table_name: table.to_string(),
                table_type: "TABLE".to_string(),
                row_count: None,
            },
        )
        .await
        .unwrap();
        for (idx, (name, pk)) in columns.iter().enumerate() {
            store::upsert_column(
                db,
                stored.id,
                &DiscoveredColumn {
                    schema_name: schema.to_string(),
                    table_name: table.to_string(),
                    column_name: name.to_string(),
                    ordinal_position: idx as i32 + 1,
                    data_type: "integer".to_string(),
                    is_nullable: !pk,
                    is_primary_key: *pk,
                },
            )
            .await
            .unwrap();
        }
    }

    /// Create (or open) a SQLite file and run `statements` against it.
    pub async fn sqlite_target(path: &Path, statements: &[&str]) -> ConnectionConfig {
        let mut conn = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .connect()
            .await
            .unwrap();
        for sql in statements {
            sqlx::query(sql).execute(&mut conn).await.unwrap();
        }
        conn.close().await.unwrap();
        ConnectionConfig {
            engine: Engine::Sqlite,
            params: ConnectionParams::File {
                path: path.to_string_lossy().into_owned(),
            },
        }
    }

    /// Serve `router` on an ephemeral local port; returns its base URL.
    pub async fn spawn_http(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    // ---------- fake language model ----------

    /// Answers every prompt with a fixed reply (or a 503) and records requests.
    pub struct RecordingModel {
        reply: Option<String>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl RecordingModel {
        pub fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn requests(&self) -> Vec<GenerationRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl LanguageModel for RecordingModel {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
            self.requests.lock().unwrap().push(request.clone());
            self.reply.clone().ok_or_else(|| GatewayError::Status {
                status: 503,
                body: "model overloaded".to_string(),
            })
        }
    }

    // ---------- REST helpers ----------

    pub fn api_state(db: DatabaseConnection, model: Arc<RecordingModel>) -> ApiState {
        let key_hex = format!("{KEY_BYTE:02x}").repeat(32);
        let settings = Settings::from_lookup(|key| match key {
            "QM_JWT_SECRET" => Some(JWT_SECRET.to_string()),
            "QM_ENCRYPTION_KEY" => Some(key_hex.clone()),
            _ => None,
        })
        .unwrap();
        ApiState::new(
            db,
            &settings,
            Arc::new(DriverConnector),
            model,
            Arc::new(HashingEmbedder::default()),
        )
    }

    pub fn token(owner_id: Uuid) -> String {
        let claims = jwt::Claims {
            sub: owner_id,
            username: "tester".to_string(),
            exp: (Utc::now().timestamp() as u64) + 3600,
        };
        jwt::encode_jwt(&claims, JWT_SECRET).unwrap()
    }

    pub fn request(
        method: Method,
        uri: &str,
        owner_id: Uuid,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", token(owner_id)));
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub async fn read_json(res: Response<Body>) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        if bytes.is_empty() {
            return serde_json::Value::Null;
        }
        serde_json::from_slice(&bytes).unwrap()
    }
}
