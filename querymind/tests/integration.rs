//! End-to-end extraction against a real PostgreSQL.
//!
//! Prerequisites: a Docker daemon reachable by testcontainers.
//!
//! Run with: `cargo test -- --ignored`

use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use querymind::config::LlmSettings;
use querymind::connector::DriverConnector;
use querymind::crypto::CredentialCipher;
use querymind::database_types::split_config;
use querymind::entity::client_database;
use querymind::extractor::MetadataExtractor;
use querymind::llm::{GatewayError, GenerationRequest, LanguageModel};
use querymind::nl2sql::NlToSql;
use querymind::store;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use std::sync::{Arc, Mutex};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio_postgres::NoTls;
use uuid::Uuid;

const SHOP_SQL: &str = "
    CREATE SCHEMA sales;
    CREATE TABLE sales.customers (id SERIAL PRIMARY KEY, name TEXT NOT NULL, email VARCHAR(255));
    CREATE TABLE sales.orders (
        id BIGSERIAL PRIMARY KEY,
        customer_id INTEGER NOT NULL REFERENCES sales.customers(id),
        total NUMERIC(10, 2),
        placed_at TIMESTAMPTZ DEFAULT now()
    );
    CREATE VIEW sales.big_orders AS SELECT * FROM sales.orders WHERE total > 100;
    INSERT INTO sales.customers (name) VALUES ('Ada'), ('Grace');
";

struct PromptCapture(Mutex<Vec<String>>);

#[async_trait::async_trait]
impl LanguageModel for PromptCapture {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GatewayError> {
        self.0.lock().unwrap().push(request.prompt.clone());
        Ok(r#"{"sql_query": "SELECT COUNT(*) FROM sales.orders", "explanation": "Counts orders"}"#
            .to_string())
    }
}

async fn register(
    db: &DatabaseConnection,
    cipher: &CredentialCipher,
    host: &str,
    port: u16,
) -> client_database::Model {
    let (config, secure) = split_config(
        "postgres",
        serde_json::json!({
            "host": host,
            "port": port,
            "database": "postgres",
            "username": "postgres",
            "password": "postgres",
            "sslmode": "disable"
        }),
    )
    .unwrap();
    let now = Utc::now().naive_utc();
    client_database::ActiveModel {
        id: Set(Uuid::now_v7()),
        owner_id: Set(Uuid::now_v7()),
        name: Set("shop".to_string()),
        engine: Set("postgres".to_string()),
        config: Set(config.to_string()),
        secure_config: Set(cipher.seal(&secure).unwrap()),
        last_extracted_at: Set(None),
        last_extraction_result: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .unwrap()
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_postgres_extraction_and_translation() {
    let node = Postgres::default().start().await.expect("start postgres");
    let host = node.get_host().await.unwrap().to_string();
    let port = node.get_host_port_ipv4(5432).await.unwrap();

    let (client, connection) = tokio_postgres::connect(
        &format!("host={host} port={port} user=postgres password=postgres dbname=postgres"),
        NoTls,
    )
    .await
    .expect("connect to target");
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("Connection error: {e}");
        }
    });
    client.batch_execute(SHOP_SQL).await.unwrap();

    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    let cipher = CredentialCipher::new([9u8; 32]);
    let database = register(&db, &cipher, &host, port).await;

    let extractor = MetadataExtractor::new(db.clone(), cipher, Arc::new(DriverConnector), false);
    let report = extractor.extract(database.id).await.unwrap();
    assert_eq!(report.tables_inserted, 3);
    assert_eq!(report.columns_inserted, 3 + 4 + 4);
    assert_eq!(report.relationships_inserted, 1);

    let tables = store::tables_for_database(&db, database.id).await.unwrap();
    let names: Vec<(&str, &str)> = tables
        .iter()
        .map(|t| (t.schema_name.as_str(), t.table_name.as_str()))
        .collect();
    assert_eq!(
        names,
        vec![("sales", "big_orders"), ("sales", "customers"), ("sales", "orders")]
    );

    let orders = &tables[2];
    let columns = store::columns_for_table(&db, orders.id).await.unwrap();
    assert_eq!(columns[0].type_family, "integer");
    assert_eq!(columns[2].type_family, "decimal");
    assert_eq!(columns[3].type_family, "timestamp");
    assert!(columns[1].is_foreign_key);

    let again = extractor.extract(database.id).await.unwrap();
    assert_eq!(again.tables_inserted, 0);
    assert_eq!(again.tables_updated, 3);

    let model = Arc::new(PromptCapture(Mutex::new(Vec::new())));
    let translator = NlToSql::new(db, model.clone(), LlmSettings::default(), 24_000);
    let translation = translator
        .translate("how many orders are there", database.id)
        .await
        .unwrap();
    assert_eq!(translation.sql_query, "SELECT COUNT(*) FROM sales.orders");
    assert!(model.0.lock().unwrap()[0].contains("\"schema_name\": \"sales\""));
}
