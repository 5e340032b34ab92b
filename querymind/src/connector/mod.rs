use serde::Serialize;
use std::fmt;

use crate::crypto::CredentialCipher;
use crate::entity::client_database;
use crate::error::OperationStatus;

pub mod postgres;
pub mod sqlx_session;
pub mod tls;

pub use postgres::PostgresSession;
pub use sqlx_session::SqlxSession;

// ---------- engine ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Postgres,
    Mysql,
    Sqlite,
}

impl Engine {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::Mysql),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Self::Mysql => format!("`{}`", ident.replace('`', "``")),
            Self::Postgres | Self::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    pub fn qualified(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }

    /// Wrap an expression so every engine returns it as text.
    pub fn text_cast(&self, expr: &str) -> String {
        match self {
            Self::Postgres => format!("({expr})::text"),
            Self::Mysql => format!("CAST({expr} AS CHAR)"),
            Self::Sqlite => format!("CAST({expr} AS TEXT)"),
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------- errors ----------

#[derive(Debug)]
pub enum ConnectorError {
    Connect(String),
    Query(String),
    UnsupportedEngine(String),
    InvalidConfig(String),
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::Connect(msg) => write!(f, "Connection error: {msg}"),
            ConnectorError::Query(msg) => write!(f, "Query error: {msg}"),
            ConnectorError::UnsupportedEngine(e) => write!(f, "Unsupported database engine: {e}"),
            ConnectorError::InvalidConfig(msg) => write!(f, "Invalid connection config: {msg}"),
        }
    }
}

impl std::error::Error for ConnectorError {}

// ---------- connection config ----------

#[derive(Clone)]
pub enum ConnectionParams {
    Server {
        host: String,
        port: u16,
        database: String,
        username: String,
        password: String,
        ssl_mode: String,
    },
    File {
        path: String,
    },
}

/// Resolved connection parameters for one target database, credentials included.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub engine: Engine,
    pub params: ConnectionParams,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_target())
    }
}

impl ConnectionConfig {
    /// Build config from a `client_database` model by opening its sealed credentials.
    pub fn from_model(
        model: &client_database::Model,
        cipher: &CredentialCipher,
    ) -> Result<Self, ConnectorError> {
        let config: serde_json::Value = serde_json::from_str(&model.config)
            .map_err(|e| ConnectorError::InvalidConfig(format!("invalid config JSON: {e}")))?;
        let secure = cipher.open(&model.secure_config).map_err(|e| {
            ConnectorError::InvalidConfig(format!("failed to open credentials: {e}"))
        })?;
        Self::from_parts(&model.engine, &config, &secure)
    }

    pub fn from_parts(
        engine: &str,
        config: &serde_json::Value,
        secure: &serde_json::Value,
    ) -> Result<Self, ConnectorError> {
        let engine = Engine::parse(engine)
            .ok_or_else(|| ConnectorError::UnsupportedEngine(engine.to_string()))?;

        let text = |key: &str| -> Result<String, ConnectorError> {
            config[key]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ConnectorError::InvalidConfig(format!("missing {key} in config")))
        };

        let params = match engine {
            Engine::Sqlite => ConnectionParams::File { path: text("path")? },
            Engine::Postgres | Engine::Mysql => {
                let port = match &config["port"] {
                    serde_json::Value::Number(n) => n.as_u64(),
                    serde_json::Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                }
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| {
                    ConnectorError::InvalidConfig("missing or invalid port in config".to_string())
                })?;

                ConnectionParams::Server {
                    host: text("host")?,
                    port,
                    database: text("database")?,
                    username: text("username")?,
                    password: secure["password"].as_str().unwrap_or_default().to_string(),
                    ssl_mode: config["sslmode"]
                        .as_str()
                        .unwrap_or(tls::DEFAULT_SSL_MODE)
                        .to_string(),
                }
            }
        };

        Ok(Self { engine, params })
    }

    /// Credential-free description for logs, e.g. `postgres://alice@db:5432/shop`.
    pub fn display_target(&self) -> String {
        match &self.params {
            ConnectionParams::Server {
                host,
                port,
                database,
                username,
                ..
            } => format!("{}://{username}@{host}:{port}/{database}", self.engine),
            ConnectionParams::File { path } => format!("sqlite://{path}"),
        }
    }
}

// ---------- session ----------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// A short-lived connection to a target database.
///
/// Sessions are opened, used and closed within a single operation; nothing
/// holds one across requests.
#[async_trait::async_trait]
pub trait Session: Send {
    fn engine(&self) -> Engine;

    /// Run one statement. Parameters are bound positionally as text.
    async fn execute(&mut self, sql: &str, params: &[String])
    -> Result<QueryResult, ConnectorError>;

    /// Up to `limit` distinct non-null values of one column, rendered as text.
    async fn sample_values(
        &mut self,
        schema: &str,
        table: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, ConnectorError> {
        let engine = self.engine();
        let col = engine.quote_ident(column);
        let sql = format!(
            "SELECT DISTINCT {} FROM {} WHERE {col} IS NOT NULL LIMIT {limit}",
            engine.text_cast(&col),
            engine.qualified(schema, table),
        );
        let result = self.execute(&sql, &[]).await?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    async fn close(&mut self);
}

#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, cfg: &ConnectionConfig) -> Result<Box<dyn Session>, ConnectorError>;
}

/// Connector backed by the real drivers: tokio-postgres for Postgres, sqlx for MySQL and SQLite.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriverConnector;

#[async_trait::async_trait]
impl Connector for DriverConnector {
    async fn connect(&self, cfg: &ConnectionConfig) -> Result<Box<dyn Session>, ConnectorError> {
        match cfg.engine {
            Engine::Postgres => Ok(Box::new(PostgresSession::connect(cfg).await?)),
            Engine::Mysql | Engine::Sqlite => Ok(Box::new(SqlxSession::connect(cfg).await?)),
        }
    }
}

// ---------- one-shot operations ----------

/// Minimal round trip (`SELECT 1`). Driver failures become `(false, message)`.
pub async fn test_connection(connector: &dyn Connector, cfg: &ConnectionConfig) -> OperationStatus {
    let mut session = match connector.connect(cfg).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(target_db = %cfg.display_target(), error = %e, "test connection failed");
            return OperationStatus::failed(e.to_string());
        }
    };

    let outcome = session.execute("SELECT 1", &[]).await;
    session.close().await;

    match outcome {
        Ok(_) => OperationStatus::ok("Connection successful"),
        Err(e) => {
            tracing::error!(target_db = %cfg.display_target(), error = %e, "test query failed");
            OperationStatus::failed(e.to_string())
        }
    }
}

/// Open a session, run one statement, close the session.
pub async fn execute_query(
    connector: &dyn Connector,
    cfg: &ConnectionConfig,
    sql: &str,
    params: &[String],
) -> Result<QueryResult, ConnectorError> {
    let mut session = connector.connect(cfg).await?;
    let result = session.execute(sql, params).await;
    session.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_quoting() {
        assert_eq!(Engine::Postgres.quote_ident("order"), "\"order\"");
        assert_eq!(Engine::Sqlite.quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Engine::Mysql.quote_ident("a`b"), "`a``b`");
        assert_eq!(Engine::Mysql.qualified("shop", "orders"), "`shop`.`orders`");
    }

    #[test]
    fn test_engine_parse() {
        assert_eq!(Engine::parse("postgresql"), Some(Engine::Postgres));
        assert_eq!(Engine::parse("mariadb"), Some(Engine::Mysql));
        assert_eq!(Engine::parse("oracle"), None);
    }

    #[test]
    fn test_from_parts_server() {
        let cfg = ConnectionConfig::from_parts(
            "postgres",
            &serde_json::json!({"host": "db", "port": "6543", "database": "shop", "username": "alice"}),
            &serde_json::json!({"password": "pw"}),
        )
        .unwrap();
        match &cfg.params {
            ConnectionParams::Server {
                port,
                password,
                ssl_mode,
                ..
            } => {
                assert_eq!(*port, 6543);
                assert_eq!(password, "pw");
                assert_eq!(ssl_mode, "require");
            }
            ConnectionParams::File { .. } => panic!("expected server params"),
        }
        assert_eq!(cfg.display_target(), "postgres://alice@db:6543/shop");
        assert!(!format!("{cfg:?}").contains("pw"));
    }

    #[test]
    fn test_from_parts_rejects_bad_input() {
        let empty = serde_json::json!({});
        assert!(matches!(
            ConnectionConfig::from_parts("oracle", &empty, &empty),
            Err(ConnectorError::UnsupportedEngine(_))
        ));
        assert!(matches!(
            ConnectionConfig::from_parts("sqlite", &empty, &empty),
            Err(ConnectorError::InvalidConfig(_))
        ));
        let bad_port = serde_json::json!({"host": "h", "port": 70000, "database": "d", "username": "u"});
        assert!(matches!(
            ConnectionConfig::from_parts("mysql", &bad_port, &empty),
            Err(ConnectorError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_failure_is_normalized() {
        let cfg = ConnectionConfig {
            engine: Engine::Sqlite,
            params: ConnectionParams::File {
                path: "/nonexistent/dir/missing.db".to_string(),
            },
        };
        let status = test_connection(&DriverConnector, &cfg).await;
        assert!(!status.success);
        assert!(status.message.starts_with("Connection error"), "{}", status.message);
    }

    #[tokio::test]
    async fn test_connection_and_sampling_against_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.db");
        let cfg = crate::testing::sqlite_target(
            &path,
            &[
                "CREATE TABLE products (id INTEGER PRIMARY KEY, category TEXT)",
                "INSERT INTO products (category) VALUES ('books'), ('games'), ('books'), (NULL)",
            ],
        )
        .await;

        let status = test_connection(&DriverConnector, &cfg).await;
        assert!(status.success, "{}", status.message);

        let mut session = DriverConnector.connect(&cfg).await.unwrap();
        let mut samples = session
            .sample_values("main", "products", "category", 10)
            .await
            .unwrap();
        session.close().await;
        samples.sort_by_key(|v| v.to_string());
        assert_eq!(samples, vec![serde_json::json!("books"), serde_json::json!("games")]);

        let result = execute_query(
            &DriverConnector,
            &cfg,
            "SELECT id, category FROM products WHERE category = ? ORDER BY id",
            &["books".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(result.columns, vec!["id", "category"]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0], vec![serde_json::json!(1), serde_json::json!("books")]);
    }

    #[tokio::test]
    async fn test_execute_query_reports_bad_sql() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = crate::testing::sqlite_target(&dir.path().join("t.db"), &[]).await;
        let err = execute_query(&DriverConnector, &cfg, "SELEC nope", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Query(_)));
    }
}
