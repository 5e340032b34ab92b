use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, Statement, TypeInfo, ValueRef};

use super::{ConnectionConfig, ConnectionParams, ConnectorError, Engine, QueryResult, Session};

enum Conn {
    Mysql(MySqlConnection),
    Sqlite(SqliteConnection),
}

/// Session over a single sqlx connection (MySQL or SQLite).
pub struct SqlxSession {
    engine: Engine,
    conn: Option<Conn>,
}

fn connect_err(e: sqlx::Error) -> ConnectorError {
    ConnectorError::Connect(e.to_string())
}

fn query_err(e: sqlx::Error) -> ConnectorError {
    ConnectorError::Query(e.to_string())
}

impl SqlxSession {
    pub async fn connect(cfg: &ConnectionConfig) -> Result<Self, ConnectorError> {
        let conn = match (&cfg.engine, &cfg.params) {
            (
                Engine::Mysql,
                ConnectionParams::Server {
                    host,
                    port,
                    database,
                    username,
                    password,
                    ..
                },
            ) => {
                let mut options = MySqlConnectOptions::new()
                    .host(host)
                    .port(*port)
                    .username(username)
                    .database(database);
                if !password.is_empty() {
                    options = options.password(password);
                }
                Conn::Mysql(options.connect().await.map_err(connect_err)?)
            }
            (Engine::Sqlite, ConnectionParams::File { path }) => {
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(false);
                Conn::Sqlite(options.connect().await.map_err(connect_err)?)
            }
            (engine, _) => {
                return Err(ConnectorError::InvalidConfig(format!(
                    "connection parameters do not match engine {engine}"
                )));
            }
        };

        Ok(Self {
            engine: cfg.engine,
            conn: Some(conn),
        })
    }
}

#[async_trait::async_trait]
impl Session for SqlxSession {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[String],
    ) -> Result<QueryResult, ConnectorError> {
        match self.conn.as_mut() {
            Some(Conn::Mysql(conn)) => {
                let stmt = Executor::prepare(&mut *conn, sql).await.map_err(query_err)?;
                let columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
                let mut query = stmt.query();
                for p in params {
                    query = query.bind(p.clone());
                }
                let rows = query.fetch_all(&mut *conn).await.map_err(query_err)?;
                let rows = rows
                    .iter()
                    .map(|row| {
                        (0..row.len())
                            .map(|idx| mysql_value(row, idx))
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(query_err)?;
                Ok(QueryResult { columns, rows })
            }
            Some(Conn::Sqlite(conn)) => {
                let stmt = Executor::prepare(&mut *conn, sql).await.map_err(query_err)?;
                let columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
                let mut query = stmt.query();
                for p in params {
                    query = query.bind(p.clone());
                }
                let rows = query.fetch_all(&mut *conn).await.map_err(query_err)?;
                let rows = rows
                    .iter()
                    .map(|row| {
                        (0..row.len())
                            .map(|idx| sqlite_value(row, idx))
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(query_err)?;
                Ok(QueryResult { columns, rows })
            }
            None => Err(ConnectorError::Query("session is closed".to_string())),
        }
    }

    async fn close(&mut self) {
        let result = match self.conn.take() {
            Some(Conn::Mysql(conn)) => conn.close().await,
            Some(Conn::Sqlite(conn)) => conn.close().await,
            None => Ok(()),
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, engine = %self.engine, "error closing target connection");
        }
    }
}

/// SQLite is dynamically typed: decode by the value's storage class.
fn sqlite_value(row: &SqliteRow, idx: usize) -> Result<Value, sqlx::Error> {
    let storage = {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_string()
    };

    Ok(match storage.as_str() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(idx)?),
        "REAL" => Value::from(row.try_get_unchecked::<f64, _>(idx)?),
        "BLOB" => Value::String(STANDARD.encode(row.try_get_unchecked::<Vec<u8>, _>(idx)?)),
        _ => Value::String(row.try_get_unchecked::<String, _>(idx)?),
    })
}

/// MySQL: try the checked decoders from most to least specific.
fn mysql_value(row: &MySqlRow, idx: usize) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(Value::Null);
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = row.try_get::<u64, _>(idx) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
        return Ok(Value::String(v.to_string()));
    }
    if let Ok(v) = row.try_get::<DateTime<Utc>, _>(idx) {
        return Ok(Value::String(v.to_rfc3339()));
    }
    if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
        return Ok(Value::String(v.to_string()));
    }
    if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
        return Ok(Value::String(v.to_string()));
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return Ok(Value::String(v));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
        return Ok(Value::String(STANDARD.encode(v)));
    }
    // DECIMAL and friends travel as text in the binary protocol
    row.try_get_unchecked::<String, _>(idx).map(Value::String)
}
