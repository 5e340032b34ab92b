use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::Row;

use super::{ConnectionConfig, ConnectionParams, ConnectorError, Engine, QueryResult, Session, tls};

const STATEMENT_TIMEOUT: &str = "60s";

pub struct PostgresSession {
    client: Option<tokio_postgres::Client>,
}

impl PostgresSession {
    pub async fn connect(cfg: &ConnectionConfig) -> Result<Self, ConnectorError> {
        let ConnectionParams::Server {
            host,
            port,
            database,
            username,
            password,
            ssl_mode,
        } = &cfg.params
        else {
            return Err(ConnectorError::InvalidConfig(
                "postgres requires host/port/database".to_string(),
            ));
        };

        let (ssl_mode, connector) = tls::negotiation(ssl_mode)?;
        let mut config = tokio_postgres::Config::new();
        config
            .host(host)
            .port(*port)
            .dbname(database)
            .user(username)
            .password(password)
            .ssl_mode(ssl_mode)
            .connect_timeout(Duration::from_secs(30));

        let (client, connection) = config
            .connect(connector)
            .await
            .map_err(|e| ConnectorError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "target connection error");
            }
        });

        // Avoid hanging on slow introspection or sampling queries
        client
            .batch_execute(&format!("SET statement_timeout = '{STATEMENT_TIMEOUT}'"))
            .await
            .map_err(|e| ConnectorError::Connect(e.to_string()))?;

        Ok(Self {
            client: Some(client),
        })
    }
}

#[async_trait::async_trait]
impl Session for PostgresSession {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[String],
    ) -> Result<QueryResult, ConnectorError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ConnectorError::Query("session is closed".to_string()))?;

        let stmt = client
            .prepare(sql)
            .await
            .map_err(|e| ConnectorError::Query(e.to_string()))?;

        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        let rows = client
            .query(&stmt, &param_refs)
            .await
            .map_err(|e| ConnectorError::Query(e.to_string()))?;

        let columns = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows = rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| pg_value(row, idx, col.type_()))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QueryResult { columns, rows })
    }

    async fn close(&mut self) {
        // Dropping the client ends the spawned connection task.
        self.client.take();
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>, ConnectorError> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| ConnectorError::Query(format!("cannot decode column {idx}: {e}")))
}

/// Decode one cell into JSON. Types without a JSON mapping become a `<type>` marker.
fn pg_value(row: &Row, idx: usize, ty: &Type) -> Result<Value, ConnectorError> {
    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::from),
        Type::CHAR => get::<i8>(row, idx)?.map(Value::from),
        Type::INT2 => get::<i16>(row, idx)?.map(Value::from),
        Type::INT4 => get::<i32>(row, idx)?.map(Value::from),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::from),
        Type::OID => get::<u32>(row, idx)?.map(Value::from),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| Value::from(f64::from(v))),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(Value::from),
        Type::NUMERIC => get::<Decimal>(row, idx)?.map(|d| Value::String(d.to_string())),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            get::<String>(row, idx)?.map(Value::String)
        }
        Type::JSON | Type::JSONB => get::<Value>(row, idx)?,
        Type::UUID => get::<uuid::Uuid>(row, idx)?.map(|u| Value::String(u.to_string())),
        Type::DATE => get::<NaiveDate>(row, idx)?.map(|d| Value::String(d.to_string())),
        Type::TIME => get::<NaiveTime>(row, idx)?.map(|t| Value::String(t.to_string())),
        Type::TIMESTAMP => {
            get::<NaiveDateTime>(row, idx)?.map(|t| Value::String(t.to_string()))
        }
        Type::TIMESTAMPTZ => {
            get::<DateTime<Utc>>(row, idx)?.map(|t| Value::String(t.to_rfc3339()))
        }
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(|b| Value::String(STANDARD.encode(b))),
        _ => Some(Value::String(format!("<{}>", ty.name()))),
    };
    Ok(value.unwrap_or(Value::Null))
}
