use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::connector::{ConnectorError, Engine, Session};

pub mod mysql;
pub mod postgres;
pub mod sqlite;

// ---------- DTOs ----------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredTable {
    pub schema_name: String,
    pub table_name: String,
    /// "TABLE", "VIEW", or "MATERIALIZED VIEW"
    pub table_type: String,
    pub row_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredColumn {
    pub schema_name: String,
    pub table_name: String,
    pub column_name: String,
    pub ordinal_position: i32,
    /// Engine-reported type string (e.g. "character varying", "int(11)")
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveredForeignKey {
    pub from_schema: String,
    pub from_table: String,
    pub from_column: String,
    pub to_schema: String,
    pub to_table: String,
    pub to_column: String,
}

/// Everything one introspection pass found, ordered by schema, table, ordinal.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    pub tables: Vec<DiscoveredTable>,
    pub columns: Vec<DiscoveredColumn>,
    pub foreign_keys: Vec<DiscoveredForeignKey>,
}

// ---------- type families ----------

/// Closed vocabulary the engine-specific type names are normalized into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Integer,
    Decimal,
    Float,
    Text,
    Boolean,
    Date,
    Time,
    Timestamp,
    Uuid,
    Json,
    Binary,
    Other,
}

impl TypeFamily {
    pub fn from_engine_type(raw: &str) -> Self {
        let lower = raw.trim().to_ascii_lowercase();
        if lower.starts_with("tinyint(1)") {
            return Self::Boolean;
        }
        let base = lower
            .split('(')
            .next()
            .unwrap_or_default()
            .trim_end_matches(" unsigned")
            .trim();

        match base {
            "bool" | "boolean" | "bit" => Self::Boolean,
            "date" => Self::Date,
            "datetime" | "smalldatetime" => Self::Timestamp,
            "uuid" | "uniqueidentifier" => Self::Uuid,
            "json" | "jsonb" => Self::Json,
            "numeric" | "decimal" | "money" | "number" => Self::Decimal,
            "real" | "float" | "float4" | "float8" | "double" | "double precision" => Self::Float,
            "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "smallint" | "tinyint"
            | "mediumint" | "serial" | "bigserial" | "smallserial" | "year" => Self::Integer,
            "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
                Self::Binary
            }
            b if b.starts_with("timestamp") => Self::Timestamp,
            b if b.starts_with("time") => Self::Time,
            b if b.contains("char")
                || b.contains("text")
                || b.contains("clob")
                || matches!(b, "name" | "citext" | "enum" | "set" | "string") =>
            {
                Self::Text
            }
            // SQLite affinity rules for free-form declared types
            b if b.contains("int") && !b.contains("interval") && !b.contains("point") => {
                Self::Integer
            }
            b if b.contains("blob") => Self::Binary,
            b if b.contains("real") || b.contains("floa") || b.contains("doub") => Self::Float,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Float => "float",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::Timestamp => "timestamp",
            Self::Uuid => "uuid",
            Self::Json => "json",
            Self::Binary => "binary",
            Self::Other => "other",
        }
    }
}

// ---------- errors ----------

#[derive(Debug)]
pub enum DiscoveryError {
    Connect(String),
    Query(String),
    UnexpectedRow(String),
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::Connect(msg) => write!(f, "Connection error: {msg}"),
            DiscoveryError::Query(msg) => write!(f, "Query error: {msg}"),
            DiscoveryError::UnexpectedRow(msg) => write!(f, "Unexpected introspection row: {msg}"),
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<ConnectorError> for DiscoveryError {
    fn from(e: ConnectorError) -> Self {
        match e {
            ConnectorError::Connect(msg) => DiscoveryError::Connect(msg),
            ConnectorError::Query(msg) => DiscoveryError::Query(msg),
            other => DiscoveryError::Connect(other.to_string()),
        }
    }
}

// ---------- trait ----------

#[async_trait::async_trait]
pub trait DiscoveryProvider: Send + Sync {
    async fn discover_tables(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<DiscoveredTable>, DiscoveryError>;

    async fn discover_columns(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<DiscoveredColumn>, DiscoveryError>;

    async fn discover_foreign_keys(
        &self,
        session: &mut dyn Session,
    ) -> Result<Vec<DiscoveredForeignKey>, DiscoveryError>;
}

// ---------- factory ----------

pub fn create_provider(engine: Engine) -> Box<dyn DiscoveryProvider> {
    match engine {
        Engine::Postgres => Box::new(postgres::PostgresDiscoveryProvider),
        Engine::Mysql => Box::new(mysql::MySqlDiscoveryProvider),
        Engine::Sqlite => Box::new(sqlite::SqliteDiscoveryProvider),
    }
}

/// Run a full introspection pass over one session.
pub async fn discover(
    provider: &dyn DiscoveryProvider,
    session: &mut dyn Session,
) -> Result<SchemaSnapshot, DiscoveryError> {
    let mut tables = provider.discover_tables(session).await?;
    let mut columns = provider.discover_columns(session).await?;
    let mut foreign_keys = provider.discover_foreign_keys(session).await?;

    tables.sort_by(|a, b| {
        (a.schema_name.as_str(), a.table_name.as_str())
            .cmp(&(b.schema_name.as_str(), b.table_name.as_str()))
    });
    columns.sort_by(|a, b| {
        (a.schema_name.as_str(), a.table_name.as_str(), a.ordinal_position).cmp(&(
            b.schema_name.as_str(),
            b.table_name.as_str(),
            b.ordinal_position,
        ))
    });
    foreign_keys.sort_by(|a, b| {
        (&a.from_schema, &a.from_table, &a.from_column).cmp(&(
            &b.from_schema,
            &b.from_table,
            &b.from_column,
        ))
    });

    Ok(SchemaSnapshot {
        tables,
        columns,
        foreign_keys,
    })
}

// ---------- heuristic relationships ----------

fn singular_candidates(stem: &str) -> Vec<String> {
    let mut names = vec![stem.to_string(), format!("{stem}s"), format!("{stem}es")];
    if let Some(root) = stem.strip_suffix('y') {
        names.push(format!("{root}ies"));
    }
    names
}

/// Name-based relationships for schemas without declared constraints.
///
/// A non-key column `<stem>_id` points at the table named `<stem>` (or its
/// plural) in the same schema when that table has a single-column primary key.
/// Columns that already carry a declared foreign key are skipped.
pub fn infer_foreign_keys(
    columns: &[DiscoveredColumn],
    declared: &[DiscoveredForeignKey],
) -> Vec<DiscoveredForeignKey> {
    let mut primary_keys: HashMap<(&str, String), Vec<&DiscoveredColumn>> = HashMap::new();
    for col in columns.iter().filter(|c| c.is_primary_key) {
        primary_keys
            .entry((col.schema_name.as_str(), col.table_name.to_ascii_lowercase()))
            .or_default()
            .push(col);
    }

    let declared_from: HashSet<(&str, &str, &str)> = declared
        .iter()
        .map(|fk| {
            (
                fk.from_schema.as_str(),
                fk.from_table.as_str(),
                fk.from_column.as_str(),
            )
        })
        .collect();

    let mut inferred = Vec::new();
    for col in columns.iter().filter(|c| !c.is_primary_key) {
        if declared_from.contains(&(
            col.schema_name.as_str(),
            col.table_name.as_str(),
            col.column_name.as_str(),
        )) {
            continue;
        }
        let lower = col.column_name.to_ascii_lowercase();
        let Some(stem) = lower.strip_suffix("_id").filter(|s| !s.is_empty()) else {
            continue;
        };

        let target = singular_candidates(stem).into_iter().find_map(|name| {
            primary_keys
                .get(&(col.schema_name.as_str(), name))
                .filter(|pks| pks.len() == 1)
                .map(|pks| pks[0])
        });

        if let Some(pk) = target {
            inferred.push(DiscoveredForeignKey {
                from_schema: col.schema_name.clone(),
                from_table: col.table_name.clone(),
                from_column: col.column_name.clone(),
                to_schema: pk.schema_name.clone(),
                to_table: pk.table_name.clone(),
                to_column: pk.column_name.clone(),
            });
        }
    }
    inferred
}

// ---------- row helpers ----------

pub(crate) fn cell_text(row: &[Value], idx: usize) -> Result<String, DiscoveryError> {
    match row.get(idx) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        other => Err(DiscoveryError::UnexpectedRow(format!(
            "expected text at column {idx}, got {other:?}"
        ))),
    }
}

pub(crate) fn cell_opt_text(row: &[Value], idx: usize) -> Option<String> {
    match row.get(idx) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

pub(crate) fn cell_i64(row: &[Value], idx: usize) -> Option<i64> {
    match row.get(idx) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn cell_bool(row: &[Value], idx: usize) -> bool {
    match row.get(idx) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        Some(Value::String(s)) => matches!(
            s.to_ascii_lowercase().as_str(),
            "yes" | "y" | "true" | "t" | "1"
        ),
        _ => false,
    }
}

/// Map information_schema table types onto the stored vocabulary.
pub(crate) fn normalize_table_type(raw: &str) -> String {
    match raw.to_ascii_uppercase().as_str() {
        "BASE TABLE" | "TABLE" | "FOREIGN" | "FOREIGN TABLE" | "SYSTEM VERSIONED" => "TABLE",
        "VIEW" | "SYSTEM VIEW" => "VIEW",
        "MATERIALIZED VIEW" => "MATERIALIZED VIEW",
        _ => "TABLE",
    }
    .to_string()
}
