//! Registry of supported target engines and the connection fields each accepts.
//!
//! A registered database stores its connection object in two halves: the
//! plain `config` and the encrypted `secure_config`. Fields flagged
//! `is_secret` always land in the second half.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::connector::tls;

/// Input widget for a connection field. Serialized as `field_type` plus
/// `options` for selects.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "field_type", content = "options", rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Select(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Field {
    pub key: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub kind: FieldKind,
    pub required: bool,
    pub is_secret: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<&'static str>,
}

impl Field {
    const fn text(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            kind: FieldKind::Text,
            required: true,
            is_secret: false,
            default_value: None,
        }
    }

    const fn port(default: &'static str) -> Self {
        Self {
            kind: FieldKind::Number,
            default_value: Some(default),
            ..Self::text("port", "Port")
        }
    }

    const fn password() -> Self {
        Self {
            required: false,
            is_secret: true,
            ..Self::text("password", "Password")
        }
    }
}

/// Connection fields accepted for one target database engine.
#[derive(Debug, Serialize)]
pub struct DatabaseType {
    pub engine: &'static str,
    pub label: &'static str,
    pub fields: &'static [Field],
}

const SERVER_FIELDS_MYSQL: &[Field] = &[
    Field::text("host", "Host"),
    Field::port("3306"),
    Field::text("database", "Database"),
    Field::text("username", "Username"),
    Field::password(),
];

const SERVER_FIELDS_POSTGRES: &[Field] = &[
    Field::text("host", "Host"),
    Field::port("5432"),
    Field::text("database", "Database"),
    Field::text("username", "Username"),
    Field::password(),
    Field {
        kind: FieldKind::Select(tls::SSL_MODES),
        default_value: Some(tls::DEFAULT_SSL_MODE),
        ..Field::text("sslmode", "SSL Mode")
    },
];

static DATABASE_TYPES: &[DatabaseType] = &[
    DatabaseType {
        engine: "postgres",
        label: "PostgreSQL",
        fields: SERVER_FIELDS_POSTGRES,
    },
    DatabaseType {
        engine: "mysql",
        label: "MySQL",
        fields: SERVER_FIELDS_MYSQL,
    },
    DatabaseType {
        engine: "sqlite",
        label: "SQLite",
        fields: &[Field::text("path", "File path")],
    },
];

pub fn all() -> &'static [DatabaseType] {
    DATABASE_TYPES
}

pub fn lookup(engine: &str) -> Option<&'static DatabaseType> {
    DATABASE_TYPES.iter().find(|d| d.engine == engine)
}

#[derive(Debug)]
pub enum ConfigError {
    UnknownEngine(String),
    MissingField(&'static str),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::UnknownEngine(e) => write!(f, "Unsupported database engine '{e}'"),
            ConfigError::MissingField(k) => write!(f, "Connection field '{k}' is required"),
            ConfigError::Invalid(msg) => write!(f, "Invalid connection config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The plain and secret halves being assembled for one database.
#[derive(Default)]
struct Halves {
    config: Map<String, Value>,
    secure: Map<String, Value>,
}

impl Halves {
    fn put(&mut self, field: &Field, value: Value) {
        let half = if field.is_secret {
            &mut self.secure
        } else {
            &mut self.config
        };
        half.insert(field.key.to_string(), value);
    }

    fn into_pair(self) -> (Value, Value) {
        (Value::Object(self.config), Value::Object(self.secure))
    }
}

fn fields_and_input<'a>(
    engine: &str,
    input: &'a Value,
) -> Result<(&'static [Field], &'a Map<String, Value>), ConfigError> {
    let def = lookup(engine).ok_or_else(|| ConfigError::UnknownEngine(engine.to_string()))?;
    let input = input
        .as_object()
        .ok_or_else(|| ConfigError::Invalid("expected a JSON object".to_string()))?;
    Ok((def.fields, input))
}

impl Field {
    fn default_json(&self) -> Option<Value> {
        let raw = self.default_value?;
        match self.kind {
            FieldKind::Number => raw.parse::<i64>().ok().map(Value::from),
            _ => Some(Value::String(raw.to_string())),
        }
    }

    fn check(&self, value: &Value) -> Result<(), ConfigError> {
        match self.kind {
            FieldKind::Select(options) if !value.as_str().is_some_and(|s| options.contains(&s)) => {
                Err(ConfigError::Invalid(format!(
                    "'{}' must be one of: {}",
                    self.key,
                    options.join(", ")
                )))
            }
            FieldKind::Number
                if value.as_u64().is_none()
                    && !value.as_str().is_some_and(|s| s.parse::<u64>().is_ok()) =>
            {
                Err(ConfigError::Invalid(format!(
                    "'{}' must be a whole number",
                    self.key
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Split a flat connection object into `(config, secure_config)`.
///
/// Defaults fill absent or null fields, required fields are enforced, and
/// keys the engine does not declare are dropped.
pub fn split_config(engine: &str, input: Value) -> Result<(Value, Value), ConfigError> {
    let (fields, input) = fields_and_input(engine, &input)?;
    let mut halves = Halves::default();

    for field in fields {
        let value = match input.get(field.key) {
            Some(v) if !v.is_null() => v.clone(),
            _ => match field.default_json() {
                Some(d) => d,
                None if field.required => return Err(ConfigError::MissingField(field.key)),
                None => continue,
            },
        };
        field.check(&value)?;
        halves.put(field, value);
    }

    Ok(halves.into_pair())
}

/// Apply a partial update to stored halves. Absent fields keep their stored
/// value; so does a secret sent as an empty string.
pub fn merge_config(
    engine: &str,
    config: Value,
    secure: Value,
    update: Value,
) -> Result<(Value, Value), ConfigError> {
    let (fields, update) = fields_and_input(engine, &update)?;
    let mut halves = Halves::default();

    for field in fields {
        let stored = if field.is_secret { &secure } else { &config };
        let incoming = update
            .get(field.key)
            .filter(|v| !(field.is_secret && v.as_str() == Some("")));

        match incoming {
            Some(v) => {
                field.check(v)?;
                halves.put(field, v.clone());
            }
            None => {
                if let Some(v) = stored.get(field.key) {
                    halves.put(field, v.clone());
                }
            }
        }
    }

    Ok(halves.into_pair())
}
