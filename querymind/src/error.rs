use serde::Serialize;
use uuid::Uuid;

use crate::connector::ConnectorError;
use crate::crypto::CryptoError;
use crate::database_types::ConfigError;
use crate::discovery::DiscoveryError;
use crate::llm::GatewayError;
use crate::store::StoreError;

/// Failure taxonomy of the core operations.
#[derive(Debug)]
pub enum ServiceError {
    /// Cannot reach or authenticate to the target database.
    Connection(String),
    /// The target database rejected a statement.
    Query(String),
    /// No API key for the selected language model provider.
    CredentialMissing(String),
    /// The language model call failed; carries the gateway's message.
    GenerationFailed(String),
    /// Embedding provider failure.
    Gateway(GatewayError),
    DatabaseNotFound(Uuid),
    SchemaNotExtracted(Uuid),
    InvalidMetadataKind(String),
    NotFound(String),
    InvalidRelationship(String),
    InvalidInput(String),
    Config(ConfigError),
    Crypto(CryptoError),
    Store(sea_orm::DbErr),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Connection(msg) => write!(f, "Connection error: {msg}"),
            ServiceError::Query(msg) => write!(f, "Query error: {msg}"),
            ServiceError::CredentialMissing(msg) => write!(f, "{msg}"),
            ServiceError::GenerationFailed(msg) => write!(f, "Generation failed: {msg}"),
            ServiceError::Gateway(e) => write!(f, "{e}"),
            ServiceError::DatabaseNotFound(id) => write!(f, "Database not found: {id}"),
            ServiceError::SchemaNotExtracted(_) => write!(
                f,
                "Could not retrieve database schema. Please ensure metadata has been extracted."
            ),
            ServiceError::InvalidMetadataKind(kind) => write!(
                f,
                "Invalid metadata type specified: '{kind}' (expected table, column or relationship)"
            ),
            ServiceError::NotFound(msg) => write!(f, "{msg} not found"),
            ServiceError::InvalidRelationship(msg) => write!(f, "Invalid relationship: {msg}"),
            ServiceError::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            ServiceError::Config(e) => write!(f, "{e}"),
            ServiceError::Crypto(e) => write!(f, "{e}"),
            ServiceError::Store(e) => write!(f, "Metadata store error: {e}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<ConnectorError> for ServiceError {
    fn from(e: ConnectorError) -> Self {
        match e {
            ConnectorError::Connect(msg) => ServiceError::Connection(msg),
            ConnectorError::Query(msg) => ServiceError::Query(msg),
            other => ServiceError::Connection(other.to_string()),
        }
    }
}

impl From<DiscoveryError> for ServiceError {
    fn from(e: DiscoveryError) -> Self {
        match e {
            DiscoveryError::Connect(msg) => ServiceError::Connection(msg),
            DiscoveryError::Query(msg) => ServiceError::Query(msg),
            other => ServiceError::Query(other.to_string()),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Db(e) => ServiceError::Store(e),
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::InvalidRelationship(msg) => ServiceError::InvalidRelationship(msg),
            StoreError::UnsupportedKind(kind) => ServiceError::InvalidMetadataKind(kind),
        }
    }
}

impl From<sea_orm::DbErr> for ServiceError {
    fn from(e: sea_orm::DbErr) -> Self {
        ServiceError::Store(e)
    }
}

impl From<CryptoError> for ServiceError {
    fn from(e: CryptoError) -> Self {
        ServiceError::Crypto(e)
    }
}

impl From<ConfigError> for ServiceError {
    fn from(e: ConfigError) -> Self {
        ServiceError::Config(e)
    }
}

impl From<GatewayError> for ServiceError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::CredentialMissing(_) => ServiceError::CredentialMissing(e.to_string()),
            other => ServiceError::Gateway(other),
        }
    }
}

/// `(success, message)` outcome returned by the outward-facing operations
/// that never fail with an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationStatus {
    pub success: bool,
    pub message: String,
}

impl OperationStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
