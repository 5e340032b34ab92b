use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::set_header::response::SetResponseHeaderLayer;

use crate::config::Settings;
use crate::connector::Connector;
use crate::crypto::CredentialCipher;
use crate::describe::DescriptionGenerator;
use crate::error::ServiceError;
use crate::extractor::MetadataExtractor;
use crate::llm::LanguageModel;
use crate::nl2sql::NlToSql;
use crate::vectorizer::{Embedder, Vectorizer};

pub mod assistant_handlers;
pub mod database_handlers;
pub mod dto;
pub mod jwt;
pub mod metadata_handlers;

// ---------- shared state ----------

#[derive(Clone)]
pub struct ApiState {
    pub db: DatabaseConnection,
    pub jwt_secret: String,
    pub cipher: CredentialCipher,
    pub connector: Arc<dyn Connector>,
    pub extractor: Arc<MetadataExtractor>,
    pub vectorizer: Arc<Vectorizer>,
    pub nl2sql: Arc<NlToSql>,
    pub describer: Arc<DescriptionGenerator>,
}

impl ApiState {
    /// Wire every component against one metadata store.
    pub fn new(
        db: DatabaseConnection,
        settings: &Settings,
        connector: Arc<dyn Connector>,
        model: Arc<dyn LanguageModel>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            jwt_secret: settings.jwt_secret.clone(),
            cipher: settings.cipher.clone(),
            extractor: Arc::new(MetadataExtractor::new(
                db.clone(),
                settings.cipher.clone(),
                connector.clone(),
                settings.infer_relationships,
            )),
            vectorizer: Arc::new(Vectorizer::new(db.clone(), embedder)),
            nl2sql: Arc::new(NlToSql::new(
                db.clone(),
                model.clone(),
                settings.llm.clone(),
                settings.prompt_token_budget,
            )),
            describer: Arc::new(DescriptionGenerator::new(
                db.clone(),
                settings.cipher.clone(),
                connector.clone(),
                model,
                settings.llm.clone(),
            )),
            connector,
            db,
        }
    }
}

// ---------- error type ----------

/// A JSON error response: `{"error": "..."}` with an HTTP status.
#[derive(Debug)]
pub struct ApiErr(StatusCode, String);

impl ApiErr {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self(status, msg.into())
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(StatusCode::UNAUTHORIZED, msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(StatusCode::NOT_FOUND, msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self(StatusCode::CONFLICT, msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, msg.into())
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.1 });
        (self.0, Json(body)).into_response()
    }
}

impl From<ServiceError> for ApiErr {
    fn from(e: ServiceError) -> Self {
        let status = match &e {
            ServiceError::DatabaseNotFound(_) | ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::SchemaNotExtracted(_) => StatusCode::CONFLICT,
            ServiceError::InvalidMetadataKind(_)
            | ServiceError::InvalidRelationship(_)
            | ServiceError::InvalidInput(_)
            | ServiceError::Query(_) => StatusCode::BAD_REQUEST,
            ServiceError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::CredentialMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Connection(_)
            | ServiceError::GenerationFailed(_)
            | ServiceError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Crypto(_) | ServiceError::Store(_) => {
                tracing::error!(error = %e, "internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self(status, e.to_string())
    }
}

impl From<crate::store::StoreError> for ApiErr {
    fn from(e: crate::store::StoreError) -> Self {
        ServiceError::from(e).into()
    }
}

// ---------- router ----------

pub fn api_router(state: ApiState, cors_allowed_origins: &[String]) -> Router {
    let allowed_origins: Vec<HeaderValue> = cors_allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = if allowed_origins.is_empty() {
        CorsLayer::new() // same-origin only
    } else {
        CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
    };

    Router::new()
        .nest("/api/v1", api_v1())
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .with_state(state)
}

fn api_v1() -> Router<ApiState> {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route(
            "/database-types",
            get(database_handlers::list_database_types),
        )
        // client databases
        .route(
            "/databases",
            get(database_handlers::list_databases).post(database_handlers::create_database),
        )
        .route(
            "/databases/{id}",
            get(database_handlers::get_database)
                .put(database_handlers::update_database)
                .delete(database_handlers::delete_database),
        )
        .route("/databases/{id}/test", post(database_handlers::test_database))
        .route("/databases/{id}/query", post(database_handlers::run_query))
        // metadata
        .route(
            "/databases/{id}/extract",
            post(metadata_handlers::extract_metadata),
        )
        .route(
            "/databases/{id}/embeddings",
            post(metadata_handlers::update_embeddings),
        )
        .route("/databases/{id}/search", get(metadata_handlers::search))
        .route("/databases/{id}/schema", get(metadata_handlers::get_schema))
        .route(
            "/databases/{id}/relationships",
            get(metadata_handlers::list_relationships)
                .post(metadata_handlers::create_relationship),
        )
        .route(
            "/databases/{id}/description",
            post(metadata_handlers::update_description),
        )
        .route(
            "/databases/{id}/generate-description",
            post(metadata_handlers::generate_description),
        )
        // assistant
        .route("/nl-to-sql", post(assistant_handlers::nl_to_sql))
        .route(
            "/metadata-description",
            post(assistant_handlers::metadata_description),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_needs_no_token() {
        let db = testing::setup_db().await;
        let router = api_router(testing::api_state(db, testing::RecordingModel::replying("")), &[]);
        let res = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let db = testing::setup_db().await;
        let router = api_router(testing::api_state(db, testing::RecordingModel::replying("")), &[]);
        let res = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/databases")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn service_errors_map_to_statuses() {
        let status = |e: ServiceError| ApiErr::from(e).0;
        assert_eq!(
            status(ServiceError::DatabaseNotFound(uuid::Uuid::nil())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(ServiceError::SchemaNotExtracted(uuid::Uuid::nil())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(ServiceError::InvalidMetadataKind("index".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ServiceError::CredentialMissing("credential missing".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ServiceError::GenerationFailed("HTTP 503".into())),
            StatusCode::BAD_GATEWAY
        );
    }
}
