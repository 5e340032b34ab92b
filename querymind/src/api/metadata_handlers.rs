use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::error::{OperationStatus, ServiceError};
use crate::store::{self, MetadataKind, RelationshipView, TableView};
use crate::vectorizer::SearchHit;

use super::{
    ApiErr, ApiState,
    database_handlers::owned_database,
    dto::{
        CreateRelationshipRequest, DescribeRequest, DescriptionResponse, SearchQuery,
        UpdateDescriptionRequest,
    },
    jwt::AuthClaims,
};

const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 100;

// ---------- POST /databases/{id}/extract ----------

pub async fn extract_metadata(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OperationStatus>, ApiErr> {
    owned_database(&state, id, claims.sub).await?;
    Ok(Json(state.extractor.extract_full_metadata(id).await))
}

// ---------- POST /databases/{id}/embeddings ----------

pub async fn update_embeddings(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OperationStatus>, ApiErr> {
    owned_database(&state, id, claims.sub).await?;
    Ok(Json(state.vectorizer.update_all_embeddings(id).await))
}

// ---------- GET /databases/{id}/search ----------

pub async fn search(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>, ApiErr> {
    owned_database(&state, id, claims.sub).await?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let hits = state.vectorizer.search_metadata(id, &params.q, limit).await?;
    Ok(Json(hits))
}

// ---------- GET /databases/{id}/schema ----------

pub async fn get_schema(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TableView>>, ApiErr> {
    owned_database(&state, id, claims.sub).await?;
    Ok(Json(store::full_schema(&state.db, id).await?))
}

// ---------- GET /databases/{id}/relationships ----------

pub async fn list_relationships(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RelationshipView>>, ApiErr> {
    owned_database(&state, id, claims.sub).await?;
    Ok(Json(store::relationships_for_database(&state.db, id).await?))
}

// ---------- POST /databases/{id}/relationships ----------

pub async fn create_relationship(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CreateRelationshipRequest>,
) -> Result<(StatusCode, Json<RelationshipView>), ApiErr> {
    owned_database(&state, id, claims.sub).await?;
    let created =
        store::create_relationship(&state.db, id, body.from_column_id, body.to_column_id).await?;
    let view = store::relationships_for_database(&state.db, id)
        .await?
        .into_iter()
        .find(|v| v.id == created.id)
        .ok_or_else(|| ApiErr::internal("created relationship is not visible"))?;
    Ok((StatusCode::CREATED, Json(view)))
}

// ---------- POST /databases/{id}/description ----------

pub async fn update_description(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateDescriptionRequest>,
) -> Result<Json<OperationStatus>, ApiErr> {
    owned_database(&state, id, claims.sub).await?;
    let kind = MetadataKind::parse(&body.kind)
        .ok_or_else(|| ServiceError::InvalidMetadataKind(body.kind.clone()))?;
    store::update_description(&state.db, id, kind, body.id, body.description.trim()).await?;
    Ok(Json(OperationStatus::ok("Description updated")))
}

// ---------- POST /databases/{id}/generate-description ----------

pub async fn generate_description(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(body): Json<DescribeRequest>,
) -> Result<Json<DescriptionResponse>, ApiErr> {
    owned_database(&state, id, claims.sub).await?;
    let description = state
        .describer
        .generate_description(id, &body.kind, &body.name, body.context)
        .await?;
    Ok(Json(DescriptionResponse {
        success: true,
        description,
    }))
}

// ---------- tests ----------
