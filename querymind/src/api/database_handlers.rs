use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use crate::connector::{self, ConnectionConfig, QueryResult};
use crate::database_types::{self, DatabaseType};
use crate::entity::client_database;
use crate::error::{OperationStatus, ServiceError};
use crate::store;

use super::{
    ApiErr, ApiState,
    dto::{CreateDatabaseRequest, DatabaseResponse, QueryRequest, UpdateDatabaseRequest},
    jwt::AuthClaims,
};

fn db_response(model: client_database::Model) -> Result<DatabaseResponse, ApiErr> {
    DatabaseResponse::try_from(model).map_err(ApiErr::internal)
}

fn unique_violation(e: sea_orm::DbErr) -> ApiErr {
    let msg = e.to_string();
    if msg.contains("UNIQUE") || msg.contains("unique") {
        ApiErr::conflict("Database name already exists")
    } else {
        ApiErr::internal(e)
    }
}

/// The caller's database, or 404 when it is missing or owned by someone else.
pub(crate) async fn owned_database(
    state: &ApiState,
    id: Uuid,
    owner_id: Uuid,
) -> Result<client_database::Model, ApiErr> {
    Ok(store::find_owned_database(&state.db, id, owner_id).await?)
}

// ---------- GET /database-types ----------

pub async fn list_database_types(AuthClaims(_): AuthClaims) -> Json<&'static [DatabaseType]> {
    Json(database_types::all())
}

// ---------- GET /databases ----------

pub async fn list_databases(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
) -> Result<Json<Vec<DatabaseResponse>>, ApiErr> {
    let models = store::list_databases(&state.db, claims.sub).await?;
    let data = models
        .into_iter()
        .map(db_response)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(data))
}

// ---------- POST /databases ----------

pub async fn create_database(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Json(body): Json<CreateDatabaseRequest>,
) -> Result<(StatusCode, Json<DatabaseResponse>), ApiErr> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiErr::bad_request("name must not be empty"));
    }

    let (config_json, secure_json) = database_types::split_config(&body.engine, body.config)
        .map_err(|e| ApiErr::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;
    let secure_str = state.cipher.seal(&secure_json).map_err(ApiErr::internal)?;
    let config_str = serde_json::to_string(&config_json).map_err(ApiErr::internal)?;

    let now = Utc::now().naive_utc();
    let model = client_database::ActiveModel {
        id: Set(Uuid::now_v7()),
        owner_id: Set(claims.sub),
        name: Set(name.to_string()),
        engine: Set(body.engine),
        config: Set(config_str),
        secure_config: Set(secure_str),
        last_extracted_at: Set(None),
        last_extraction_result: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await
    .map_err(unique_violation)?;

    tracing::info!(database_id = %model.id, engine = %model.engine, "database registered");
    Ok((StatusCode::CREATED, Json(db_response(model)?)))
}

// ---------- GET /databases/{id} ----------

pub async fn get_database(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DatabaseResponse>, ApiErr> {
    let model = owned_database(&state, id, claims.sub).await?;
    Ok(Json(db_response(model)?))
}

// ---------- PUT /databases/{id} ----------

pub async fn update_database(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateDatabaseRequest>,
) -> Result<Json<DatabaseResponse>, ApiErr> {
    let model = owned_database(&state, id, claims.sub).await?;
    let mut active: client_database::ActiveModel = model.clone().into();

    if let Some(name) = body.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiErr::bad_request("name must not be empty"));
        }
        active.name = Set(name.to_string());
    }

    if let Some(config_input) = body.config {
        let existing_config: serde_json::Value =
            serde_json::from_str(&model.config).map_err(ApiErr::internal)?;
        let existing_secure = state
            .cipher
            .open(&model.secure_config)
            .map_err(ApiErr::internal)?;

        let (new_config, new_secure) = database_types::merge_config(
            &model.engine,
            existing_config,
            existing_secure,
            config_input,
        )
        .map_err(|e| ApiErr::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

        active.config = Set(serde_json::to_string(&new_config).map_err(ApiErr::internal)?);
        active.secure_config = Set(state.cipher.seal(&new_secure).map_err(ApiErr::internal)?);
    }

    active.updated_at = Set(Utc::now().naive_utc());
    let updated = active.update(&state.db).await.map_err(unique_violation)?;
    Ok(Json(db_response(updated)?))
}

// ---------- DELETE /databases/{id} ----------

/// Removes the database and, by cascade, all of its metadata.
pub async fn delete_database(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiErr> {
    let model = owned_database(&state, id, claims.sub).await?;
    let active: client_database::ActiveModel = model.into();
    active.delete(&state.db).await.map_err(ApiErr::internal)?;
    tracing::info!(database_id = %id, "database removed");
    Ok(StatusCode::NO_CONTENT)
}

// ---------- POST /databases/{id}/test ----------

pub async fn test_database(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OperationStatus>, ApiErr> {
    let model = owned_database(&state, id, claims.sub).await?;
    let cfg = match ConnectionConfig::from_model(&model, &state.cipher) {
        Ok(cfg) => cfg,
        Err(e) => return Ok(Json(OperationStatus::failed(e.to_string()))),
    };
    Ok(Json(
        connector::test_connection(state.connector.as_ref(), &cfg).await,
    ))
}

// ---------- POST /databases/{id}/query ----------

pub async fn run_query(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<QueryResult>, ApiErr> {
    let model = owned_database(&state, id, claims.sub).await?;
    let cfg = ConnectionConfig::from_model(&model, &state.cipher).map_err(ServiceError::from)?;
    let result = connector::execute_query(state.connector.as_ref(), &cfg, &body.sql, &body.params)
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(result))
}

// ---------- tests ----------
