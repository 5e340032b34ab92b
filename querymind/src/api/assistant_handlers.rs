use axum::{extract::State, response::Json};

use crate::nl2sql::SqlTranslation;

use super::{
    ApiErr, ApiState,
    database_handlers::owned_database,
    dto::{DescribeRequest, DescriptionResponse, NlToSqlRequest},
    jwt::AuthClaims,
};

// ---------- POST /nl-to-sql ----------

/// Translate a question into SQL. The SQL is returned, not executed.
pub async fn nl_to_sql(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Json(body): Json<NlToSqlRequest>,
) -> Result<Json<SqlTranslation>, ApiErr> {
    owned_database(&state, body.database_id, claims.sub).await?;
    let translation = state
        .nl2sql
        .translate(&body.question, body.database_id)
        .await?;
    Ok(Json(translation))
}

// ---------- POST /metadata-description ----------

pub async fn metadata_description(
    AuthClaims(claims): AuthClaims,
    State(state): State<ApiState>,
    Json(body): Json<DescribeRequest>,
) -> Result<Json<DescriptionResponse>, ApiErr> {
    if let Some(database_id) = body.context.database_id {
        owned_database(&state, database_id, claims.sub).await?;
    }
    let description = state
        .describer
        .describe(&body.kind, &body.name, body.context)
        .await?;
    Ok(Json(DescriptionResponse {
        success: true,
        description,
    }))
}

// ---------- tests ----------
