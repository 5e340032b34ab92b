use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiErr, ApiState};

/// Token issued by the identity layer. Only `sub` is consulted, as the owner id.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub username: String,
    /// Unix timestamp expiry
    pub exp: u64,
}

pub fn encode_jwt(claims: &Claims, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), claims, &key)
}

pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256)).map(|data| data.claims)
}

/// The token of an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
fn bearer_token(parts: &Parts) -> Result<&str, ApiErr> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiErr::unauthorized("Authorization header required"))?
        .to_str()
        .map_err(|_| ApiErr::unauthorized("Malformed Authorization header"))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(ApiErr::unauthorized("Authorization must use the Bearer scheme")),
    }
}

/// Extractor for the caller's verified claims; `claims.sub` scopes every
/// database lookup.
pub struct AuthClaims(pub Claims);

impl<S> FromRequestParts<S> for AuthClaims
where
    S: Send + Sync,
    ApiState: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let secret = ApiState::from_ref(state).jwt_secret;
        let claims = decode_jwt(bearer_token(parts)?, &secret).map_err(|e| {
            tracing::debug!(error = %e, "rejected bearer token");
            ApiErr::unauthorized("Invalid or expired token")
        })?;
        Ok(AuthClaims(claims))
    }
}
