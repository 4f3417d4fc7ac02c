use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use market_types::api::{CALLBACK_TOKEN_HEADER, USER_ID_HEADER, USER_ROLE_HEADER};
use market_types::domain::actor::{Actor, Role};
use market_types::domain::error::DomainError;
use uuid::Uuid;

use crate::errors::AppError;

fn header_value<'a>(headers: &'a HeaderMap, key: &str, max_len: usize) -> Option<&'a str> {
    let raw = headers.get(key)?.to_str().ok()?.trim();
    if raw.is_empty() || raw.len() > max_len {
        return None;
    }
    Some(raw)
}

/// The authenticated caller, taken from the identity headers set by the
/// gateway in front of this service.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Actor);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(&parts.headers, USER_ID_HEADER, 64)
            .ok_or_else(|| AppError::Unauthenticated(format!("missing {USER_ID_HEADER} header")))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| AppError::Unauthenticated(format!("{USER_ID_HEADER} is not a UUID")))?;
        let role = header_value(&parts.headers, USER_ROLE_HEADER, 32)
            .ok_or_else(|| AppError::Unauthenticated(format!("missing {USER_ROLE_HEADER} header")))?
            .parse::<Role>()
            .map_err(|_| AppError::Unauthenticated(format!("unknown {USER_ROLE_HEADER}")))?;
        Ok(Caller(Actor::new(user_id, role)))
    }
}

/// Shared secret presented by the payment provider, if any.
#[derive(Debug, Clone)]
pub struct CallbackToken(pub Option<String>);

impl<S> FromRequestParts<S> for CallbackToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CallbackToken(
            header_value(&parts.headers, CALLBACK_TOKEN_HEADER, 256).map(str::to_string),
        ))
    }
}

/// `Json` whose rejections come back in the error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(DomainError::invalid(rejection.body_text()).into()),
        }
    }
}

/// `Query` whose rejections come back in the error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(DomainError::invalid(rejection.body_text()).into()),
        }
    }
}
