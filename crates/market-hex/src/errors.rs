use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use market_types::api::{Envelope, ErrorBody};
use market_types::domain::error::DomainError;
use market_types::ports::repository::RepoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => AppError::Domain(e),
            RepoError::DbError(msg) => AppError::Internal(anyhow::anyhow!("repository: {msg}")),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) => StatusCode::NOT_FOUND,
            AppError::Domain(DomainError::Authorization(_)) => StatusCode::FORBIDDEN,
            AppError::Domain(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Envelope body. Internal causes never leave the process.
    pub fn body(&self) -> ErrorBody {
        match self {
            AppError::Domain(e) => ErrorBody::from(e),
            AppError::Unauthenticated(msg) => ErrorBody {
                code: "AUTHORIZATION_ERROR".into(),
                message: msg.clone(),
                details: None,
            },
            AppError::Internal(_) => ErrorBody {
                code: "INTERNAL_SERVER_ERROR".into(),
                message: "internal server error".into(),
                details: None,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            AppError::Internal(cause) => tracing::error!(error = ?cause, "request failed"),
            AppError::Unauthenticated(msg) => tracing::debug!(reason = %msg, "rejected caller"),
            AppError::Domain(e) => tracing::debug!(code = e.code(), error = %e, "request rejected"),
        }
        (status, Json(Envelope::<()>::err(self.body()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases = [
            (DomainError::EmptyOrder, StatusCode::BAD_REQUEST),
            (DomainError::not_found("order", Uuid::nil()), StatusCode::NOT_FOUND),
            (DomainError::forbidden("nope"), StatusCode::FORBIDDEN),
            (
                DomainError::DriverUnavailable(Uuid::nil()),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
        assert_eq!(
            AppError::Unauthenticated("missing".into()).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn internal_message_is_withheld() {
        let err = AppError::from(RepoError::DbError("disk I/O error at /var/db".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = err.body();
        assert_eq!(body.code, "INTERNAL_SERVER_ERROR");
        assert!(!body.message.contains("disk"));
    }

    #[test]
    fn repo_domain_errors_keep_their_code() {
        let err = AppError::from(RepoError::Domain(DomainError::ShipmentAlreadyActive(
            Uuid::nil(),
        )));
        assert_eq!(err.body().code, "SHIPMENT_ALREADY_ACTIVE");
    }
}
