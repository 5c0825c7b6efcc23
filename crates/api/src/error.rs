//! API error vocabulary (§7) and its HTTP envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::store::StoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("out of order: {0}")]
    OutOfOrder(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited")]
    RateLimited { retry_after_s: u64 },

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("store transient error: {0}")]
    StoreTransient(String),

    #[error("store conflict: {0}")]
    StoreConflict(String),

    #[error("store fatal error: {0}")]
    StoreFatal(String),

    #[error("timeout")]
    Timeout,

    #[error("degraded: {0}")]
    Degraded(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error_kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationDetail>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_s: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, Option<u64>) {
        match self {
            ApiError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", None),
            ApiError::OutOfOrder(_) => (StatusCode::CONFLICT, "OUT_OF_ORDER", None),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT", None),
            ApiError::RateLimited { retry_after_s } => {
                (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", Some(*retry_after_s))
            }
            ApiError::QuotaExceeded(_) => (StatusCode::PAYMENT_REQUIRED, "QUOTA_EXCEEDED", None),
            ApiError::StoreTransient(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_TRANSIENT", None),
            ApiError::StoreConflict(_) => (StatusCode::CONFLICT, "STORE_CONFLICT", None),
            ApiError::StoreFatal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_FATAL", None),
            ApiError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", None),
            ApiError::Degraded(_) => (StatusCode::OK, "DEGRADED", None),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, ApiError::StoreFatal(_)) {
            tracing::error!(error = %self, "store fatal error");
        }

        let (status, error_kind, retry_after_s) = self.parts();
        let message = self.to_string();

        let mut response = (
            status,
            Json(ErrorBody {
                error_kind,
                message,
                details: None,
                retry_after_s,
            }),
        )
            .into_response();

        if let Some(secs) = retry_after_s {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(msg) => ApiError::StoreTransient(msg),
            StoreError::Conflict(msg) => ApiError::StoreConflict(msg),
            StoreError::Fatal(msg) => ApiError::StoreFatal(msg),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("resource not found".into()),
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => ApiError::Conflict("resource already exists".into()),
                        "23503" => ApiError::NotFound("referenced resource not found".into()),
                        _ => ApiError::StoreFatal(format!("database error: {}", db_err)),
                    }
                } else {
                    ApiError::StoreFatal(format!("database error: {}", db_err))
                }
            }
            sqlx::Error::PoolTimedOut => ApiError::StoreTransient("connection pool exhausted".into()),
            _ => ApiError::StoreFatal(format!("database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: Vec<ValidationDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| ValidationDetail {
                    field: field.to_string(),
                    message: e.message.clone().map(|m| m.to_string()).unwrap_or_default(),
                })
            })
            .collect();

        let message = if details.len() == 1 {
            details[0].message.clone()
        } else {
            format!("{} validation errors", details.len())
        };

        ApiError::InvalidInput(message)
    }
}
