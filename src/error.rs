use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, RuntimeErr, SqlErr};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    models::OrderStatus,
    response::{ApiResponse, Meta},
};

const LOCK_NOT_AVAILABLE: &str = "55P03";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const NUMERIC_OUT_OF_RANGE: &str = "22003";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: Uuid },

    #[error("Quantity must be a positive 32-bit integer")]
    InvalidQuantity,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    ReferentialConflict(String),

    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0}")]
    Conflict(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Temporarily unavailable, retry the request")]
    Transient(String),

    #[error("ORM error")]
    OrmError(DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::EmptyCart | AppError::InvalidQuantity | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::InsufficientStock { .. }
            | AppError::ReferentialConflict(_)
            | AppError::InvalidTransition { .. }
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::OrmError(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::EmptyCart => "empty_cart",
            AppError::InsufficientStock { .. } => "insufficient_stock",
            AppError::InvalidQuantity => "invalid_quantity",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::ReferentialConflict(_) => "referential_conflict",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::Conflict(_) => "conflict",
            AppError::BadRequest(_) => "bad_request",
            AppError::Transient(_) => "transient_failure",
            AppError::OrmError(_) | AppError::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        if is_transient(&err) {
            return AppError::Transient(err.to_string());
        }
        match err.sql_err() {
            Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
                AppError::ReferentialConflict(format!("Blocked by dependent rows: {detail}"))
            }
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                AppError::Conflict(format!("Duplicate value: {detail}"))
            }
            _ => AppError::OrmError(err),
        }
    }
}

/// Lock timeouts, serialization failures, deadlocks and lost connections are
/// worth retrying; everything else is not.
fn is_transient(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) => true,
        DbErr::Conn(RuntimeErr::SqlxError(_)) => true,
        DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => {
            let e: &sqlx::Error = e;
            is_transient_sqlx(e)
        }
        _ => false,
    }
}

/// Postgres rejected a value that does not fit its column, e.g. an integer overflow.
pub(crate) fn is_out_of_range(err: &DbErr) -> bool {
    sqlstate(err).as_deref() == Some(NUMERIC_OUT_OF_RANGE)
}

fn sqlstate(err: &DbErr) -> Option<String> {
    match err {
        DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => {
            let e: &sqlx::Error = e;
            match e {
                sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some(LOCK_NOT_AVAILABLE | SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
        ),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        _ => false,
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    code: &'static str,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        // Infrastructure details stay in the logs.
        let message = self.to_string();
        let body = ApiResponse {
            message: message.clone(),
            data: Some(ErrorData {
                error: message,
                code: self.code(),
                retryable: self.is_retryable(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
