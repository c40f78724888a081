//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Fatal schema-definition errors. These abort startup; they are never
/// surfaced to a client.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("primary key not found for table '{table}'")]
    MissingPrimaryKey { table: String },
    #[error("duplicate primary key for field '{field}' in table '{table}'")]
    DuplicatePrimaryKey { table: String, field: String },
}

/// Domain error raised by handler logic: a kind tag, the field or identifier
/// it concerns, and a human message. Serialized verbatim as the error payload
/// `{error, data, message}` at the dispatch boundary.
#[derive(Error, Debug, Clone, Serialize)]
#[error("{error}: {message}")]
pub struct ApiError {
    pub error: String,
    pub data: String,
    pub message: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, data: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError {
            error: error.into(),
            data: data.into(),
            message: message.into(),
        }
    }

    /// A submitted value failed validation (e.g. malformed email).
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new("value:invalid", field, message)
    }

    /// A named resource does not exist.
    pub fn resource_not_found(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new("value:notfound", field, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new("permission:forbidden", "", message)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("configuration: {0}")]
    Config(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    /// Domain errors ride back as an ordinary JSON payload, not an HTTP
    /// failure status; clients inspect the `error` kind tag.
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Api(e) => e.into_response(),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m).into_response(),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m).into_response(),
            AppError::Schema(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
            }
            // startup fault; only reachable over the wire if someone serves
            // anyway after a failed boot
            AppError::Config(m) => {
                (StatusCode::INTERNAL_SERVER_ERROR, m).into_response()
            }
            AppError::Db(e) => {
                tracing::error!(error = %e, "database error reached dispatch boundary");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_payload_shape() {
        let e = ApiError::invalid_value("email", "invalid email address");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["error"], "value:invalid");
        assert_eq!(v["data"], "email");
        assert_eq!(v["message"], "invalid email address");
    }

    #[test]
    fn config_fault_maps_to_a_server_error() {
        let resp = AppError::Config("missing env var DB_USER".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn permission_denied_has_empty_data() {
        let e = ApiError::permission_denied("admin only");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["error"], "permission:forbidden");
        assert_eq!(v["data"], "");
    }
}
