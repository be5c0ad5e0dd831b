// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Mapping of control-plane errors to HTTP responses.
//!
//! Every error returned by the API carries an HTTP status and a stable
//! reason code from [`crate::status_reasons`], serialized as:
//!
//! ```json
//! {"detail": {"msg": "Host 'x' is not a valid domain name", "reason": "MalformedDomain"}}
//! ```
//!
//! # Usage
//!
//! ```rust
//! use axum::http::StatusCode;
//! use homesite::errors::ValidationError;
//! use homesite::http_errors::ApiError;
//!
//! let err = ApiError::from(ValidationError::MalformedDomain { host: "x".into() });
//! assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
//! assert_eq!(err.reason, "MalformedDomain");
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::errors::{DiscoveryError, RegistryError, StoreError, ValidationError};
use crate::status_reasons::{REASON_BAD_REQUEST, REASON_INTERNAL_ERROR, REASON_NOT_FOUND};

/// An error ready to be returned from an API handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status of the response
    pub status: StatusCode,
    /// Stable reason code
    pub reason: &'static str,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    /// Create an error with an explicit status and reason.
    #[must_use]
    pub fn new(status: StatusCode, reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            message: message.into(),
        }
    }

    /// 404 with reason `NotFound`.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, REASON_NOT_FOUND, message)
    }

    /// 400 with reason `BadRequest`.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, REASON_BAD_REQUEST, message)
    }

    /// 500 with reason `InternalError`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, REASON_INTERNAL_ERROR, message)
    }
}

/// Map a backend failure to an HTTP status.
///
/// | Failure | HTTP Code |
/// |---------|-----------|
/// | backend unreachable | 503 |
/// | transaction rolled back | 409 |
/// | unexpected backend status | 502 |
/// | undecodable backend response | 502 |
#[must_use]
pub fn backend_status(transient: bool, rejected: bool) -> StatusCode {
    if rejected {
        StatusCode::CONFLICT
    } else if transient {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::BAD_GATEWAY
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            err.status_reason(),
            err.to_string(),
        )
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        let status = match &err {
            DiscoveryError::InvalidUsername { .. } => StatusCode::BAD_REQUEST,
            DiscoveryError::WwwDirMissing { .. } | DiscoveryError::WwwNotDirectory { .. } => {
                StatusCode::NOT_FOUND
            }
            DiscoveryError::HomeDirsUnreadable { .. } | DiscoveryError::Io { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.status_reason(), err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if matches!(err, StoreError::InvalidKey { .. }) {
            return Self::new(StatusCode::BAD_REQUEST, err.status_reason(), err.to_string());
        }
        let status = backend_status(
            matches!(err, StoreError::Unavailable { .. }),
            matches!(err, StoreError::TransactionRejected { .. }),
        );
        Self::new(status, err.status_reason(), err.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = backend_status(matches!(err, RegistryError::Unavailable { .. }), false);
        Self::new(status, err.status_reason(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = %self.status, reason = self.reason, error = %self.message, "API request failed");
        }
        let body = json!({
            "detail": {
                "msg": self.message,
                "reason": self.reason,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[path = "http_errors_tests.rs"]
mod http_errors_tests;
