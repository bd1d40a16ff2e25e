//! Error types for the relay service

use actix_web::{HttpResponse, ResponseError};
use std::fmt;

use ephchat_relay::RelayError;

/// Service error type
#[derive(Debug)]
pub enum ServiceError {
    /// Missing or invalid bearer token
    Unauthorized,
    /// Invalid request
    InvalidRequest(String),
    /// Blob over the size limit
    PayloadTooLarge(String),
    /// Storage error
    Storage(String),
    /// Internal error
    Internal(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl ResponseError for ServiceError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::Unauthorized => HttpResponse::Unauthorized().json(ErrorResponse {
                error: "unauthorized".to_string(),
                message: "Invalid or expired token".to_string(),
            }),
            Self::InvalidRequest(msg) => HttpResponse::BadRequest().json(ErrorResponse {
                error: "invalid_request".to_string(),
                message: msg.clone(),
            }),
            Self::PayloadTooLarge(msg) => HttpResponse::PayloadTooLarge().json(ErrorResponse {
                error: "payload_too_large".to_string(),
                message: msg.clone(),
            }),
            Self::Storage(msg) => HttpResponse::ServiceUnavailable().json(ErrorResponse {
                error: "storage_error".to_string(),
                message: msg.clone(),
            }),
            Self::Internal(msg) => HttpResponse::InternalServerError().json(ErrorResponse {
                error: "internal_error".to_string(),
                message: msg.clone(),
            }),
        }
    }
}

/// Error response body
#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl From<RelayError> for ServiceError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Unauthorized => ServiceError::Unauthorized,
            RelayError::BlobTooLarge { .. } => ServiceError::PayloadTooLarge(err.to_string()),
            RelayError::InvalidRequest(msg) => ServiceError::InvalidRequest(msg),
            RelayError::Core(e) => ServiceError::InvalidRequest(e.to_string()),
            RelayError::Store(e) => ServiceError::Storage(e.to_string()),
            RelayError::InvalidConfig(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<ephchat_core::Error> for ServiceError {
    fn from(err: ephchat_core::Error) -> Self {
        ServiceError::InvalidRequest(err.to_string())
    }
}
