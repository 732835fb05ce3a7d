use actix_web::{HttpResponse, ResponseError};
use std::fmt;

use crate::store::StoreError;

#[derive(Debug)]
pub enum AppError {
    // Resource errors
    NotFound(String),

    // Validation errors
    ValidationError(String),

    // Blockchain errors
    BlockchainError(String),
    InsufficientBalance(String),

    // Plan file errors
    PersistenceError(String),

    // Configuration errors
    ConfigError(String),

    // Internal errors
    InternalError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::BlockchainError(msg) => write!(f, "Blockchain error: {}", msg),
            AppError::InsufficientBalance(msg) => write!(f, "Insufficient balance: {}", msg),
            AppError::PersistenceError(msg) => write!(f, "Persistence error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_message = serde_json::json!({
            "error": self.to_string()
        });

        match self {
            AppError::NotFound(_) => {
                HttpResponse::NotFound().json(error_message)
            }
            AppError::ValidationError(_) | AppError::InsufficientBalance(_) => {
                HttpResponse::BadRequest().json(error_message)
            }
            AppError::BlockchainError(_) | AppError::PersistenceError(_)
            | AppError::ConfigError(_) | AppError::InternalError(_) => {
                HttpResponse::InternalServerError().json(error_message)
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Plan store error: {:?}", err);
        AppError::PersistenceError(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
