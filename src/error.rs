use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("A record with the same unique value already exists".to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::BadRequest("Referenced record does not exist or is still in use".to_string())
            }
            _ => AppError::Database(err),
        }
    }
}

impl AppError {
    fn label(&self) -> (&'static str, &'static str) {
        match self {
            AppError::Database(_) => ("Database Error", "DB_ERROR"),
            AppError::Validation(_) => ("Validation Error", "VALIDATION_ERROR"),
            AppError::BadRequest(_) => ("Bad Request", "BAD_REQUEST"),
            AppError::Unauthorized(_) => ("Unauthorized", "UNAUTHORIZED"),
            AppError::Forbidden(_) => ("Forbidden", "FORBIDDEN"),
            AppError::NotFound(_) => ("Not Found", "NOT_FOUND"),
            AppError::Conflict(_) => ("Conflict", "CONFLICT"),
            AppError::Hash(_) => ("Internal Server Error", "HASH_ERROR"),
        }
    }
}

pub fn not_found(resource: &str, id: i32) -> AppError {
    AppError::NotFound(format!("{} with id '{}' not found", resource, id))
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Hash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error, code) = self.label();
        let (message, details) = match self {
            AppError::Database(e) => {
                log::error!("Database error: {}", e);
                ("An error occurred while accessing the database".to_string(), None)
            }
            AppError::Hash(e) => {
                log::error!("Hash error: {}", e);
                ("An error occurred while processing credentials".to_string(), None)
            }
            AppError::Validation(e) => {
                log::warn!("Validation error: {}", e);
                (
                    "The provided data is invalid".to_string(),
                    serde_json::to_value(e).ok(),
                )
            }
            other => {
                log::warn!("{}: {}", error, other);
                (other.to_string(), None)
            }
        };

        HttpResponse::build(self.status_code()).json(ErrorBody {
            error,
            message,
            code,
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_404() {
        let err = AppError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn pool_errors_stay_internal() {
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_helper_names_the_resource() {
        let err = not_found("Vehicle", 7);
        assert_eq!(err.to_string(), "Vehicle with id '7' not found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn error_body_hides_database_details() {
        let resp = AppError::from(sqlx::Error::PoolClosed).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
