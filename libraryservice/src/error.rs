use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::api::MessageResponse;
use crate::library_repository::{
    AccountsRepositoryError, BooksRepositoryError, BorrowsRepositoryError,
};

/// Failure of any library operation, rendered as `{"success": false, "message": ...}`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidOperation(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    Expired(String),

    #[error("{0}")]
    DeliveryFailed(String),

    #[error("Internal failure: {0}")]
    Internal(String),
}

impl ApiError {
    /// Message safe to show to the client
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_)
            | ApiError::Conflict(_)
            | ApiError::InvalidOperation(_)
            | ApiError::Expired(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials | ApiError::Unauthenticated(_) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::DeliveryFailed(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Internal(cause) = self {
            tracing::error!("Request failed: {}", cause);
        }
        HttpResponse::build(self.status_code()).json(MessageResponse::failure(self.public_message()))
    }
}

impl From<BooksRepositoryError> for ApiError {
    fn from(err: BooksRepositoryError) -> Self {
        match err {
            BooksRepositoryError::NotFound(_) => ApiError::NotFound("Book not found".to_string()),
            BooksRepositoryError::HasOpenBorrows(_) => ApiError::InvalidOperation(
                "Book cannot be deleted while it is borrowed".to_string(),
            ),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AccountsRepositoryError> for ApiError {
    fn from(err: AccountsRepositoryError) -> Self {
        match err {
            AccountsRepositoryError::NotFound(_) => {
                ApiError::NotFound("User not found".to_string())
            }
            AccountsRepositoryError::EmailTaken(_) => {
                ApiError::Conflict("User already registered".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<BorrowsRepositoryError> for ApiError {
    fn from(err: BorrowsRepositoryError) -> Self {
        match err {
            BorrowsRepositoryError::BookNotFound(_) => {
                ApiError::NotFound("Book not found".to_string())
            }
            BorrowsRepositoryError::UserNotFound(_) => {
                ApiError::NotFound("User not found".to_string())
            }
            BorrowsRepositoryError::BookUnavailable(_) => {
                ApiError::Conflict("Book not available".to_string())
            }
            BorrowsRepositoryError::AlreadyBorrowed(_) => {
                ApiError::Conflict("Book already borrowed".to_string())
            }
            BorrowsRepositoryError::NotBorrowed(_)
            | BorrowsRepositoryError::LedgerEntryMissing(_) => {
                ApiError::InvalidOperation("You have not borrowed this book".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod error_tests {
    use actix_web::body::to_bytes;

    use super::*;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(
            ApiError::InvalidInput("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::RateLimited("x".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Expired("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[tokio::test]
    async fn test_internal_details_are_not_exposed() {
        let response = ApiError::Internal("connection refused at 10.0.0.3".into()).error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body()).await.unwrap();
        let message: MessageResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(message, MessageResponse::failure("Internal Server Error"));
    }

    #[test]
    fn test_repository_errors_map_to_client_errors() {
        assert!(matches!(
            ApiError::from(BorrowsRepositoryError::AlreadyBorrowed(1)),
            ApiError::Conflict(..)
        ));
        assert!(matches!(
            ApiError::from(BorrowsRepositoryError::LedgerEntryMissing(1)),
            ApiError::InvalidOperation(..)
        ));
        assert!(matches!(
            ApiError::from(AccountsRepositoryError::EmailTaken("a@b.c".into())),
            ApiError::Conflict(..)
        ));
    }
}
