use crate::application::lending::{BusinessRule, LendingApplicationError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::types::ErrorResponse;

/// API層のエラー型
///
/// アプリケーション層のエラーをラップし、HTTPレスポンスへのマッピングを提供する。
#[derive(Debug)]
pub enum ApiError {
    Application(LendingApplicationError),
    /// リクエストの形式が不正（パスやクエリの値が解釈できない）
    BadRequest(String),
}

impl From<LendingApplicationError> for ApiError {
    fn from(err: LendingApplicationError) -> Self {
        ApiError::Application(err)
    }
}

fn rule_code(rule: &BusinessRule) -> &'static str {
    match rule {
        BusinessRule::NoStockAvailable { .. } => "NO_STOCK_AVAILABLE",
        BusinessRule::AlreadyReturned => "ALREADY_RETURNED",
        BusinessRule::NotLent(_) => "NOT_LENT",
        BusinessRule::NotExtendable(_) => "NOT_EXTENDABLE",
        BusinessRule::LendingDateInFuture { .. } => "LENDING_DATE_IN_FUTURE",
        BusinessRule::DueDateBeforeLendingDate { .. } => "DUE_DATE_BEFORE_LENDING_DATE",
        BusinessRule::ExtensionBeforeDueDate { .. } => "EXTENSION_BEFORE_DUE_DATE",
        BusinessRule::StockBelowLentCopies { .. } => "STOCK_BELOW_LENT_COPIES",
        BusinessRule::NegativeStock(_) => "NEGATIVE_STOCK",
        BusinessRule::InvalidDateRange { .. } => "INVALID_DATE_RANGE",
        BusinessRule::InvalidBook(_) => "INVALID_BOOK",
        BusinessRule::GenreNotOnBook(_) => "GENRE_NOT_ON_BOOK",
        BusinessRule::LastGenre => "LAST_GENRE",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),

            // 404 Not Found - リクエストされたリソースが存在しない
            ApiError::Application(err @ LendingApplicationError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
            }

            // 422 Unprocessable Entity - ビジネスルール違反
            ApiError::Application(LendingApplicationError::BusinessRuleViolation(rule)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                rule_code(&rule),
                rule.to_string(),
            ),

            // 409 Conflict - 再試行可能
            ApiError::Application(err @ LendingApplicationError::ConcurrencyConflict { .. }) => {
                (StatusCode::CONFLICT, "CONCURRENCY_CONFLICT", err.to_string())
            }

            // 500 Internal Server Error - システム障害
            // 内部エラーの詳細はログに記録し、クライアントには一般的なメッセージのみを返す
            ApiError::Application(err @ LendingApplicationError::IntegrityViolation { .. }) => {
                tracing::error!("Integrity violation: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTEGRITY_VIOLATION",
                    "Lending records are inconsistent with stock".to_string(),
                )
            }
            ApiError::Application(LendingApplicationError::RecordStoreError(e)) => {
                tracing::error!("Record store error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "RECORD_STORE_ERROR",
                    "Failed to access lending records".to_string(),
                )
            }
            ApiError::Application(LendingApplicationError::ReaderDirectoryError(e)) => {
                tracing::error!("Reader directory error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "READER_DIRECTORY_ERROR",
                    "Reader directory error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse::new(error_type, message));
        (status, body).into_response()
    }
}
