use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::lending::LendingView;
use crate::domain::{BookId, LendingStatus, ReaderId, commands::OpenLending};
use crate::ports::{BookPopularity, BookView};

/// 貸出作成リクエスト
#[derive(Debug, Deserialize)]
pub struct CreateLendingRequest {
    pub book_id: Uuid,
    pub reader_id: Uuid,
    /// 省略時は今日
    pub lending_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
}

impl CreateLendingRequest {
    pub fn to_command(&self, today: NaiveDate) -> OpenLending {
        OpenLending {
            book_id: BookId::from_uuid(self.book_id),
            reader_id: ReaderId::from_uuid(self.reader_id),
            lending_date: self.lending_date.unwrap_or(today),
            due_date: self.due_date,
            today,
        }
    }
}

/// 返却期限延長リクエスト
#[derive(Debug, Deserialize)]
pub struct ExtendLendingRequest {
    pub new_due_date: NaiveDate,
}

/// ステータス上書きリクエスト
#[derive(Debug, Deserialize)]
pub struct SetLendingStatusRequest {
    pub status: String,
}

/// 在庫数変更リクエスト
#[derive(Debug, Deserialize)]
pub struct UpdateStockRequest {
    pub stock: i64,
}

/// ジャンル追加リクエスト
#[derive(Debug, Deserialize)]
pub struct AddGenreRequest {
    pub genre: String,
}

/// 貸出一覧取得のクエリパラメータ
///
/// すべて省略した場合は全件を返す。
#[derive(Debug, Deserialize)]
pub struct ListLendingsQuery {
    pub status: Option<String>,
    pub reader_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
}

/// 人気書籍取得のクエリパラメータ
#[derive(Debug, Deserialize)]
pub struct PopularBooksQuery {
    #[serde(default = "default_popular_limit")]
    pub limit: u32,
}

fn default_popular_limit() -> u32 {
    10
}

/// 貸出レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct LendingResponse {
    pub lending_id: Uuid,
    pub book_id: Uuid,
    pub reader_id: Uuid,
    pub lending_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: String,
    pub is_overdue: bool,
    pub days_left: i64,
}

impl From<LendingView> for LendingResponse {
    fn from(view: LendingView) -> Self {
        Self {
            lending_id: view.lending_id.value(),
            book_id: view.book_id.value(),
            reader_id: view.reader_id.value(),
            lending_date: view.lending_date,
            due_date: view.due_date,
            return_date: view.return_date,
            status: view.status.as_str().to_string(),
            is_overdue: view.is_overdue,
            days_left: view.days_left,
        }
    }
}

/// 書籍レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct BookResponse {
    pub book_id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publication_year: i32,
    pub stock: u32,
    pub available_stock: u32,
    pub genres: Vec<String>,
}

impl From<BookView> for BookResponse {
    fn from(view: BookView) -> Self {
        Self {
            book_id: view.book_id.value(),
            title: view.title,
            author: view.author,
            isbn: view.isbn,
            publication_year: view.publication_year,
            stock: view.stock,
            available_stock: view.available_stock,
            genres: view.genres,
        }
    }
}

/// 人気書籍レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct PopularBookResponse {
    pub book_id: Uuid,
    pub title: String,
    pub author: String,
    pub lending_count: u64,
}

impl From<BookPopularity> for PopularBookResponse {
    fn from(popularity: BookPopularity) -> Self {
        Self {
            book_id: popularity.book_id.value(),
            title: popularity.title,
            author: popularity.author,
            lending_count: popularity.lending_count,
        }
    }
}

/// 利用可能在庫レスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub book_id: Uuid,
    pub available_stock: u32,
}

/// エラーレスポンス
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// ステータスパラメータのパースとバリデーション
pub fn parse_status(status: &str) -> Result<LendingStatus, String> {
    status.parse::<LendingStatus>()
}
