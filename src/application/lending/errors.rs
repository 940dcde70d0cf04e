use crate::domain::{
    AvailabilityError, BookId, BookRuleError, ExtendLendingError, LendingStatus,
    OpenLendingError, ReturnLendingError,
};
use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// 見つからなかったエンティティの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Book,
    Lending,
    Reader,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EntityKind::Book => "Book",
            EntityKind::Lending => "Lending",
            EntityKind::Reader => "Reader",
        })
    }
}

/// ビジネスルール違反（クライアント側で修正可能、再試行しても結果は同じ）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusinessRule {
    #[error("Book {book_id} isn't available for lending")]
    NoStockAvailable { book_id: BookId },

    #[error("Lending is already returned")]
    AlreadyReturned,

    #[error("Lending in status {0} holds no copy")]
    NotLent(LendingStatus),

    #[error("Lending in status {0} can't be extended")]
    NotExtendable(LendingStatus),

    #[error("Lending date {lending_date} is after today ({today})")]
    LendingDateInFuture {
        lending_date: NaiveDate,
        today: NaiveDate,
    },

    #[error("Due date {due_date} is before lending date {lending_date}")]
    DueDateBeforeLendingDate {
        lending_date: NaiveDate,
        due_date: NaiveDate,
    },

    #[error("New due date {requested} can't be before previous due date {current}")]
    ExtensionBeforeDueDate {
        current: NaiveDate,
        requested: NaiveDate,
    },

    #[error("Stock can't be set to {requested}: {held} copies are lent out")]
    StockBelowLentCopies { requested: u32, held: u64 },

    #[error("Stock can't be negative ({0})")]
    NegativeStock(i64),

    #[error("Start date {start} must not be after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid book data: {0}")]
    InvalidBook(String),

    #[error("Book does not have genre: {0}")]
    GenreNotOnBook(String),

    #[error("Can't remove the last genre from a book")]
    LastGenre,
}

/// 貸出管理アプリケーション層のエラー
#[derive(Debug, Error)]
pub enum LendingApplicationError {
    /// IDで解決できなかった
    #[error("{kind} with id {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    /// ビジネスルール違反
    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(BusinessRule),

    /// 同時更新との競合（呼び出し側でバックオフ付き再試行可能）
    #[error("Concurrent modification of {kind} {id}")]
    ConcurrencyConflict { kind: EntityKind, id: Uuid },

    /// 貸出中の件数が在庫数を超えている（受付ガードが破られた）
    #[error("Integrity violation: book {book_id} has {held} copies lent out but stock {stock}")]
    IntegrityViolation { book_id: BookId, stock: u32, held: u64 },

    /// レコードストアのエラー
    #[error("Record store error")]
    RecordStoreError(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// ReaderDirectoryのエラー
    #[error("Reader directory error")]
    ReaderDirectoryError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl LendingApplicationError {
    pub fn not_found(kind: EntityKind, id: impl Into<Uuid>) -> Self {
        LendingApplicationError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn conflict(kind: EntityKind, id: impl Into<Uuid>) -> Self {
        LendingApplicationError::ConcurrencyConflict {
            kind,
            id: id.into(),
        }
    }

    pub fn integrity(book_id: BookId, err: AvailabilityError) -> Self {
        let AvailabilityError::Oversubscribed { stock, held } = err;
        LendingApplicationError::IntegrityViolation {
            book_id,
            stock,
            held,
        }
    }

    /// 呼び出し側が再試行してよいか
    pub fn is_retryable(&self) -> bool {
        matches!(self, LendingApplicationError::ConcurrencyConflict { .. })
    }
}

impl From<BusinessRule> for LendingApplicationError {
    fn from(rule: BusinessRule) -> Self {
        LendingApplicationError::BusinessRuleViolation(rule)
    }
}

impl From<OpenLendingError> for LendingApplicationError {
    fn from(err: OpenLendingError) -> Self {
        match err {
            OpenLendingError::LendingDateInFuture {
                lending_date,
                today,
            } => BusinessRule::LendingDateInFuture {
                lending_date,
                today,
            },
            OpenLendingError::DueDateBeforeLendingDate {
                lending_date,
                due_date,
            } => BusinessRule::DueDateBeforeLendingDate {
                lending_date,
                due_date,
            },
        }
        .into()
    }
}

impl From<ReturnLendingError> for LendingApplicationError {
    fn from(err: ReturnLendingError) -> Self {
        match err {
            ReturnLendingError::AlreadyReturned => BusinessRule::AlreadyReturned,
            ReturnLendingError::NotLent(status) => BusinessRule::NotLent(status),
        }
        .into()
    }
}

impl From<ExtendLendingError> for LendingApplicationError {
    fn from(err: ExtendLendingError) -> Self {
        match err {
            ExtendLendingError::NewDueDateBeforeCurrent { current, requested } => {
                BusinessRule::ExtensionBeforeDueDate { current, requested }
            }
            ExtendLendingError::NotExtendable(status) => BusinessRule::NotExtendable(status),
        }
        .into()
    }
}

impl From<BookRuleError> for LendingApplicationError {
    fn from(err: BookRuleError) -> Self {
        match err {
            BookRuleError::NegativeStock(value) => BusinessRule::NegativeStock(value),
            BookRuleError::GenreNotOnBook(genre) => BusinessRule::GenreNotOnBook(genre),
            BookRuleError::LastGenre => BusinessRule::LastGenre,
            other => BusinessRule::InvalidBook(format!("{:?}", other)),
        }
        .into()
    }
}

/// アプリケーション層の Result型
pub type Result<T> = std::result::Result<T, LendingApplicationError>;
