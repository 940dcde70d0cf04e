use chrono::NaiveDate;

use super::{IsbnError, LendingStatus};

/// 貸出開始のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenLendingError {
    /// 貸出日が未来日
    LendingDateInFuture { lending_date: NaiveDate, today: NaiveDate },
    /// 返却期限が貸出日より前
    DueDateBeforeLendingDate {
        lending_date: NaiveDate,
        due_date: NaiveDate,
    },
}

/// 返却のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnLendingError {
    /// 既に返却済み
    AlreadyReturned,
    /// 物理的な在庫を保持していない状態（予約・取消）からは返却できない
    NotLent(LendingStatus),
}

/// 延長のエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendLendingError {
    /// 新しい返却期限が現在の返却期限より前
    NewDueDateBeforeCurrent {
        current: NaiveDate,
        requested: NaiveDate,
    },
    /// 貸出中・延滞中以外は延長不可
    NotExtendable(LendingStatus),
}

/// 書籍（カタログ側）のルール違反
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookRuleError {
    BlankTitle,
    BlankAuthor,
    InvalidIsbn(IsbnError),
    /// 出版年が 0..=今年 の範囲外
    PublicationYearOutOfRange { year: i32, current_year: i32 },
    /// ジャンルが1つもない
    NoGenres,
    /// 空のジャンル名
    BlankGenre,
    /// 書籍に存在しないジャンルを外そうとした
    GenreNotOnBook(String),
    /// 最後のジャンルは外せない
    LastGenre,
    /// 在庫数が負
    NegativeStock(i64),
}

impl From<IsbnError> for BookRuleError {
    fn from(err: IsbnError) -> Self {
        BookRuleError::InvalidIsbn(err)
    }
}

/// 利用可能在庫の計算エラー
///
/// 貸出中（Active/Overdue）の件数が在庫数を超えている。
/// 貸出受付のガードが破られたことを意味するため、丸めずに報告する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityError {
    Oversubscribed { stock: u32, held: u64 },
}
