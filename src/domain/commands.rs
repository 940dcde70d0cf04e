use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{BookId, LendingId, LendingStatus, ReaderId};

/// コマンド：貸出を開始する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLending {
    pub book_id: BookId,
    pub reader_id: ReaderId,
    pub lending_date: NaiveDate,
    pub due_date: NaiveDate,
    pub today: NaiveDate,
}

/// コマンド：書籍を返却する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnLending {
    pub lending_id: LendingId,
    pub today: NaiveDate,
}

/// コマンド：返却期限を延長する
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendLending {
    pub lending_id: LendingId,
    pub new_due_date: NaiveDate,
    pub today: NaiveDate,
}

/// コマンド：ステータスを上書きする（管理者操作）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLendingStatus {
    pub lending_id: LendingId,
    pub status: LendingStatus,
    pub today: NaiveDate,
}
