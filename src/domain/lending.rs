use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    BookId, ExtendLendingError, LendingBecameOverdue, LendingExtended, LendingId,
    LendingOpened, LendingReturned, LendingStatusOverridden, OpenLendingError, ReaderId,
    ReturnLendingError,
};

/// 貸出ステータス
///
/// Returned と Cancelled は終端状態。
/// Reserved は取り置き用のプレースホルダで、自動遷移を持たない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LendingStatus {
    /// 貸出中
    Active,
    /// 延滞中
    Overdue,
    /// 予約（取り置き）
    Reserved,
    /// 取消
    Cancelled,
    /// 返却済み
    Returned,
}

impl LendingStatus {
    pub const ALL: [LendingStatus; 5] = [
        LendingStatus::Active,
        LendingStatus::Overdue,
        LendingStatus::Reserved,
        LendingStatus::Cancelled,
        LendingStatus::Returned,
    ];

    /// 物理的な在庫を1冊保持している状態か（Active / Overdue）
    pub fn is_active_like(&self) -> bool {
        matches!(self, LendingStatus::Active | LendingStatus::Overdue)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LendingStatus::Returned | LendingStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LendingStatus::Active => "active",
            LendingStatus::Overdue => "overdue",
            LendingStatus::Reserved => "reserved",
            LendingStatus::Cancelled => "cancelled",
            LendingStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for LendingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LendingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(LendingStatus::Active),
            "overdue" => Ok(LendingStatus::Overdue),
            "reserved" => Ok(LendingStatus::Reserved),
            "cancelled" => Ok(LendingStatus::Cancelled),
            "returned" => Ok(LendingStatus::Returned),
            _ => Err(format!("Invalid lending status: {}", s)),
        }
    }
}

/// 貸出レコード - 1冊の在庫の1回の貸出
///
/// 書籍・読者へはIDでのみ参照する。物理削除はされず、在庫消費の監査証跡となる。
/// `version` は楽観的排他制御用で、レコードストアが書き込みごとに進める。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lending {
    pub lending_id: LendingId,
    pub book_id: BookId,
    pub reader_id: ReaderId,
    pub lending_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: LendingStatus,
    pub version: i64,
}

/// 純粋関数：貸出を開始する
///
/// ビジネスルール：
/// - 貸出日は今日以前
/// - 返却期限は貸出日以降
/// - 状態はActive
///
/// 在庫の確認（受付チェック）はここでは行わない。
/// レコードストアの原子的な挿入の中で評価される。
pub fn open_lending(
    book_id: BookId,
    reader_id: ReaderId,
    lending_date: NaiveDate,
    due_date: NaiveDate,
    today: NaiveDate,
) -> Result<(Lending, LendingOpened), OpenLendingError> {
    if lending_date > today {
        return Err(OpenLendingError::LendingDateInFuture {
            lending_date,
            today,
        });
    }

    if due_date < lending_date {
        return Err(OpenLendingError::DueDateBeforeLendingDate {
            lending_date,
            due_date,
        });
    }

    let lending = Lending {
        lending_id: LendingId::new(),
        book_id,
        reader_id,
        lending_date,
        due_date,
        return_date: None,
        status: LendingStatus::Active,
        version: 0,
    };

    let event = LendingOpened {
        lending_id: lending.lending_id,
        book_id,
        reader_id,
        lending_date,
        due_date,
    };

    Ok((lending, event))
}

/// 純粋関数：返却する
///
/// ビジネスルール：
/// - 返却済みは不可
/// - Active / Overdue のみ返却可能
/// - 返却日は今日
pub fn return_lending(
    lending: &Lending,
    today: NaiveDate,
) -> Result<(Lending, LendingReturned), ReturnLendingError> {
    match lending.status {
        LendingStatus::Returned => return Err(ReturnLendingError::AlreadyReturned),
        status if !status.is_active_like() => return Err(ReturnLendingError::NotLent(status)),
        _ => {}
    }

    let was_overdue = lending.status == LendingStatus::Overdue || today > lending.due_date;

    let returned = Lending {
        return_date: Some(today),
        status: LendingStatus::Returned,
        ..lending.clone()
    };

    let event = LendingReturned {
        lending_id: lending.lending_id,
        book_id: lending.book_id,
        reader_id: lending.reader_id,
        return_date: today,
        was_overdue,
    };

    Ok((returned, event))
}

/// 純粋関数：返却期限を延長する
///
/// ビジネスルール：
/// - Active / Overdue のみ
/// - 新しい返却期限は現在の返却期限以降
/// - ステータスは変えない
pub fn extend_lending(
    lending: &Lending,
    new_due_date: NaiveDate,
) -> Result<(Lending, LendingExtended), ExtendLendingError> {
    if !lending.status.is_active_like() {
        return Err(ExtendLendingError::NotExtendable(lending.status));
    }

    if new_due_date < lending.due_date {
        return Err(ExtendLendingError::NewDueDateBeforeCurrent {
            current: lending.due_date,
            requested: new_due_date,
        });
    }

    let extended = Lending {
        due_date: new_due_date,
        ..lending.clone()
    };

    let event = LendingExtended {
        lending_id: lending.lending_id,
        book_id: lending.book_id,
        old_due_date: lending.due_date,
        new_due_date,
    };

    Ok((extended, event))
}

/// 純粋関数：延滞判定（スイープ用）
///
/// Active かつ返却期限が今日より前の場合のみ Overdue へ遷移させる。
/// それ以外（既に Overdue、Returned、Reserved、Cancelled）は `None`。
pub fn mark_overdue(lending: &Lending, today: NaiveDate) -> Option<(Lending, LendingBecameOverdue)> {
    if lending.status != LendingStatus::Active || lending.due_date >= today {
        return None;
    }

    let overdue = Lending {
        status: LendingStatus::Overdue,
        ..lending.clone()
    };

    let event = LendingBecameOverdue {
        lending_id: lending.lending_id,
        book_id: lending.book_id,
        reader_id: lending.reader_id,
        due_date: lending.due_date,
        detected_on: today,
    };

    Some((overdue, event))
}

/// 純粋関数：管理者によるステータスの上書き
///
/// 遷移ガードは持たない（任意の状態から任意の状態へ）。
/// ただしフィールドの整合性は再導出する：
/// - Returned への上書きでは返却日が無ければ今日を設定
/// - Returned からの上書きでは返却日を消す
///
/// 非貸出状態から Active / Overdue に戻す場合は在庫を1冊消費するため、
/// 呼び出し側で受付チェックを伴う書き込みを行う必要がある（`consumes_stock`）。
pub fn override_status(
    lending: &Lending,
    new_status: LendingStatus,
    today: NaiveDate,
) -> (Lending, LendingStatusOverridden) {
    let return_date = match new_status {
        LendingStatus::Returned => lending.return_date.or(Some(today)),
        _ => None,
    };

    let overridden = Lending {
        status: new_status,
        return_date,
        ..lending.clone()
    };

    let event = LendingStatusOverridden {
        lending_id: lending.lending_id,
        book_id: lending.book_id,
        old_status: lending.status,
        new_status,
        consumes_stock: !lending.status.is_active_like() && new_status.is_active_like(),
        overridden_on: today,
    };

    (overridden, event)
}

/// 表示用：延滞しているか（返却済みでなく、返却期限が今日より前）
pub fn is_overdue(lending: &Lending, today: NaiveDate) -> bool {
    lending.status != LendingStatus::Returned && lending.due_date < today
}

/// 表示用：返却期限までの残り日数（返却済みは0）
pub fn days_left(lending: &Lending, today: NaiveDate) -> i64 {
    if lending.status == LendingStatus::Returned {
        return 0;
    }
    (lending.due_date - today).num_days()
}
