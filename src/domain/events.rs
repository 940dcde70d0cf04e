use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{BookId, LendingId, LendingStatus, ReaderId};

/// イベント：貸出が開始された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingOpened {
    pub lending_id: LendingId,
    pub book_id: BookId,
    pub reader_id: ReaderId,
    pub lending_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// イベント：返却期限が延長された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingExtended {
    pub lending_id: LendingId,
    pub book_id: BookId,
    pub old_due_date: NaiveDate,
    pub new_due_date: NaiveDate,
}

/// イベント：書籍が返却された
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingReturned {
    pub lending_id: LendingId,
    pub book_id: BookId,
    pub reader_id: ReaderId,
    pub return_date: NaiveDate,
    pub was_overdue: bool,
}

/// イベント：貸出が延滞した
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingBecameOverdue {
    pub lending_id: LendingId,
    pub book_id: BookId,
    pub reader_id: ReaderId,
    pub due_date: NaiveDate,
    pub detected_on: NaiveDate,
}

/// イベント：管理者がステータスを上書きした
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendingStatusOverridden {
    pub lending_id: LendingId,
    pub book_id: BookId,
    pub old_status: LendingStatus,
    pub new_status: LendingStatus,
    /// 非貸出状態から Active / Overdue へ戻り、在庫を1冊消費する
    pub consumes_stock: bool,
    pub overridden_on: NaiveDate,
}

/// ドメインイベント統合型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainEvent {
    LendingOpened(LendingOpened),
    LendingExtended(LendingExtended),
    LendingReturned(LendingReturned),
    LendingBecameOverdue(LendingBecameOverdue),
    LendingStatusOverridden(LendingStatusOverridden),
}

impl DomainEvent {
    pub fn lending_id(&self) -> LendingId {
        match self {
            DomainEvent::LendingOpened(e) => e.lending_id,
            DomainEvent::LendingExtended(e) => e.lending_id,
            DomainEvent::LendingReturned(e) => e.lending_id,
            DomainEvent::LendingBecameOverdue(e) => e.lending_id,
            DomainEvent::LendingStatusOverridden(e) => e.lending_id,
        }
    }

    /// このイベントでキャッシュ上の書籍ビューが古くなる書籍
    ///
    /// 貸出ステータスが変わるイベントはすべて対象。
    /// 返却期限の延長は書籍ビューに影響しない。
    pub fn stale_book(&self) -> Option<BookId> {
        match self {
            DomainEvent::LendingOpened(e) => Some(e.book_id),
            DomainEvent::LendingExtended(_) => None,
            DomainEvent::LendingReturned(e) => Some(e.book_id),
            DomainEvent::LendingBecameOverdue(e) => Some(e.book_id),
            DomainEvent::LendingStatusOverridden(e) => Some(e.book_id),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::LendingOpened(_) => "LendingOpened",
            DomainEvent::LendingExtended(_) => "LendingExtended",
            DomainEvent::LendingReturned(_) => "LendingReturned",
            DomainEvent::LendingBecameOverdue(_) => "LendingBecameOverdue",
            DomainEvent::LendingStatusOverridden(_) => "LendingStatusOverridden",
        }
    }
}

impl From<LendingOpened> for DomainEvent {
    fn from(event: LendingOpened) -> Self {
        DomainEvent::LendingOpened(event)
    }
}

impl From<LendingExtended> for DomainEvent {
    fn from(event: LendingExtended) -> Self {
        DomainEvent::LendingExtended(event)
    }
}

impl From<LendingReturned> for DomainEvent {
    fn from(event: LendingReturned) -> Self {
        DomainEvent::LendingReturned(event)
    }
}

impl From<LendingBecameOverdue> for DomainEvent {
    fn from(event: LendingBecameOverdue) -> Self {
        DomainEvent::LendingBecameOverdue(event)
    }
}

impl From<LendingStatusOverridden> for DomainEvent {
    fn from(event: LendingStatusOverridden) -> Self {
        DomainEvent::LendingStatusOverridden(event)
    }
}
