use crate::domain::{Book, BookId, Lending, LendingId, LendingStatus, ReaderId};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 条件付き書き込みの結果
///
/// 書き込みが拒否された理由はエラーではなく値として返す。
/// アプリケーション層がビジネスルール違反・競合・整合性違反に振り分ける。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// 書き込み成功
    Applied,
    /// 在庫が足りない（貸出中の件数 `held` が在庫数 `stock` に達している）
    StockExhausted { stock: u32, held: u64 },
    /// 期待したバージョンと一致しない（他の書き込みが先行した）
    VersionConflict,
    /// 対象の書籍が存在しない
    MissingBook,
}

/// 貸出回数で集計した書籍（人気順の一覧用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookPopularity {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    /// ステータスを問わない累計の貸出件数
    pub lending_count: u64,
}

/// 更新時に受付チェックを再実行するか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockCheck {
    /// 在庫を消費しない更新（返却・延長・延滞化など）
    Skip,
    /// 在庫を1冊消費する更新（非貸出状態から Active / Overdue への上書き）
    Required,
}

/// 貸出レコードストアポート
///
/// 書籍と貸出の記録の正本。各書き込みは1つの原子的な作業単位として実行される。
/// 失敗・タイムアウトした書き込みは部分的な状態を残さない。
#[async_trait]
pub trait LendingRecordStore: Send + Sync {
    /// IDで書籍を取得する
    async fn find_book(&self, book_id: BookId) -> Result<Option<Book>>;

    /// IDで貸出を取得する
    async fn find_lending(&self, lending_id: LendingId) -> Result<Option<Lending>>;

    /// 書籍の貸出中（Active / Overdue）の件数
    ///
    /// 正本からの集計。キャッシュは経由しない。
    async fn count_active_like(&self, book_id: BookId) -> Result<u64>;

    /// すべての貸出（貸出日の新しい順）
    async fn find_all_lendings(&self) -> Result<Vec<Lending>>;

    /// 貸出件数の多い書籍を最大 `limit` 件返す
    ///
    /// 件数の多い順、同数なら書籍ID順。貸出のない書籍は含まない。
    async fn top_borrowed_books(&self, limit: u32) -> Result<Vec<BookPopularity>>;

    /// ステータスで貸出を検索する
    async fn find_lendings_by_status(&self, status: LendingStatus) -> Result<Vec<Lending>>;

    /// 返却期限が `before` より前で、返却日のない貸出を検索する
    async fn find_overdue_unreturned(&self, before: NaiveDate) -> Result<Vec<Lending>>;

    /// 読者の貸出を検索する（ステータスで絞り込み可能）
    async fn find_lendings_by_reader(
        &self,
        reader_id: ReaderId,
        status: Option<LendingStatus>,
    ) -> Result<Vec<Lending>>;

    /// 書籍の貸出履歴を検索する
    async fn find_lendings_by_book(&self, book_id: BookId) -> Result<Vec<Lending>>;

    /// 貸出日が `start..=end` の貸出を検索する
    async fn find_lendings_by_lending_date_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Lending>>;

    /// すべての貸出をストリーム配信する
    ///
    /// 延滞スイープのようなバッチ処理で使用される全件走査。
    fn stream_lendings(&self) -> BoxStream<'_, Result<Lending>>;

    /// 貸出を挿入する（受付チェック付き）
    ///
    /// 書籍ごとの排他区間の中で「貸出中の件数 < 在庫数」を確認してから挿入する。
    /// 同時に呼ばれても在庫数を超える貸出は作られない。
    async fn insert_lending(&self, lending: &Lending) -> Result<WriteOutcome>;

    /// 貸出を更新する（楽観的排他制御）
    ///
    /// 保存されているバージョンが `expected_version` と一致する場合のみ書き込み、
    /// バージョンを1つ進める。`StockCheck::Required` の場合は書籍の排他区間の中で
    /// 受付チェックも行う。
    async fn update_lending(
        &self,
        lending: &Lending,
        expected_version: i64,
        stock_check: StockCheck,
    ) -> Result<WriteOutcome>;

    /// 在庫数を変更する
    ///
    /// 書籍の排他区間の中で、貸出中の件数を下回る変更を拒否する（`StockExhausted`）。
    async fn update_stock(&self, book_id: BookId, new_stock: u32) -> Result<WriteOutcome>;

    /// 書籍を更新する（楽観的排他制御、ジャンル編集用）
    async fn update_book(&self, book: &Book, expected_version: i64) -> Result<WriteOutcome>;
}
