use crate::domain::{
    self, BookId, DomainEvent, Lending, LendingId, LendingStatus, ReaderId, commands::*,
};
use crate::ports::*;
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::errors::{BusinessRule, EntityKind, LendingApplicationError, Result};

/// サービスの依存関係
///
/// 関数型DDDの原則に従い、データ構造として定義。
/// 振る舞い（メソッド）は持たず、純粋な関数に依存関係を渡す。
#[derive(Clone)]
pub struct ServiceDependencies {
    pub record_store: Arc<dyn LendingRecordStore>,
    pub availability_cache: Arc<dyn BookAvailabilityCache>,
    pub reader_directory: Arc<dyn ReaderDirectory>,
    /// 書籍ビューをキャッシュに保持する期間
    pub cache_ttl: Duration,
}

impl ServiceDependencies {
    pub fn new(
        record_store: Arc<dyn LendingRecordStore>,
        availability_cache: Arc<dyn BookAvailabilityCache>,
        reader_directory: Arc<dyn ReaderDirectory>,
    ) -> Self {
        Self {
            record_store,
            availability_cache,
            reader_directory,
            cache_ttl: BOOK_VIEW_TTL,
        }
    }

    pub fn with_cache_ttl(self, cache_ttl: Duration) -> Self {
        Self { cache_ttl, ..self }
    }
}

/// 貸出の表示用ビュー
///
/// 永続化された項目に加えて、`today` 時点で導出される表示用の値を持つ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LendingView {
    pub lending_id: LendingId,
    pub book_id: BookId,
    pub reader_id: ReaderId,
    pub lending_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: LendingStatus,
    pub is_overdue: bool,
    pub days_left: i64,
}

impl LendingView {
    pub fn from_lending(lending: &Lending, today: NaiveDate) -> Self {
        Self {
            lending_id: lending.lending_id,
            book_id: lending.book_id,
            reader_id: lending.reader_id,
            lending_date: lending.lending_date,
            due_date: lending.due_date,
            return_date: lending.return_date,
            status: lending.status,
            is_overdue: domain::lending::is_overdue(lending, today),
            days_left: domain::lending::days_left(lending, today),
        }
    }
}

/// 書籍ビューのキャッシュエントリを無効化するヘルパー関数
///
/// 書き込みはコミット済みのため、無効化の失敗で呼び出しを失敗させない。
/// 失敗はエラーとして記録され、古さはTTLで上限が決まる。
/// 貸出受付はキャッシュを参照しないので在庫超過の原因にはならない。
pub(super) async fn invalidate_book_view(deps: &ServiceDependencies, book_id: BookId) {
    if let Err(e) = deps.availability_cache.invalidate(book_id).await {
        tracing::error!(%book_id, error = %e, "Failed to invalidate cached book view");
    }
}

/// コミット済みのドメインイベントを反映するヘルパー関数
///
/// イベントを記録し、利用可能在庫が変わる書籍のキャッシュを
/// 呼び出し元に戻る前に無効化する。
pub(super) async fn publish(deps: &ServiceDependencies, event: DomainEvent) {
    tracing::info!(
        event = event.name(),
        lending_id = %event.lending_id(),
        "Lending state changed"
    );

    if let Some(book_id) = event.stale_book() {
        invalidate_book_view(deps, book_id).await;
    }
}

/// 受付チェックで拒否された結果を分類するヘルパー関数
///
/// 貸出中の件数が在庫数以下なら単なる在庫切れ（ビジネスルール違反）。
/// 在庫数を超えている場合は受付ガードが破られているので整合性違反として扱う。
pub(super) fn stock_exhausted(book_id: BookId, stock: u32, held: u64) -> LendingApplicationError {
    match domain::availability::available_stock_from_count(stock, held) {
        Ok(_) => BusinessRule::NoStockAvailable { book_id }.into(),
        Err(e) => {
            tracing::error!(%book_id, stock, held, "Active lendings exceed stock");
            LendingApplicationError::integrity(book_id, e)
        }
    }
}

/// IDで貸出を取得するヘルパー関数
async fn load_lending(deps: &ServiceDependencies, lending_id: LendingId) -> Result<Lending> {
    deps.record_store
        .find_lending(lending_id)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?
        .ok_or_else(|| LendingApplicationError::not_found(EntityKind::Lending, lending_id))
}

/// 在庫を消費しない更新の結果を確認するヘルパー関数
fn expect_applied(outcome: WriteOutcome, lending: &Lending) -> Result<()> {
    match outcome {
        WriteOutcome::Applied => Ok(()),
        WriteOutcome::VersionConflict => Err(LendingApplicationError::conflict(
            EntityKind::Lending,
            lending.lending_id,
        )),
        WriteOutcome::MissingBook => Err(LendingApplicationError::not_found(
            EntityKind::Book,
            lending.book_id,
        )),
        WriteOutcome::StockExhausted { stock, held } => {
            Err(stock_exhausted(lending.book_id, stock, held))
        }
    }
}

/// 書籍を貸し出す
///
/// ビジネスルール：
/// - 読者が存在すること
/// - 書籍が存在すること
/// - 貸出日が今日以前、返却期限が貸出日以降であること
/// - 利用可能在庫が1冊以上あること
///
/// # 一貫性保証
///
/// 在庫の確認と挿入はレコードストアの1つの原子的な書き込みで行われる。
/// 同時に何件呼ばれても、貸出中の件数は在庫数を超えない。
/// キャッシュは参照せず、挿入のコミット後・呼び出し元に戻る前に無効化する。
///
/// # 引数
/// * `deps` - サービスの依存関係
/// * `cmd` - 貸出コマンド
///
/// # 戻り値
/// 作成された貸出のビュー
pub async fn create_lending(deps: &ServiceDependencies, cmd: OpenLending) -> Result<LendingView> {
    // 1. 読者の存在確認
    let reader_exists = deps
        .reader_directory
        .exists(cmd.reader_id)
        .await
        .map_err(LendingApplicationError::ReaderDirectoryError)?;

    if !reader_exists {
        return Err(LendingApplicationError::not_found(
            EntityKind::Reader,
            cmd.reader_id,
        ));
    }

    // 2. 書籍の存在確認
    deps.record_store
        .find_book(cmd.book_id)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?
        .ok_or_else(|| LendingApplicationError::not_found(EntityKind::Book, cmd.book_id))?;

    // 3. ドメインロジック実行
    let (lending, event) = domain::lending::open_lending(
        cmd.book_id,
        cmd.reader_id,
        cmd.lending_date,
        cmd.due_date,
        cmd.today,
    )?;

    // 4. 受付チェック付きで挿入
    let outcome = deps
        .record_store
        .insert_lending(&lending)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;

    match outcome {
        WriteOutcome::Applied => {}
        WriteOutcome::StockExhausted { stock, held } => {
            tracing::debug!(book_id = %cmd.book_id, stock, held, "Lending rejected: no stock");
            return Err(stock_exhausted(cmd.book_id, stock, held));
        }
        WriteOutcome::MissingBook => {
            return Err(LendingApplicationError::not_found(
                EntityKind::Book,
                cmd.book_id,
            ));
        }
        WriteOutcome::VersionConflict => {
            return Err(LendingApplicationError::conflict(
                EntityKind::Lending,
                lending.lending_id,
            ));
        }
    }

    // 5. キャッシュ無効化
    publish(deps, event.into()).await;

    Ok(LendingView::from_lending(&lending, cmd.today))
}

/// 書籍を返却する
///
/// ビジネスルール：
/// - 返却済みの貸出は返却できない
/// - Active / Overdue の貸出のみ返却できる
///
/// 書き込みはバージョン比較付きで行い、延滞スイープなど他の書き込みが
/// 先行していれば `ConcurrencyConflict` を返す。
pub async fn return_lending(deps: &ServiceDependencies, cmd: ReturnLending) -> Result<LendingView> {
    let lending = load_lending(deps, cmd.lending_id).await?;

    let (returned, event) = domain::lending::return_lending(&lending, cmd.today)?;

    let outcome = deps
        .record_store
        .update_lending(&returned, lending.version, StockCheck::Skip)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;
    expect_applied(outcome, &lending)?;

    publish(deps, event.into()).await;

    Ok(LendingView::from_lending(&returned, cmd.today))
}

/// 返却期限を延長する
///
/// ビジネスルール：
/// - Active / Overdue の貸出のみ
/// - 新しい返却期限は現在の返却期限以降
///
/// 利用可能在庫は変わらないため、キャッシュは無効化しない。
pub async fn extend_lending(deps: &ServiceDependencies, cmd: ExtendLending) -> Result<LendingView> {
    let lending = load_lending(deps, cmd.lending_id).await?;

    let (extended, event) = domain::lending::extend_lending(&lending, cmd.new_due_date)?;

    let outcome = deps
        .record_store
        .update_lending(&extended, lending.version, StockCheck::Skip)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;
    expect_applied(outcome, &lending)?;

    publish(deps, event.into()).await;

    Ok(LendingView::from_lending(&extended, cmd.today))
}

/// 貸出ステータスを上書きする（管理者操作）
///
/// 遷移ガードは持たないが、返却日は新しいステータスに合わせて再導出される。
/// 非貸出状態（Returned / Cancelled / Reserved）から Active / Overdue へ戻す場合は
/// 在庫を1冊消費するので、新規貸出と同じ受付チェックを原子的に行う。
pub async fn set_lending_status(
    deps: &ServiceDependencies,
    cmd: SetLendingStatus,
) -> Result<LendingView> {
    let lending = load_lending(deps, cmd.lending_id).await?;

    let (overridden, event) = domain::lending::override_status(&lending, cmd.status, cmd.today);

    let stock_check = if event.consumes_stock {
        StockCheck::Required
    } else {
        StockCheck::Skip
    };

    let outcome = deps
        .record_store
        .update_lending(&overridden, lending.version, stock_check)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;
    expect_applied(outcome, &lending)?;

    tracing::warn!(
        lending_id = %lending.lending_id,
        from = %event.old_status,
        to = %event.new_status,
        "Lending status overridden"
    );
    publish(deps, event.into()).await;

    Ok(LendingView::from_lending(&overridden, cmd.today))
}

/// IDで貸出を取得する
pub async fn get_lending(
    deps: &ServiceDependencies,
    lending_id: LendingId,
    today: NaiveDate,
) -> Result<LendingView> {
    let lending = load_lending(deps, lending_id).await?;
    Ok(LendingView::from_lending(&lending, today))
}

fn into_views(lendings: Vec<Lending>, today: NaiveDate) -> Vec<LendingView> {
    lendings
        .iter()
        .map(|lending| LendingView::from_lending(lending, today))
        .collect()
}

/// すべての貸出（貸出日の新しい順）
pub async fn find_all_lendings(
    deps: &ServiceDependencies,
    today: NaiveDate,
) -> Result<Vec<LendingView>> {
    let lendings = deps
        .record_store
        .find_all_lendings()
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;
    Ok(into_views(lendings, today))
}

/// ステータスで貸出を検索する
pub async fn find_lendings_by_status(
    deps: &ServiceDependencies,
    status: LendingStatus,
    today: NaiveDate,
) -> Result<Vec<LendingView>> {
    let lendings = deps
        .record_store
        .find_lendings_by_status(status)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;
    Ok(into_views(lendings, today))
}

/// 読者の貸出を検索する（ステータスでの絞り込みは任意）
pub async fn find_lendings_by_reader(
    deps: &ServiceDependencies,
    reader_id: ReaderId,
    status: Option<LendingStatus>,
    today: NaiveDate,
) -> Result<Vec<LendingView>> {
    let lendings = deps
        .record_store
        .find_lendings_by_reader(reader_id, status)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;
    Ok(into_views(lendings, today))
}

/// 読者の延滞中の貸出
pub async fn overdue_lendings_for_reader(
    deps: &ServiceDependencies,
    reader_id: ReaderId,
    today: NaiveDate,
) -> Result<Vec<LendingView>> {
    find_lendings_by_reader(deps, reader_id, Some(LendingStatus::Overdue), today).await
}

/// 書籍の貸出履歴
pub async fn find_lendings_by_book(
    deps: &ServiceDependencies,
    book_id: BookId,
    today: NaiveDate,
) -> Result<Vec<LendingView>> {
    let lendings = deps
        .record_store
        .find_lendings_by_book(book_id)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;
    Ok(into_views(lendings, today))
}

/// 返却期限が `before` より前で未返却の貸出
///
/// ステータスは問わない（スイープ前の Active も含まれる）。
pub async fn find_overdue_unreturned(
    deps: &ServiceDependencies,
    before: NaiveDate,
    today: NaiveDate,
) -> Result<Vec<LendingView>> {
    let lendings = deps
        .record_store
        .find_overdue_unreturned(before)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;
    Ok(into_views(lendings, today))
}

/// 貸出日が `start..=end` の貸出
pub async fn find_lendings_by_lending_date_between(
    deps: &ServiceDependencies,
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
) -> Result<Vec<LendingView>> {
    if start > end {
        return Err(BusinessRule::InvalidDateRange { start, end }.into());
    }

    let lendings = deps
        .record_store
        .find_lendings_by_lending_date_between(start, end)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;
    Ok(into_views(lendings, today))
}
