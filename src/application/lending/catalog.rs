use crate::domain::{self, Book, BookId};
use crate::ports::*;

use super::errors::{BusinessRule, EntityKind, LendingApplicationError, Result};
use super::lending_service::{ServiceDependencies, invalidate_book_view};

/// IDで書籍を取得するヘルパー関数
async fn load_book(deps: &ServiceDependencies, book_id: BookId) -> Result<Book> {
    deps.record_store
        .find_book(book_id)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?
        .ok_or_else(|| LendingApplicationError::not_found(EntityKind::Book, book_id))
}

/// 書籍の貸出中の件数を正本から数えるヘルパー関数
async fn count_held(deps: &ServiceDependencies, book_id: BookId) -> Result<u64> {
    deps.record_store
        .count_active_like(book_id)
        .await
        .map_err(LendingApplicationError::RecordStoreError)
}

/// 正本から書籍ビューを組み立てるヘルパー関数
///
/// 貸出中の件数が在庫数を超えている場合は丸めずに整合性違反を返す。
async fn load_book_view(deps: &ServiceDependencies, book_id: BookId) -> Result<BookView> {
    let book = load_book(deps, book_id).await?;
    let held = count_held(deps, book_id).await?;

    let available = domain::availability::available_stock_from_count(book.stock, held)
        .map_err(|e| {
            tracing::error!(%book_id, stock = book.stock, held, "Active lendings exceed stock");
            LendingApplicationError::integrity(book_id, e)
        })?;

    Ok(BookView::from_book(&book, available))
}

/// 書籍ビューを取得する（表示用、リードスルーキャッシュ経由）
///
/// キャッシュにあればそれを返す。TTL以内の古さは許容される。
/// キャッシュの障害は警告を記録して正本にフォールバックする。
///
/// ミスの後に組み立てたビューは、その間に無効化がなかった場合だけ保存される。
///
/// # 引数
/// * `deps` - サービスの依存関係
/// * `book_id` - 書籍ID
///
/// # 戻り値
/// 利用可能在庫を含む書籍ビュー
pub async fn get_book_view(deps: &ServiceDependencies, book_id: BookId) -> Result<BookView> {
    let generation = match deps.availability_cache.get(book_id).await {
        Ok(CacheLookup::Hit(view)) => {
            tracing::debug!(%book_id, "Book view served from cache");
            return Ok(view);
        }
        Ok(CacheLookup::Miss { generation }) => Some(generation),
        Err(e) => {
            tracing::warn!(%book_id, error = %e, "Cache read failed, falling back to record store");
            None
        }
    };

    let view = load_book_view(deps, book_id).await?;

    let Some(generation) = generation else {
        return Ok(view);
    };

    match deps
        .availability_cache
        .put(book_id, &view, generation, deps.cache_ttl)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(%book_id, "Book view invalidated while loading, not cached");
        }
        Err(e) => {
            tracing::warn!(%book_id, error = %e, "Failed to cache book view");
        }
    }

    Ok(view)
}

/// 利用可能在庫を取得する（表示用）
pub async fn get_availability(deps: &ServiceDependencies, book_id: BookId) -> Result<u32> {
    get_book_view(deps, book_id)
        .await
        .map(|view| view.available_stock)
}

/// 書籍が貸出可能か（正本から判定、キャッシュは使わない）
///
/// 判定は呼び出した時点のもの。実際の貸出受付は `create_lending` の
/// 原子的な書き込みの中で改めて評価される。
pub async fn is_book_available_for_lending(
    deps: &ServiceDependencies,
    book_id: BookId,
) -> Result<bool> {
    let book = load_book(deps, book_id).await?;
    let held = count_held(deps, book_id).await?;

    domain::availability::can_admit(book.stock, held).map_err(|e| {
        tracing::error!(%book_id, stock = book.stock, held, "Active lendings exceed stock");
        LendingApplicationError::integrity(book_id, e)
    })
}

/// 在庫数を変更する
///
/// ビジネスルール：
/// - 負の在庫数は不可
/// - 貸出中の件数を下回る在庫数は不可
pub async fn update_book_stock(
    deps: &ServiceDependencies,
    book_id: BookId,
    new_stock: i64,
) -> Result<BookView> {
    let new_stock = domain::book::validate_stock(new_stock)?;

    let outcome = deps
        .record_store
        .update_stock(book_id, new_stock)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;

    match outcome {
        WriteOutcome::Applied => {}
        WriteOutcome::StockExhausted { held, .. } => {
            return Err(BusinessRule::StockBelowLentCopies {
                requested: new_stock,
                held,
            }
            .into());
        }
        WriteOutcome::MissingBook => {
            return Err(LendingApplicationError::not_found(EntityKind::Book, book_id));
        }
        WriteOutcome::VersionConflict => {
            return Err(LendingApplicationError::conflict(EntityKind::Book, book_id));
        }
    }

    tracing::info!(%book_id, new_stock, "Book stock updated");
    invalidate_book_view(deps, book_id).await;

    load_book_view(deps, book_id).await
}

/// 貸出件数の多い書籍（ステータスを問わず累計で数える）
pub async fn top_borrowed_books(
    deps: &ServiceDependencies,
    limit: u32,
) -> Result<Vec<BookPopularity>> {
    deps.record_store
        .top_borrowed_books(limit)
        .await
        .map_err(LendingApplicationError::RecordStoreError)
}

/// 書籍の変更（ジャンル編集）を保存するヘルパー関数
async fn save_book(deps: &ServiceDependencies, original: &Book, updated: &Book) -> Result<()> {
    let outcome = deps
        .record_store
        .update_book(updated, original.version)
        .await
        .map_err(LendingApplicationError::RecordStoreError)?;

    match outcome {
        WriteOutcome::Applied => Ok(()),
        WriteOutcome::MissingBook => Err(LendingApplicationError::not_found(
            EntityKind::Book,
            original.book_id,
        )),
        WriteOutcome::VersionConflict | WriteOutcome::StockExhausted { .. } => Err(
            LendingApplicationError::conflict(EntityKind::Book, original.book_id),
        ),
    }
}

/// 書籍にジャンルを追加する（既にあれば何もしない）
pub async fn add_genre_to_book(
    deps: &ServiceDependencies,
    book_id: BookId,
    genre: &str,
) -> Result<BookView> {
    let book = load_book(deps, book_id).await?;
    let updated = domain::book::add_genre(&book, genre)?;

    if updated.genres != book.genres {
        save_book(deps, &book, &updated).await?;
        tracing::info!(%book_id, genre, "Genre added to book");
        invalidate_book_view(deps, book_id).await;
    }

    load_book_view(deps, book_id).await
}

/// 書籍からジャンルを外す
///
/// ビジネスルール：
/// - 書籍に付いていないジャンルは外せない
/// - 最後の1つは外せない
pub async fn remove_genre_from_book(
    deps: &ServiceDependencies,
    book_id: BookId,
    genre: &str,
) -> Result<BookView> {
    let book = load_book(deps, book_id).await?;
    let updated = domain::book::remove_genre(&book, genre)?;

    save_book(deps, &book, &updated).await?;
    tracing::info!(%book_id, genre, "Genre removed from book");
    invalidate_book_view(deps, book_id).await;

    load_book_view(deps, book_id).await
}
