use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use futures::stream::{self, BoxStream, StreamExt};
use library_lending::adapters::mock;
use library_lending::application::lending::*;
use library_lending::domain::commands::*;
use library_lending::domain::{Book, BookId, Lending, LendingId, LendingStatus, ReaderId};
use library_lending::ports::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

mod common;

use common::{TestContext, lending_fixture, today};

fn open(book_id: BookId, reader_id: ReaderId) -> OpenLending {
    OpenLending {
        book_id,
        reader_id,
        lending_date: today(),
        due_date: today() + Duration::days(14),
        today: today(),
    }
}

fn is_rule(result: &Result<LendingView>, expected: fn(&BusinessRule) -> bool) -> bool {
    matches!(result, Err(LendingApplicationError::BusinessRuleViolation(rule)) if expected(rule))
}

// ============================================================================
// 基本シナリオ
// ============================================================================

#[tokio::test]
async fn test_lend_and_return_single_copy() {
    // Arrange: 在庫1冊、貸出なし
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);
    let reader_id = ctx.reader();

    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 1);

    // Act: 1件目の貸出
    let lending = create_lending(&ctx.deps, open(book_id, reader_id))
        .await
        .unwrap();

    // Assert
    assert_eq!(lending.status, LendingStatus::Active);
    assert_eq!(lending.return_date, None);
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 0);

    // 2件目は在庫切れ
    let second = create_lending(&ctx.deps, open(book_id, ctx.reader())).await;
    assert!(is_rule(&second, |r| matches!(
        r,
        BusinessRule::NoStockAvailable { .. }
    )));

    // 返却すると在庫が戻る
    let returned = return_lending(
        &ctx.deps,
        ReturnLending {
            lending_id: lending.lending_id,
            today: today(),
        },
    )
    .await
    .unwrap();

    assert_eq!(returned.status, LendingStatus::Returned);
    assert_eq!(returned.return_date, Some(today()));
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_sweep_marks_past_due_lending_overdue_once() {
    // Arrange: 返却期限が昨日のActiveな貸出
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(2);
    let lending = lending_fixture(
        book_id,
        ctx.reader(),
        LendingStatus::Active,
        today() - Duration::days(1),
    );
    ctx.store.add_lending(lending.clone());

    // Act
    let first = sweep_overdue(&ctx.deps, today()).await;

    // Assert
    assert_eq!(first.scanned, 1);
    assert_eq!(first.transitioned, 1);
    let after_first = get_lending(&ctx.deps, lending.lending_id, today())
        .await
        .unwrap();
    assert_eq!(after_first.status, LendingStatus::Overdue);
    assert!(after_first.is_overdue);
    assert_eq!(after_first.days_left, -1);

    // 再実行しても何も起きない
    let second = sweep_overdue(&ctx.deps, today()).await;
    assert_eq!(second.transitioned, 0);
    assert_eq!(second.conflicts, 0);
    assert_eq!(
        ctx.store
            .find_lending(lending.lending_id)
            .await
            .unwrap()
            .unwrap()
            .version,
        1
    );
}

#[tokio::test]
async fn test_sweep_ignores_lendings_that_are_not_active() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(5);
    let yesterday = today() - Duration::days(1);

    for status in [
        LendingStatus::Overdue,
        LendingStatus::Returned,
        LendingStatus::Reserved,
        LendingStatus::Cancelled,
    ] {
        ctx.store
            .add_lending(lending_fixture(book_id, ctx.reader(), status, yesterday));
    }
    // 期限内のActive
    ctx.store.add_lending(lending_fixture(
        book_id,
        ctx.reader(),
        LendingStatus::Active,
        today(),
    ));

    let report = sweep_overdue(&ctx.deps, today()).await;

    assert_eq!(report.scanned, 5);
    assert_eq!(report.transitioned, 0);
    assert_eq!(report.failures, 0);
}

#[tokio::test]
async fn test_extend_to_earlier_date_is_rejected() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);
    let lending = create_lending(&ctx.deps, open(book_id, ctx.reader()))
        .await
        .unwrap();

    let result = extend_lending(
        &ctx.deps,
        ExtendLending {
            lending_id: lending.lending_id,
            new_due_date: lending.due_date - Duration::days(1),
            today: today(),
        },
    )
    .await;

    assert!(is_rule(&result, |r| matches!(
        r,
        BusinessRule::ExtensionBeforeDueDate { .. }
    )));
    let unchanged = get_lending(&ctx.deps, lending.lending_id, today())
        .await
        .unwrap();
    assert_eq!(unchanged.due_date, lending.due_date);
}

#[tokio::test]
async fn test_extend_keeps_status_and_moves_due_date() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);
    let lending = lending_fixture(
        book_id,
        ctx.reader(),
        LendingStatus::Overdue,
        today() - Duration::days(3),
    );
    ctx.store.add_lending(lending.clone());

    let extended = extend_lending(
        &ctx.deps,
        ExtendLending {
            lending_id: lending.lending_id,
            new_due_date: today() + Duration::days(7),
            today: today(),
        },
    )
    .await
    .unwrap();

    assert_eq!(extended.status, LendingStatus::Overdue);
    assert_eq!(extended.due_date, today() + Duration::days(7));
    assert_eq!(extended.days_left, 7);
    assert!(!extended.is_overdue);
}

#[tokio::test]
async fn test_return_of_returned_lending_is_rejected() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);
    let lending = lending_fixture(
        book_id,
        ctx.reader(),
        LendingStatus::Returned,
        today() - Duration::days(2),
    );
    ctx.store.add_lending(lending.clone());

    let result = return_lending(
        &ctx.deps,
        ReturnLending {
            lending_id: lending.lending_id,
            today: today(),
        },
    )
    .await;

    assert!(is_rule(&result, |r| matches!(r, BusinessRule::AlreadyReturned)));
    let stored = ctx
        .store
        .find_lending(lending.lending_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, lending);
}

// ============================================================================
// 入力検証とNotFound
// ============================================================================

#[tokio::test]
async fn test_create_lending_unknown_reader() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);
    let reader_id = ReaderId::new();

    let result = create_lending(&ctx.deps, open(book_id, reader_id)).await;

    assert!(matches!(
        result,
        Err(LendingApplicationError::NotFound {
            kind: EntityKind::Reader,
            id,
        }) if id == reader_id.value()
    ));
}

#[tokio::test]
async fn test_create_lending_unknown_book() {
    let ctx = TestContext::new();
    let book_id = BookId::new();

    let result = create_lending(&ctx.deps, open(book_id, ctx.reader())).await;

    assert!(matches!(
        result,
        Err(LendingApplicationError::NotFound {
            kind: EntityKind::Book,
            id,
        }) if id == book_id.value()
    ));
}

#[tokio::test]
async fn test_unknown_lending_is_not_found() {
    let ctx = TestContext::new();
    let lending_id = LendingId::new();

    let result = return_lending(
        &ctx.deps,
        ReturnLending {
            lending_id,
            today: today(),
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(LendingApplicationError::NotFound {
            kind: EntityKind::Lending,
            ..
        })
    ));
}

#[tokio::test]
async fn test_create_lending_date_rules() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(3);

    let future = create_lending(
        &ctx.deps,
        OpenLending {
            lending_date: today() + Duration::days(1),
            due_date: today() + Duration::days(10),
            ..open(book_id, ctx.reader())
        },
    )
    .await;
    assert!(is_rule(&future, |r| matches!(
        r,
        BusinessRule::LendingDateInFuture { .. }
    )));

    let inverted = create_lending(
        &ctx.deps,
        OpenLending {
            due_date: today() - Duration::days(1),
            ..open(book_id, ctx.reader())
        },
    )
    .await;
    assert!(is_rule(&inverted, |r| matches!(
        r,
        BusinessRule::DueDateBeforeLendingDate { .. }
    )));

    // 拒否された貸出は在庫を消費しない
    assert_eq!(ctx.store.count_active_like(book_id).await.unwrap(), 0);
}

// ============================================================================
// 並行性：在庫超過の防止
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_creations_never_exceed_stock() {
    const STOCK: u32 = 3;
    const CALLERS: usize = 24;

    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(STOCK);

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let deps = ctx.deps.clone();
            let reader_id = ctx.reader();
            tokio::spawn(async move { create_lending(&deps, open(book_id, reader_id)).await })
        })
        .collect();

    let mut created = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(LendingApplicationError::BusinessRuleViolation(
                BusinessRule::NoStockAvailable { .. },
            )) => rejected += 1,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(created, STOCK as usize);
    assert_eq!(rejected, CALLERS - STOCK as usize);
    assert_eq!(
        ctx.store.count_active_like(book_id).await.unwrap(),
        u64::from(STOCK)
    );
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reactivations_never_exceed_stock() {
    // 返却済みの貸出を同時にActiveへ戻しても在庫数を超えない
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);

    let ids: Vec<LendingId> = (0..6)
        .map(|_| {
            let lending = lending_fixture(
                book_id,
                ctx.reader(),
                LendingStatus::Returned,
                today() - Duration::days(1),
            );
            let id = lending.lending_id;
            ctx.store.add_lending(lending);
            id
        })
        .collect();

    let handles: Vec<_> = ids
        .into_iter()
        .map(|lending_id| {
            let deps = ctx.deps.clone();
            tokio::spawn(async move {
                set_lending_status(
                    &deps,
                    SetLendingStatus {
                        lending_id,
                        status: LendingStatus::Active,
                        today: today(),
                    },
                )
                .await
            })
        })
        .collect();

    let mut reactivated = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            reactivated += 1;
        }
    }

    assert_eq!(reactivated, 1);
    assert_eq!(ctx.store.count_active_like(book_id).await.unwrap(), 1);
}

// ============================================================================
// キャッシュ
// ============================================================================

#[tokio::test]
async fn test_display_reads_are_served_from_cache() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(4);

    let first = get_availability(&ctx.deps, book_id).await.unwrap();
    let second = get_availability(&ctx.deps, book_id).await.unwrap();
    let view = get_book_view(&ctx.deps, book_id).await.unwrap();

    assert_eq!(first, 4);
    assert_eq!(second, first);
    assert_eq!(view.available_stock, first);
    assert_eq!(ctx.cache.hits(), 2);
}

#[tokio::test]
async fn test_every_stock_affecting_mutation_invalidates_cache() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(2);

    // create
    get_book_view(&ctx.deps, book_id).await.unwrap();
    assert!(ctx.cache.contains(book_id));
    let lending = create_lending(&ctx.deps, open(book_id, ctx.reader()))
        .await
        .unwrap();
    assert!(!ctx.cache.contains(book_id));
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 1);

    // status override
    assert!(ctx.cache.contains(book_id));
    set_lending_status(
        &ctx.deps,
        SetLendingStatus {
            lending_id: lending.lending_id,
            status: LendingStatus::Cancelled,
            today: today(),
        },
    )
    .await
    .unwrap();
    assert!(!ctx.cache.contains(book_id));
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 2);

    // return
    let other = create_lending(&ctx.deps, open(book_id, ctx.reader()))
        .await
        .unwrap();
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 1);
    return_lending(
        &ctx.deps,
        ReturnLending {
            lending_id: other.lending_id,
            today: today(),
        },
    )
    .await
    .unwrap();
    assert!(!ctx.cache.contains(book_id));
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 2);

    // sweep
    ctx.store.add_lending(lending_fixture(
        book_id,
        ctx.reader(),
        LendingStatus::Active,
        today() - Duration::days(1),
    ));
    ctx.deps.availability_cache.invalidate(book_id).await.unwrap();
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 1);
    sweep_overdue(&ctx.deps, today()).await;
    assert!(!ctx.cache.contains(book_id));

    // stock edit
    get_book_view(&ctx.deps, book_id).await.unwrap();
    update_book_stock(&ctx.deps, book_id, 5).await.unwrap();
    assert!(!ctx.cache.contains(book_id));
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 4);

    // genre edit
    add_genre_to_book(&ctx.deps, book_id, "classic").await.unwrap();
    assert!(!ctx.cache.contains(book_id));
    let view = get_book_view(&ctx.deps, book_id).await.unwrap();
    assert!(view.genres.contains(&"classic".to_string()));
}

#[tokio::test]
async fn test_extend_leaves_cached_view_in_place() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(2);
    let lending = create_lending(&ctx.deps, open(book_id, ctx.reader()))
        .await
        .unwrap();
    get_book_view(&ctx.deps, book_id).await.unwrap();

    extend_lending(
        &ctx.deps,
        ExtendLending {
            lending_id: lending.lending_id,
            new_due_date: lending.due_date + Duration::days(7),
            today: today(),
        },
    )
    .await
    .unwrap();

    assert!(ctx.cache.contains(book_id));
}

#[tokio::test]
async fn test_admission_ignores_stale_cache() {
    // キャッシュが古い値（在庫あり）を返しても受付は正本で判定する
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);
    get_book_view(&ctx.deps, book_id).await.unwrap();

    // キャッシュを経由せずに在庫を消費
    ctx.store.add_lending(lending_fixture(
        book_id,
        ctx.reader(),
        LendingStatus::Active,
        today() + Duration::days(3),
    ));
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 1);

    let result = create_lending(&ctx.deps, open(book_id, ctx.reader())).await;

    assert!(is_rule(&result, |r| matches!(
        r,
        BusinessRule::NoStockAvailable { .. }
    )));
    assert!(!is_book_available_for_lending(&ctx.deps, book_id).await.unwrap());
}

/// 最初の `put` の直前に貸出を1件作成するキャッシュ
///
/// 読み込みがミスしてから保存するまでの間に書き込みが割り込む状況を再現する。
struct InterleavingCache {
    inner: Arc<mock::BookAvailabilityCache>,
    writer: OnceLock<(ServiceDependencies, OpenLending)>,
    fired: AtomicBool,
}

#[async_trait]
impl BookAvailabilityCache for InterleavingCache {
    async fn get(&self, book_id: BookId) -> availability_cache::Result<CacheLookup> {
        self.inner.get(book_id).await
    }

    async fn put(
        &self,
        book_id: BookId,
        view: &BookView,
        generation: u64,
        ttl: std::time::Duration,
    ) -> availability_cache::Result<bool> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            if let Some((deps, cmd)) = self.writer.get() {
                create_lending(deps, cmd.clone()).await?;
            }
        }
        self.inner.put(book_id, view, generation, ttl).await
    }

    async fn invalidate(&self, book_id: BookId) -> availability_cache::Result<()> {
        self.inner.invalidate(book_id).await
    }
}

#[tokio::test]
async fn test_view_loaded_before_concurrent_write_is_not_cached() {
    let store = Arc::new(mock::LendingRecordStore::new());
    let readers = Arc::new(mock::ReaderDirectory::new());
    let inner = Arc::new(mock::BookAvailabilityCache::new());
    let cache = Arc::new(InterleavingCache {
        inner: inner.clone(),
        writer: OnceLock::new(),
        fired: AtomicBool::new(false),
    });
    let deps = ServiceDependencies::new(store.clone(), cache.clone(), readers.clone());

    let book = common::sample_book(1, 11);
    let book_id = book.book_id;
    store.add_book(book);
    let reader_id = ReaderId::new();
    readers.add_reader(reader_id);
    assert!(
        cache
            .writer
            .set((deps.clone(), open(book_id, reader_id)))
            .is_ok()
    );

    // ミスの後、保存の前に貸出が確定する
    let during_write = get_availability(&deps, book_id).await.unwrap();
    assert_eq!(during_write, 1);
    assert_eq!(store.count_active_like(book_id).await.unwrap(), 1);
    assert!(!inner.contains(book_id));

    // 次の読み取りは正本と一致する
    let next = get_availability(&deps, book_id).await.unwrap();
    assert_eq!(next, 0);
    assert!(inner.contains(book_id));
    assert_eq!(get_availability(&deps, book_id).await.unwrap(), 0);
    assert_eq!(inner.hits(), 1);
}

/// すべての操作が失敗するキャッシュ
struct UnavailableCache;

#[async_trait]
impl BookAvailabilityCache for UnavailableCache {
    async fn get(&self, _book_id: BookId) -> availability_cache::Result<CacheLookup> {
        Err("cache unavailable".into())
    }

    async fn put(
        &self,
        _book_id: BookId,
        _view: &BookView,
        _generation: u64,
        _ttl: std::time::Duration,
    ) -> availability_cache::Result<bool> {
        Err("cache unavailable".into())
    }

    async fn invalidate(&self, _book_id: BookId) -> availability_cache::Result<()> {
        Err("cache unavailable".into())
    }
}

#[tokio::test]
async fn test_cache_outage_degrades_to_record_store() {
    let store = Arc::new(mock::LendingRecordStore::new());
    let readers = Arc::new(mock::ReaderDirectory::new());
    let deps = ServiceDependencies::new(store.clone(), Arc::new(UnavailableCache), readers.clone());

    let book = common::sample_book(2, 7);
    let book_id = book.book_id;
    store.add_book(book);
    let reader_id = ReaderId::new();
    readers.add_reader(reader_id);

    assert_eq!(get_availability(&deps, book_id).await.unwrap(), 2);

    let lending = create_lending(&deps, open(book_id, reader_id)).await;
    assert!(lending.is_ok());
    assert_eq!(get_availability(&deps, book_id).await.unwrap(), 1);
}

// ============================================================================
// 管理者によるステータス上書き
// ============================================================================

#[tokio::test]
async fn test_override_to_returned_stamps_return_date() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);
    let lending = create_lending(&ctx.deps, open(book_id, ctx.reader()))
        .await
        .unwrap();

    let view = set_lending_status(
        &ctx.deps,
        SetLendingStatus {
            lending_id: lending.lending_id,
            status: LendingStatus::Returned,
            today: today(),
        },
    )
    .await
    .unwrap();

    assert_eq!(view.status, LendingStatus::Returned);
    assert_eq!(view.return_date, Some(today()));
    assert_eq!(view.days_left, 0);
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_override_back_to_active_requires_stock() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);
    let returned = lending_fixture(
        book_id,
        ctx.reader(),
        LendingStatus::Returned,
        today() - Duration::days(1),
    );
    ctx.store.add_lending(returned.clone());
    let holder = create_lending(&ctx.deps, open(book_id, ctx.reader()))
        .await
        .unwrap();

    // 在庫がないので戻せない
    let reactivate = SetLendingStatus {
        lending_id: returned.lending_id,
        status: LendingStatus::Active,
        today: today(),
    };
    let result = set_lending_status(&ctx.deps, reactivate.clone()).await;
    assert!(is_rule(&result, |r| matches!(
        r,
        BusinessRule::NoStockAvailable { .. }
    )));

    // 在庫が空けば戻せる。返却日は消える
    return_lending(
        &ctx.deps,
        ReturnLending {
            lending_id: holder.lending_id,
            today: today(),
        },
    )
    .await
    .unwrap();

    let view = set_lending_status(&ctx.deps, reactivate).await.unwrap();
    assert_eq!(view.status, LendingStatus::Active);
    assert_eq!(view.return_date, None);
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_override_between_active_like_statuses_skips_admission() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);
    let lending = create_lending(&ctx.deps, open(book_id, ctx.reader()))
        .await
        .unwrap();

    let view = set_lending_status(
        &ctx.deps,
        SetLendingStatus {
            lending_id: lending.lending_id,
            status: LendingStatus::Overdue,
            today: today(),
        },
    )
    .await
    .unwrap();

    assert_eq!(view.status, LendingStatus::Overdue);
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 0);
}

// ============================================================================
// 延滞スイープと同時更新
// ============================================================================

/// 走査結果だけを固定したスナップショットで返すストア
///
/// スイープが読み込んだ後に別の書き込みが入った状況を再現する。
struct StaleScanStore {
    inner: Arc<mock::LendingRecordStore>,
    snapshot: Vec<Lending>,
}

#[async_trait]
impl LendingRecordStore for StaleScanStore {
    async fn find_book(&self, book_id: BookId) -> record_store::Result<Option<Book>> {
        self.inner.find_book(book_id).await
    }

    async fn find_lending(&self, lending_id: LendingId) -> record_store::Result<Option<Lending>> {
        self.inner.find_lending(lending_id).await
    }

    async fn count_active_like(&self, book_id: BookId) -> record_store::Result<u64> {
        self.inner.count_active_like(book_id).await
    }

    async fn find_all_lendings(&self) -> record_store::Result<Vec<Lending>> {
        self.inner.find_all_lendings().await
    }

    async fn top_borrowed_books(&self, limit: u32) -> record_store::Result<Vec<BookPopularity>> {
        self.inner.top_borrowed_books(limit).await
    }

    async fn find_lendings_by_status(
        &self,
        status: LendingStatus,
    ) -> record_store::Result<Vec<Lending>> {
        self.inner.find_lendings_by_status(status).await
    }

    async fn find_overdue_unreturned(
        &self,
        before: NaiveDate,
    ) -> record_store::Result<Vec<Lending>> {
        self.inner.find_overdue_unreturned(before).await
    }

    async fn find_lendings_by_reader(
        &self,
        reader_id: ReaderId,
        status: Option<LendingStatus>,
    ) -> record_store::Result<Vec<Lending>> {
        self.inner.find_lendings_by_reader(reader_id, status).await
    }

    async fn find_lendings_by_book(&self, book_id: BookId) -> record_store::Result<Vec<Lending>> {
        self.inner.find_lendings_by_book(book_id).await
    }

    async fn find_lendings_by_lending_date_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> record_store::Result<Vec<Lending>> {
        self.inner
            .find_lendings_by_lending_date_between(start, end)
            .await
    }

    fn stream_lendings(&self) -> BoxStream<'_, record_store::Result<Lending>> {
        stream::iter(self.snapshot.clone().into_iter().map(Ok)).boxed()
    }

    async fn insert_lending(&self, lending: &Lending) -> record_store::Result<WriteOutcome> {
        self.inner.insert_lending(lending).await
    }

    async fn update_lending(
        &self,
        lending: &Lending,
        expected_version: i64,
        stock_check: StockCheck,
    ) -> record_store::Result<WriteOutcome> {
        self.inner
            .update_lending(lending, expected_version, stock_check)
            .await
    }

    async fn update_stock(
        &self,
        book_id: BookId,
        new_stock: u32,
    ) -> record_store::Result<WriteOutcome> {
        self.inner.update_stock(book_id, new_stock).await
    }

    async fn update_book(
        &self,
        book: &Book,
        expected_version: i64,
    ) -> record_store::Result<WriteOutcome> {
        self.inner.update_book(book, expected_version).await
    }
}

#[tokio::test]
async fn test_sweep_does_not_overwrite_concurrent_return() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);
    let lending = lending_fixture(
        book_id,
        ctx.reader(),
        LendingStatus::Active,
        today() - Duration::days(1),
    );
    ctx.store.add_lending(lending.clone());

    // スイープが読み込んだ後に返却された
    let snapshot = vec![lending.clone()];
    return_lending(
        &ctx.deps,
        ReturnLending {
            lending_id: lending.lending_id,
            today: today(),
        },
    )
    .await
    .unwrap();

    let sweep_deps = ServiceDependencies::new(
        Arc::new(StaleScanStore {
            inner: ctx.store.clone(),
            snapshot,
        }),
        ctx.cache.clone(),
        ctx.readers.clone(),
    );

    let report = sweep_overdue(&sweep_deps, today()).await;

    assert_eq!(report.transitioned, 0);
    assert_eq!(report.conflicts, 1);
    let stored = ctx
        .store
        .find_lending(lending.lending_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, LendingStatus::Returned);
    assert_eq!(get_availability(&ctx.deps, book_id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_sweep_continues_past_failing_rows() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(3);
    let yesterday = today() - Duration::days(1);

    // 存在しない貸出（書き込みは競合になる）と、通常の延滞候補
    let ghost = lending_fixture(book_id, ctx.reader(), LendingStatus::Active, yesterday);
    let real = lending_fixture(book_id, ctx.reader(), LendingStatus::Active, yesterday);
    ctx.store.add_lending(real.clone());

    let sweep_deps = ServiceDependencies::new(
        Arc::new(StaleScanStore {
            inner: ctx.store.clone(),
            snapshot: vec![ghost, real.clone()],
        }),
        ctx.cache.clone(),
        ctx.readers.clone(),
    );

    let report = sweep_overdue(&sweep_deps, today()).await;

    assert_eq!(report.scanned, 2);
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.transitioned, 1);
    let stored = ctx.store.find_lending(real.lending_id).await.unwrap().unwrap();
    assert_eq!(stored.status, LendingStatus::Overdue);
}

// ============================================================================
// 整合性違反
// ============================================================================

#[tokio::test]
async fn test_oversubscription_is_surfaced_not_clamped() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);
    for _ in 0..2 {
        ctx.store.add_lending(lending_fixture(
            book_id,
            ctx.reader(),
            LendingStatus::Active,
            today() + Duration::days(5),
        ));
    }

    let availability = get_availability(&ctx.deps, book_id).await;
    assert!(matches!(
        availability,
        Err(LendingApplicationError::IntegrityViolation {
            stock: 1,
            held: 2,
            ..
        })
    ));
    assert!(!ctx.cache.contains(book_id));

    let admission = is_book_available_for_lending(&ctx.deps, book_id).await;
    assert!(matches!(
        admission,
        Err(LendingApplicationError::IntegrityViolation { .. })
    ));

    let create = create_lending(&ctx.deps, open(book_id, ctx.reader())).await;
    assert!(matches!(
        create,
        Err(LendingApplicationError::IntegrityViolation { .. })
    ));
}

// ============================================================================
// カタログ操作
// ============================================================================

#[tokio::test]
async fn test_stock_cannot_drop_below_lent_copies() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(2);
    create_lending(&ctx.deps, open(book_id, ctx.reader()))
        .await
        .unwrap();
    create_lending(&ctx.deps, open(book_id, ctx.reader()))
        .await
        .unwrap();

    let below = update_book_stock(&ctx.deps, book_id, 1).await;
    assert!(matches!(
        below,
        Err(LendingApplicationError::BusinessRuleViolation(
            BusinessRule::StockBelowLentCopies {
                requested: 1,
                held: 2
            }
        ))
    ));

    let negative = update_book_stock(&ctx.deps, book_id, -1).await;
    assert!(matches!(
        negative,
        Err(LendingApplicationError::BusinessRuleViolation(
            BusinessRule::NegativeStock(-1)
        ))
    ));

    let view = update_book_stock(&ctx.deps, book_id, 2).await.unwrap();
    assert_eq!(view.stock, 2);
    assert_eq!(view.available_stock, 0);
}

#[tokio::test]
async fn test_genre_edits() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(1);

    let unknown = remove_genre_from_book(&ctx.deps, book_id, "poetry").await;
    assert!(matches!(
        unknown,
        Err(LendingApplicationError::BusinessRuleViolation(
            BusinessRule::GenreNotOnBook(_)
        ))
    ));

    let view = remove_genre_from_book(&ctx.deps, book_id, "mystery")
        .await
        .unwrap();
    assert_eq!(view.genres, vec!["fiction".to_string()]);

    let last = remove_genre_from_book(&ctx.deps, book_id, "fiction").await;
    assert!(matches!(
        last,
        Err(LendingApplicationError::BusinessRuleViolation(
            BusinessRule::LastGenre
        ))
    ));

    // 既にあるジャンルの追加は何も変えない
    add_genre_to_book(&ctx.deps, book_id, "fiction").await.unwrap();
    let book = ctx.store.find_book(book_id).await.unwrap().unwrap();
    assert_eq!(book.version, 1);
}

// ============================================================================
// 検索
// ============================================================================

#[tokio::test]
async fn test_lending_queries() {
    let ctx = TestContext::new();
    let book_id = ctx.book_with_stock(5);
    let reader_id = ctx.reader();

    let overdue = lending_fixture(
        book_id,
        reader_id,
        LendingStatus::Overdue,
        today() - Duration::days(4),
    );
    let returned = lending_fixture(
        book_id,
        reader_id,
        LendingStatus::Returned,
        today() - Duration::days(20),
    );
    ctx.store.add_lending(overdue.clone());
    ctx.store.add_lending(returned.clone());
    let active = create_lending(&ctx.deps, open(book_id, reader_id))
        .await
        .unwrap();

    let all = find_lendings_by_reader(&ctx.deps, reader_id, None, today())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);

    let overdue_only = overdue_lendings_for_reader(&ctx.deps, reader_id, today())
        .await
        .unwrap();
    assert_eq!(overdue_only.len(), 1);
    assert_eq!(overdue_only[0].lending_id, overdue.lending_id);
    assert!(overdue_only[0].is_overdue);

    let active_only = find_lendings_by_status(&ctx.deps, LendingStatus::Active, today())
        .await
        .unwrap();
    assert_eq!(active_only.len(), 1);
    assert_eq!(active_only[0].lending_id, active.lending_id);

    let history = find_lendings_by_book(&ctx.deps, book_id, today())
        .await
        .unwrap();
    assert_eq!(history.len(), 3);

    let unreturned = find_overdue_unreturned(&ctx.deps, today(), today())
        .await
        .unwrap();
    assert_eq!(unreturned.len(), 1);
    assert_eq!(unreturned[0].lending_id, overdue.lending_id);

    let recent = find_lendings_by_lending_date_between(
        &ctx.deps,
        today() - Duration::days(35),
        today() - Duration::days(30),
        today(),
    )
    .await
    .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].lending_id, returned.lending_id);

    let inverted = find_lendings_by_lending_date_between(
        &ctx.deps,
        today(),
        today() - Duration::days(1),
        today(),
    )
    .await;
    assert!(matches!(
        inverted,
        Err(LendingApplicationError::BusinessRuleViolation(
            BusinessRule::InvalidDateRange { .. }
        ))
    ));

    // 他の読者の貸出も含めて、貸出日の新しい順
    let other_reader = create_lending(&ctx.deps, open(book_id, ctx.reader()))
        .await
        .unwrap();
    let everything = find_all_lendings(&ctx.deps, today()).await.unwrap();
    assert_eq!(everything.len(), 4);
    assert!(
        everything
            .iter()
            .any(|l| l.lending_id == other_reader.lending_id)
    );
    assert_eq!(everything[3].lending_id, returned.lending_id);
    assert_eq!(everything[2].lending_id, overdue.lending_id);
    assert!(
        everything
            .windows(2)
            .all(|pair| pair[0].lending_date >= pair[1].lending_date)
    );
}

#[tokio::test]
async fn test_top_borrowed_books_counts_every_status() {
    let ctx = TestContext::new();
    let popular = ctx.book_with_stock(3);
    let quiet_book = common::sample_book(3, 2);
    let quiet = quiet_book.book_id;
    ctx.store.add_book(quiet_book);
    let never_lent = common::sample_book(3, 3);
    ctx.store.add_book(never_lent);

    for status in [
        LendingStatus::Returned,
        LendingStatus::Cancelled,
        LendingStatus::Overdue,
    ] {
        ctx.store.add_lending(lending_fixture(
            popular,
            ctx.reader(),
            status,
            today() - Duration::days(2),
        ));
    }
    create_lending(&ctx.deps, open(quiet, ctx.reader()))
        .await
        .unwrap();

    let ranking = top_borrowed_books(&ctx.deps, 10).await.unwrap();

    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking[0].book_id, popular);
    assert_eq!(ranking[0].lending_count, 3);
    assert_eq!(ranking[0].title, "The Name of the Rose");
    assert_eq!(ranking[0].author, "Umberto Eco");
    assert_eq!(ranking[1].book_id, quiet);
    assert_eq!(ranking[1].lending_count, 1);

    let top_one = top_borrowed_books(&ctx.deps, 1).await.unwrap();
    assert_eq!(top_one.len(), 1);
    assert_eq!(top_one[0].book_id, popular);
}
