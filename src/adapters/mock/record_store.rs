use crate::domain::{
    Book, BookId, Lending, LendingId, LendingStatus, ReaderId, availability,
};
use crate::ports::record_store::{
    BookPopularity, LendingRecordStore as LendingRecordStoreTrait, Result, StockCheck,
    WriteOutcome,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, BoxStream, StreamExt};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    books: HashMap<BookId, Book>,
    lendings: HashMap<LendingId, Lending>,
}

impl State {
    fn held(&self, book_id: BookId, excluding: Option<LendingId>) -> u64 {
        self.lendings
            .values()
            .filter(|l| l.book_id == book_id && l.status.is_active_like())
            .filter(|l| Some(l.lending_id) != excluding)
            .count() as u64
    }

    /// 受付チェック（状態のロックを保持したまま評価する）
    fn admit(&self, book_id: BookId, excluding: Option<LendingId>) -> Option<WriteOutcome> {
        let Some(book) = self.books.get(&book_id) else {
            return Some(WriteOutcome::MissingBook);
        };
        let held = self.held(book_id, excluding);

        match availability::can_admit(book.stock, held) {
            Ok(true) => None,
            _ => Some(WriteOutcome::StockExhausted {
                stock: book.stock,
                held,
            }),
        }
    }

    fn select(&self, predicate: impl Fn(&Lending) -> bool) -> Vec<Lending> {
        let mut found: Vec<Lending> = self
            .lendings
            .values()
            .filter(|l| predicate(l))
            .cloned()
            .collect();
        found.sort_by_key(|l| (l.lending_date, l.due_date, l.lending_id.value()));
        found
    }
}

/// LendingRecordStoreのインメモリ実装
///
/// すべての操作を1つのMutexの中で行うため、確認と書き込みは
/// PostgreSQLの行ロックと同じく原子的になる。
pub struct LendingRecordStore {
    state: Mutex<State>,
}

impl LendingRecordStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// テスト用に書籍を登録する
    pub fn add_book(&self, book: Book) {
        self.state.lock().unwrap().books.insert(book.book_id, book);
    }

    /// 受付チェックを通さずに貸出をそのまま登録する（過去日付のフィクスチャ用）
    pub fn add_lending(&self, lending: Lending) {
        self.state
            .lock()
            .unwrap()
            .lendings
            .insert(lending.lending_id, lending);
    }
}

impl Default for LendingRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LendingRecordStoreTrait for LendingRecordStore {
    async fn find_book(&self, book_id: BookId) -> Result<Option<Book>> {
        Ok(self.state.lock().unwrap().books.get(&book_id).cloned())
    }

    async fn find_lending(&self, lending_id: LendingId) -> Result<Option<Lending>> {
        Ok(self.state.lock().unwrap().lendings.get(&lending_id).cloned())
    }

    async fn count_active_like(&self, book_id: BookId) -> Result<u64> {
        Ok(self.state.lock().unwrap().held(book_id, None))
    }

    async fn find_all_lendings(&self) -> Result<Vec<Lending>> {
        let mut all = self.state.lock().unwrap().select(|_| true);
        all.sort_by_key(|l| (Reverse(l.lending_date), l.lending_id.value()));
        Ok(all)
    }

    async fn top_borrowed_books(&self, limit: u32) -> Result<Vec<BookPopularity>> {
        let state = self.state.lock().unwrap();

        let counts = state
            .lendings
            .values()
            .fold(HashMap::<BookId, u64>::new(), |mut counts, l| {
                *counts.entry(l.book_id).or_default() += 1;
                counts
            });

        let mut ranked: Vec<BookPopularity> = counts
            .into_iter()
            .filter_map(|(book_id, lending_count)| {
                state.books.get(&book_id).map(|book| BookPopularity {
                    book_id,
                    title: book.title.clone(),
                    author: book.author.clone(),
                    lending_count,
                })
            })
            .collect();
        ranked.sort_by_key(|p| (Reverse(p.lending_count), p.book_id.value()));
        ranked.truncate(limit as usize);

        Ok(ranked)
    }

    async fn find_lendings_by_status(&self, status: LendingStatus) -> Result<Vec<Lending>> {
        Ok(self.state.lock().unwrap().select(|l| l.status == status))
    }

    async fn find_overdue_unreturned(&self, before: NaiveDate) -> Result<Vec<Lending>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .select(|l| l.due_date < before && l.return_date.is_none()))
    }

    async fn find_lendings_by_reader(
        &self,
        reader_id: ReaderId,
        status: Option<LendingStatus>,
    ) -> Result<Vec<Lending>> {
        Ok(self.state.lock().unwrap().select(|l| {
            l.reader_id == reader_id && status.is_none_or(|status| l.status == status)
        }))
    }

    async fn find_lendings_by_book(&self, book_id: BookId) -> Result<Vec<Lending>> {
        Ok(self.state.lock().unwrap().select(|l| l.book_id == book_id))
    }

    async fn find_lendings_by_lending_date_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Lending>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .select(|l| l.lending_date >= start && l.lending_date <= end))
    }

    fn stream_lendings(&self) -> BoxStream<'_, Result<Lending>> {
        let snapshot = self.state.lock().unwrap().select(|_| true);
        stream::iter(snapshot.into_iter().map(Ok)).boxed()
    }

    async fn insert_lending(&self, lending: &Lending) -> Result<WriteOutcome> {
        let mut state = self.state.lock().unwrap();

        if let Some(rejected) = state.admit(lending.book_id, None) {
            return Ok(rejected);
        }

        state.lendings.insert(lending.lending_id, lending.clone());
        Ok(WriteOutcome::Applied)
    }

    async fn update_lending(
        &self,
        lending: &Lending,
        expected_version: i64,
        stock_check: StockCheck,
    ) -> Result<WriteOutcome> {
        let mut state = self.state.lock().unwrap();

        match state.lendings.get(&lending.lending_id) {
            Some(stored) if stored.version == expected_version => {}
            _ => return Ok(WriteOutcome::VersionConflict),
        }

        if stock_check == StockCheck::Required {
            if let Some(rejected) = state.admit(lending.book_id, Some(lending.lending_id)) {
                return Ok(rejected);
            }
        }

        let updated = Lending {
            version: expected_version + 1,
            ..lending.clone()
        };
        state.lendings.insert(updated.lending_id, updated);
        Ok(WriteOutcome::Applied)
    }

    async fn update_stock(&self, book_id: BookId, new_stock: u32) -> Result<WriteOutcome> {
        let mut state = self.state.lock().unwrap();
        let held = state.held(book_id, None);

        let Some(book) = state.books.get_mut(&book_id) else {
            return Ok(WriteOutcome::MissingBook);
        };

        if held > u64::from(new_stock) {
            return Ok(WriteOutcome::StockExhausted {
                stock: new_stock,
                held,
            });
        }

        book.stock = new_stock;
        book.version += 1;
        Ok(WriteOutcome::Applied)
    }

    async fn update_book(&self, book: &Book, expected_version: i64) -> Result<WriteOutcome> {
        let mut state = self.state.lock().unwrap();

        let Some(stored) = state.books.get_mut(&book.book_id) else {
            return Ok(WriteOutcome::MissingBook);
        };

        if stored.version != expected_version {
            return Ok(WriteOutcome::VersionConflict);
        }

        *stored = Book {
            version: expected_version + 1,
            ..book.clone()
        };
        Ok(WriteOutcome::Applied)
    }
}
