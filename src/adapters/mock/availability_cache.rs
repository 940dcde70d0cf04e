use crate::domain::BookId;
use crate::ports::availability_cache::{
    BookAvailabilityCache as BookAvailabilityCacheTrait, BookView, CacheLookup, Result,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
struct State {
    entries: HashMap<BookId, (BookView, Instant)>,
    generations: HashMap<BookId, u64>,
}

impl State {
    fn generation(&self, book_id: BookId) -> u64 {
        self.generations.get(&book_id).copied().unwrap_or(0)
    }
}

/// BookAvailabilityCacheのインメモリ実装
///
/// エントリはTTLで期限切れになる。
/// キャッシュから返した回数を数えるので、テストでヒットと再計算を区別できる。
pub struct BookAvailabilityCache {
    state: Mutex<State>,
    hits: Mutex<usize>,
}

impl BookAvailabilityCache {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            hits: Mutex::new(0),
        }
    }

    /// 有効なエントリがあるか
    pub fn contains(&self, book_id: BookId) -> bool {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(&book_id)
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now())
    }

    /// キャッシュから返した回数
    pub fn hits(&self) -> usize {
        *self.hits.lock().unwrap()
    }
}

impl Default for BookAvailabilityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookAvailabilityCacheTrait for BookAvailabilityCache {
    async fn get(&self, book_id: BookId) -> Result<CacheLookup> {
        let mut state = self.state.lock().unwrap();

        match state.entries.get(&book_id) {
            Some((view, expires_at)) if *expires_at > Instant::now() => {
                let view = view.clone();
                *self.hits.lock().unwrap() += 1;
                Ok(CacheLookup::Hit(view))
            }
            Some(_) => {
                state.entries.remove(&book_id);
                Ok(CacheLookup::Miss {
                    generation: state.generation(book_id),
                })
            }
            None => Ok(CacheLookup::Miss {
                generation: state.generation(book_id),
            }),
        }
    }

    async fn put(
        &self,
        book_id: BookId,
        view: &BookView,
        generation: u64,
        ttl: Duration,
    ) -> Result<bool> {
        let mut state = self.state.lock().unwrap();

        if state.generation(book_id) != generation {
            return Ok(false);
        }

        state
            .entries
            .insert(book_id, (view.clone(), Instant::now() + ttl));
        Ok(true)
    }

    async fn invalidate(&self, book_id: BookId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.entries.remove(&book_id);
        *state.generations.entry(book_id).or_default() += 1;
        Ok(())
    }
}
