//! 書籍在庫キャッシュのRedis実装

use crate::domain::BookId;
use crate::ports::availability_cache::{
    BookAvailabilityCache as BookAvailabilityCacheTrait, BookView, CacheLookup, Result,
};
use ::redis::{Client, Script, aio::ConnectionManager};
use async_trait::async_trait;
use std::time::Duration;

/// 世代番号が変わっていない場合だけ SET EX する
const PUT_IF_GENERATION: &str = r#"
local current = redis.call('GET', KEYS[2])
if (current or '0') ~= ARGV[1] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
return 1
"#;

/// 書籍ビューはJSON文字列として `books:{uuid}` に保存する
fn key(book_id: BookId) -> String {
    format!("books:{}", book_id)
}

/// 世代番号は `books:{uuid}:gen` に保存する（期限なし）
fn generation_key(book_id: BookId) -> String {
    format!("books:{}:gen", book_id)
}

/// BookAvailabilityCacheのRedis実装
///
/// 期限切れはRedis側（`SET EX`）で処理する。
#[derive(Clone)]
pub struct BookAvailabilityCache {
    conn: ConnectionManager,
    put_script: Script,
}

impl BookAvailabilityCache {
    /// Redisに接続して疎通を確認する
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        ::redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;

        Ok(Self {
            conn,
            put_script: Script::new(PUT_IF_GENERATION),
        })
    }
}

#[async_trait]
impl BookAvailabilityCacheTrait for BookAvailabilityCache {
    async fn get(&self, book_id: BookId) -> Result<CacheLookup> {
        let mut conn = self.conn.clone();
        let (raw, generation): (Option<String>, Option<u64>) = ::redis::cmd("MGET")
            .arg(key(book_id))
            .arg(generation_key(book_id))
            .query_async(&mut conn)
            .await?;

        match raw {
            Some(json) => Ok(CacheLookup::Hit(serde_json::from_str(&json)?)),
            None => Ok(CacheLookup::Miss {
                generation: generation.unwrap_or(0),
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
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(view)?;
        let seconds = ttl.as_secs().max(1);

        let stored: i32 = self
            .put_script
            .key(key(book_id))
            .key(generation_key(book_id))
            .arg(generation.to_string())
            .arg(json)
            .arg(seconds)
            .invoke_async(&mut conn)
            .await?;

        Ok(stored == 1)
    }

    async fn invalidate(&self, book_id: BookId) -> Result<()> {
        let mut conn = self.conn.clone();
        ::redis::pipe()
            .atomic()
            .del(key(book_id))
            .ignore()
            .incr(generation_key(book_id), 1)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
