use crate::domain::{Book, BookId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 書籍ビューのTTL（30分）
pub const BOOK_VIEW_TTL: Duration = Duration::from_secs(30 * 60);

/// 書籍ビュー（キャッシュ用の非正規化ビュー）
///
/// 計算時点の利用可能在庫を含む。表示用の読み取りにのみ使われ、
/// TTL以内の古さは許容される。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookView {
    pub book_id: BookId,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publication_year: i32,
    pub stock: u32,
    pub available_stock: u32,
    pub genres: Vec<String>,
}

impl BookView {
    pub fn from_book(book: &Book, available_stock: u32) -> Self {
        Self {
            book_id: book.book_id,
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.value().to_string(),
            publication_year: book.publication_year,
            stock: book.stock,
            available_stock,
            genres: book.genres.iter().cloned().collect(),
        }
    }
}

/// キャッシュ参照の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(BookView),
    /// 未登録または期限切れ
    ///
    /// `generation` は参照時点の世代番号。正本から組み立てたビューを
    /// `put` するときにそのまま渡す。
    Miss { generation: u64 },
}

/// 書籍在庫キャッシュポート
///
/// 書籍IDをキーとした読み取り用キャッシュ。正本ではない。
/// 貸出受付のような正しさが必要な経路からは参照しない。
///
/// 書籍ごとに世代番号を持ち、`invalidate` のたびに進める。
/// `put` はミス時に受け取った世代番号が変わっていない場合だけ保存するため、
/// ミスから保存までの間に無効化が入ると古いビューは保存されない。
#[async_trait]
pub trait BookAvailabilityCache: Send + Sync {
    async fn get(&self, book_id: BookId) -> Result<CacheLookup>;

    /// 世代番号が `generation` のままならビューを保存する
    ///
    /// 保存した場合は `true`、途中で無効化されていた場合は `false`。
    async fn put(
        &self,
        book_id: BookId,
        view: &BookView,
        generation: u64,
        ttl: Duration,
    ) -> Result<bool>;

    /// エントリを削除して世代番号を進める
    async fn invalidate(&self, book_id: BookId) -> Result<()>;
}
