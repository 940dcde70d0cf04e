use crate::domain::value_objects::ReaderId;
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// 読者ディレクトリポート
///
/// 貸出コンテキストと読者管理コンテキストの境界を維持する。
/// 貸出コンテキストはReaderIDのみを知り、読者の詳細は知らない。
#[async_trait]
pub trait ReaderDirectory: Send + Sync {
    /// 読者が存在するか確認する
    ///
    /// 貸出開始前の読者バリデーションに使用される。
    async fn exists(&self, reader_id: ReaderId) -> Result<bool>;
}
