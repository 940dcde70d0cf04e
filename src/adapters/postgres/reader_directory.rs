use crate::domain::value_objects::ReaderId;
use crate::ports::reader_directory::{ReaderDirectory as ReaderDirectoryTrait, Result};
use async_trait::async_trait;
use sqlx::PgPool;

/// ReaderDirectoryのPostgreSQL実装
///
/// 読者プロフィールは読者管理コンテキストが所有する。
/// ここでは `readers` テーブルに行があるかだけを確認する。
pub struct ReaderDirectory {
    pool: PgPool,
}

impl ReaderDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReaderDirectoryTrait for ReaderDirectory {
    async fn exists(&self, reader_id: ReaderId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM readers WHERE id = $1)")
            .bind(reader_id.value())
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }
}
