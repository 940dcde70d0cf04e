use crate::domain::value_objects::ReaderId;
use crate::ports::reader_directory::{ReaderDirectory as ReaderDirectoryTrait, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

/// ReaderDirectoryのモック実装
///
/// 登録した読者IDを保持する。
pub struct ReaderDirectory {
    readers: Mutex<HashSet<ReaderId>>,
}

impl ReaderDirectory {
    pub fn new() -> Self {
        Self {
            readers: Mutex::new(HashSet::new()),
        }
    }

    /// テスト用に読者を登録する
    pub fn add_reader(&self, reader_id: ReaderId) {
        self.readers.lock().unwrap().insert(reader_id);
    }
}

impl Default for ReaderDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReaderDirectoryTrait for ReaderDirectory {
    async fn exists(&self, reader_id: ReaderId) -> Result<bool> {
        Ok(self.readers.lock().unwrap().contains(&reader_id))
    }
}
