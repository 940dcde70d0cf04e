pub mod reader_directory;
pub mod record_store;

// パブリックに型を再エクスポート
pub use reader_directory::ReaderDirectory as PostgresReaderDirectory;
pub use record_store::LendingRecordStore as PostgresLendingRecordStore;
