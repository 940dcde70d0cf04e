pub mod availability_cache;
pub mod reader_directory;
pub mod record_store;

pub use availability_cache::BookAvailabilityCache;
pub use reader_directory::ReaderDirectory;
pub use record_store::LendingRecordStore;
