pub mod availability_cache;

pub use availability_cache::BookAvailabilityCache as RedisBookAvailabilityCache;
