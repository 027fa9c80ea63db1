// Service exports
pub mod cache;
pub mod directory;
pub mod memory;
pub mod postgres;

pub use cache::{CacheError, CacheKey, CacheManager, CacheStats, CachedDirectory};
pub use directory::{AppwriteDirectory, DirectoryError, ProfileDirectory, StaticDirectory};
pub use memory::{MemoryMessageStore, MemoryRelationshipStore};
pub use postgres::{PostgresStore, StoreError};
