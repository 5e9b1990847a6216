//! Storage backends for idiolect
//!
//! Engine state is persisted through the `KeyValueStore` port. `SqliteStore`
//! is the durable backend; `MemoryStore` keeps everything in process.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{KeyValueStore, OpenStore, StorageError, StorageResult};
