// Implementations for the leveling system.

pub mod in_memory;
pub mod sqlite_store;

// Re-export for convenience
pub use in_memory::InMemoryLevelingStore;
pub use sqlite_store::SqliteLevelingStore;
