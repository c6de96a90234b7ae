/// Persisted shapes of the session aggregate.
pub mod models;
/// Transactional session persistence and its backends.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
