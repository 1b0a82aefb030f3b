//! Database module
//!
//! SQLite integration using sqlx with:
//! - Connection pool management and additive schema creation
//! - Row types with FromRow
//! - Repository pattern for data access
//! - A lazily opened `IndexStore` owning the pool lifecycle

pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

// Re-export commonly used items
pub use repository::ScanOrder;
pub use store::{IndexStore, StoreError};
