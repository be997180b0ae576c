//! Database layer.
//!
//! - Adapter pool: named connections with a default
//! - SQL datasets: tables as import/export targets
//! - Row decoding for exports
//! - Backend dispatch macro

#[macro_use]
pub mod macros;
pub mod dataset;
pub mod pool;
pub mod types;

pub use dataset::{SqlDataset, validate_identifier};
pub use pool::{ConnectionManager, ConnectionSummary, DbPool};
pub use types::{RowToRecord, TypeCategory, categorize_type};
