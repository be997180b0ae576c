//! db-transporter library
//!
//! Bulk import of flat files (delimited or fixed-width) into SQL tables and export
//! of tables back to flat files, over named SQLite, PostgreSQL and MySQL adapters.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod registry;
pub mod transporter;

pub use config::Config;
pub use db::{ConnectionManager, SqlDataset};
pub use error::{DbError, RegistryError, TransportError};
pub use registry::ModelRegistry;
pub use transporter::{Dataset, TransportConfig, Transporter};
