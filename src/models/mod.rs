//! Data models for the database transporter.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod model;

// Re-export commonly used types
pub use connection::{AdapterInfo, ConnectionConfig, ConnectionConfigError, DatabaseType};
pub use model::ModelDef;
