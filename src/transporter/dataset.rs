//! The store a transporter imports into.

use std::future::Future;

/// One parsed row of field values, in column order.
pub type Row = Vec<String>;

/// A queryable store supporting bulk and single-row writes.
///
/// Nothing here promises atomicity: a failed `import` may or may not have
/// written some of its rows. Implementations that want the row-level fallback
/// to be duplicate-free should make `import` all-or-nothing (as
/// [`SqlDataset`](crate::db::SqlDataset) does with a transaction) or make
/// `insert` idempotent.
pub trait Dataset {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Number of records currently in the dataset.
    fn count(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send;

    /// Write many rows in one round trip.
    ///
    /// The importer never issues an empty `import`: a final flush with nothing
    /// buffered is skipped.
    fn import(
        &self,
        columns: &[String],
        rows: &[Row],
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Write a single row.
    fn insert(
        &self,
        columns: &[String],
        row: &Row,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
