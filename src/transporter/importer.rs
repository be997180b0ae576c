//! Buffered bulk writes with row-level fallback.

use tokio::io::AsyncBufRead;
use tracing::{debug, info, warn};

use super::dataset::{Dataset, Row};
use super::error_log::{ErrorLog, ImportResult, RowError};
use super::parser::RecordParser;
use super::reader::LineReader;
use crate::error::{TransportError, TransportResult};

/// Accumulates rows and writes them to a dataset in batches.
///
/// A batch is written with `Dataset::import` once `buffer_size` rows are
/// pending. If that fails, each row of the batch is retried with
/// `Dataset::insert`; rows that still fail are recorded in the error log and
/// skipped. The buffer is empty after every flush, whatever the outcome.
pub struct BufferedImporter<'a, D: Dataset> {
    dataset: &'a D,
    columns: &'a [String],
    buffer: Vec<Row>,
    buffer_size: usize,
    errors: &'a mut ErrorLog,
    lines: u64,
}

impl<'a, D: Dataset> BufferedImporter<'a, D> {
    pub fn new(
        dataset: &'a D,
        columns: &'a [String],
        buffer_size: usize,
        errors: &'a mut ErrorLog,
    ) -> Self {
        Self {
            dataset,
            columns,
            buffer: Vec::with_capacity(buffer_size),
            buffer_size,
            errors,
            lines: 0,
        }
    }

    /// Rows accepted so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Rows waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer a row, flushing when the buffer is full.
    pub async fn push(&mut self, row: Row) {
        self.buffer.push(row);
        self.lines += 1;
        if self.buffer.len() >= self.buffer_size {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        match self.dataset.import(self.columns, &self.buffer).await {
            Ok(()) => {
                debug!(rows = self.buffer.len(), lines = self.lines, "Bulk import flushed");
            }
            Err(err) => {
                warn!(
                    rows = self.buffer.len(),
                    lines = self.lines,
                    error = %err,
                    "Bulk import failed, inserting rows one by one"
                );
                self.insert_by_row().await;
            }
        }
        self.buffer.clear();
    }

    async fn insert_by_row(&mut self) {
        for row in &self.buffer {
            if let Err(err) = self.dataset.insert(self.columns, row).await {
                warn!(error = %err, row = ?row, "Row insert failed");
                self.errors.push(RowError::new(row.clone(), &err));
            }
        }
    }

    /// Flush whatever is left, then read the dataset count and check it if asked.
    pub async fn finish(mut self, check_count: bool) -> TransportResult<ImportResult> {
        self.flush().await;

        let dataset_count = self
            .dataset
            .count()
            .await
            .map_err(|err| TransportError::Dataset {
                operation: "count",
                source: Box::new(err),
            })?;

        if check_count && dataset_count != self.lines {
            return Err(TransportError::RecordCountMismatch {
                lines_read: self.lines,
                dataset_count,
            });
        }

        info!(
            lines_read = self.lines,
            records_in_dataset = dataset_count,
            failed_rows = self.errors.len(),
            "Import complete"
        );

        Ok(ImportResult {
            lines_read: self.lines,
            records_in_dataset: dataset_count,
        })
    }
}

/// Pump every record from `reader` through `parser` into `importer`.
///
/// A structural error stops the import immediately; rows buffered since the
/// last flush are dropped without being written.
pub async fn run_import<R, D>(
    reader: &mut LineReader<R>,
    parser: &RecordParser,
    columns: &[String],
    mut importer: BufferedImporter<'_, D>,
    check_count: bool,
) -> TransportResult<ImportResult>
where
    R: AsyncBufRead + Unpin,
    D: Dataset,
{
    while let Some(raw) = reader.next_record().await? {
        let row = parser.parse(&raw, columns)?;
        importer.push(row).await;
    }
    importer.finish(check_count).await
}
