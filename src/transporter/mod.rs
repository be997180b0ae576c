//! Bulk transfer between flat files and datasets.
//!
//! A [`Transporter`] is bound to one file and one immutable
//! [`TransportConfig`]. Imports stream the file record by record
//! ([`LineReader`]), split each record into values ([`RecordParser`]) and hand
//! the rows to a [`BufferedImporter`], which writes them to a [`Dataset`] in
//! batches of `buffer_size`. Exports serialize records to the file under an
//! exclusive lock ([`LockedExporter`]).
//!
//! Failure handling:
//! - a wrong field count or a desynchronized fixed-width file aborts the import
//! - a failed batch is retried row by row; rows that still fail are collected
//!   in the [`ErrorLog`] and the import goes on
//! - with `check_count`, a final line/record count mismatch fails the import

pub mod dataset;
pub mod encoding;
pub mod error_log;
pub mod exporter;
pub mod importer;
pub mod parser;
pub mod reader;

pub use dataset::{Dataset, Row};
pub use encoding::Encoding;
pub use error_log::{ErrorLog, ImportResult, RowError};
pub use exporter::{FormatFn, LockedExporter, Record};
pub use importer::BufferedImporter;
pub use parser::{ParseFn, RecordParser};
pub use reader::{LineReader, RawRecord, RecordMode};

use std::borrow::Borrow;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufRead, BufReader};
use tracing::{info, warn};

use crate::error::{TransportError, TransportResult};

pub const DEFAULT_BUFFER_SIZE: usize = 2048;
pub const DEFAULT_LINE_SEPARATOR: &str = "\n";

/// Immutable settings for one transporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    filename: PathBuf,
    buffer_size: usize,
    encoding: Encoding,
    line_separator: String,
    data_separator: Option<String>,
    line_size: Option<usize>,
    strip: bool,
    check_count: bool,
}

impl TransportConfig {
    /// Start building a configuration for `filename` with every option at its default.
    pub fn builder(filename: impl Into<PathBuf>) -> TransportConfigBuilder {
        TransportConfigBuilder {
            config: Self {
                filename: filename.into(),
                buffer_size: DEFAULT_BUFFER_SIZE,
                encoding: Encoding::default(),
                line_separator: DEFAULT_LINE_SEPARATOR.to_string(),
                data_separator: None,
                line_size: None,
                strip: false,
                check_count: false,
            },
        }
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn line_separator(&self) -> &str {
        &self.line_separator
    }

    pub fn data_separator(&self) -> Option<&str> {
        self.data_separator.as_deref()
    }

    pub fn line_size(&self) -> Option<usize> {
        self.line_size
    }

    pub fn strip(&self) -> bool {
        self.strip
    }

    pub fn check_count(&self) -> bool {
        self.check_count
    }

    /// Fixed-width when a line size is configured, delimited otherwise.
    pub fn record_mode(&self) -> RecordMode {
        match self.line_size {
            Some(size) => RecordMode::FixedWidth(size),
            None => RecordMode::Delimited,
        }
    }
}

/// Builder for [`TransportConfig`]; `build` validates the options.
#[derive(Debug, Clone)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Rows per bulk write.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size;
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    pub fn line_separator(mut self, separator: impl Into<String>) -> Self {
        self.config.line_separator = separator.into();
        self
    }

    pub fn data_separator(mut self, separator: impl Into<String>) -> Self {
        self.config.data_separator = Some(separator.into());
        self
    }

    /// Record length in bytes; switches to fixed-width mode.
    pub fn line_size(mut self, line_size: usize) -> Self {
        self.config.line_size = Some(line_size);
        self
    }

    pub fn strip(mut self, strip: bool) -> Self {
        self.config.strip = strip;
        self
    }

    pub fn check_count(mut self, check_count: bool) -> Self {
        self.config.check_count = check_count;
        self
    }

    pub fn build(self) -> TransportResult<TransportConfig> {
        let config = self.config;
        if config.buffer_size == 0 {
            return Err(TransportError::invalid_config(
                "buffer_size must be greater than 0",
            ));
        }
        if config.line_size == Some(0) {
            return Err(TransportError::invalid_config(
                "line_size must be greater than 0",
            ));
        }
        if config.line_separator.is_empty() {
            return Err(TransportError::invalid_config(
                "line_separator cannot be empty",
            ));
        }
        if config.data_separator.as_deref() == Some("") {
            return Err(TransportError::invalid_config(
                "data_separator cannot be empty",
            ));
        }
        Ok(config)
    }
}

/// Imports a flat file into datasets and exports records back to it.
#[derive(Debug)]
pub struct Transporter {
    config: TransportConfig,
    errors: ErrorLog,
}

impl Transporter {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            errors: ErrorLog::new(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Row failures of the last import.
    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    /// Whether the configured file exists.
    pub fn exists(&self) -> bool {
        self.config.filename.exists()
    }

    /// Parser used when the caller does not supply one.
    pub fn default_parser(&self) -> RecordParser {
        RecordParser::split(self.config.encoding, self.config.data_separator())
    }

    /// Import the file into `dataset`, splitting records on the data separator.
    pub async fn import<D: Dataset>(
        &mut self,
        dataset: &D,
        columns: &[String],
    ) -> TransportResult<ImportResult> {
        let parser = self.default_parser();
        self.import_with(dataset, columns, &parser).await
    }

    /// Import the file into `dataset` using `parser` to split records.
    pub async fn import_with<D: Dataset>(
        &mut self,
        dataset: &D,
        columns: &[String],
        parser: &RecordParser,
    ) -> TransportResult<ImportResult> {
        self.errors.clear();
        let file = tokio::fs::File::open(&self.config.filename)
            .await
            .map_err(|source| TransportError::Open {
                path: self.config.filename.clone(),
                source,
            })?;
        self.import_from(BufReader::new(file), dataset, columns, parser)
            .await
    }

    /// Import from an already open stream instead of the configured file.
    pub async fn import_from<R, D>(
        &mut self,
        reader: R,
        dataset: &D,
        columns: &[String],
        parser: &RecordParser,
    ) -> TransportResult<ImportResult>
    where
        R: AsyncBufRead + Unpin,
        D: Dataset,
    {
        self.errors.clear();
        info!(
            file = %self.config.filename.display(),
            columns = columns.len(),
            buffer_size = self.config.buffer_size,
            mode = ?self.config.record_mode(),
            "Starting import"
        );

        let mut lines = LineReader::new(
            reader,
            self.config.record_mode(),
            &self.config.line_separator,
            self.config.strip,
        );
        let importer =
            BufferedImporter::new(dataset, columns, self.config.buffer_size, &mut self.errors);
        let result =
            importer::run_import(&mut lines, parser, columns, importer, self.config.check_count)
                .await;
        if let Err(err) = &result {
            if err.is_structural() {
                warn!(
                    file = %self.config.filename.display(),
                    records_read = lines.records_read(),
                    error = %err,
                    "Import aborted on malformed input"
                );
            }
        }
        result
    }

    fn exporter(&self) -> LockedExporter<'_> {
        LockedExporter::new(
            &self.config.filename,
            self.config.encoding,
            self.config.data_separator(),
            &self.config.line_separator,
        )
    }

    /// Write `records` to the file, joining values with the data separator.
    pub fn export<I>(&self, records: I, append: bool) -> TransportResult<u64>
    where
        I: IntoIterator,
        I::Item: Borrow<Record>,
    {
        self.exporter().export(records, append, None)
    }

    /// Write `records` to the file, one `format` line each.
    pub fn export_with<I>(&self, records: I, append: bool, format: &FormatFn) -> TransportResult<u64>
    where
        I: IntoIterator,
        I::Item: Borrow<Record>,
    {
        self.exporter().export(records, append, Some(format))
    }

    /// Write a single record.
    pub fn export_one(&self, record: &Record, append: bool) -> TransportResult<u64> {
        self.export(std::iter::once(record), append)
    }
}
