//! Record serialization under an exclusive file lock.

use std::borrow::Borrow;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use fs2::FileExt;
use serde_json::Value as JsonValue;
use tracing::debug;

use super::encoding::Encoding;
use crate::error::{TransportError, TransportResult};

/// One exported record: field name to value, in column order.
pub type Record = serde_json::Map<String, JsonValue>;

/// Caller-supplied formatter producing a record's line (without the line separator).
pub type FormatFn = dyn Fn(&Record) -> String;

/// Writes records to a file while holding an exclusive advisory lock on it.
#[derive(Debug, Clone, Copy)]
pub struct LockedExporter<'a> {
    path: &'a Path,
    encoding: Encoding,
    data_separator: Option<&'a str>,
    line_separator: &'a str,
}

impl<'a> LockedExporter<'a> {
    pub fn new(
        path: &'a Path,
        encoding: Encoding,
        data_separator: Option<&'a str>,
        line_separator: &'a str,
    ) -> Self {
        Self {
            path,
            encoding,
            data_separator,
            line_separator,
        }
    }

    /// Write `records`, one per line, and return how many were written.
    ///
    /// Blocks until the lock is granted. The file is truncated only once the
    /// lock is held, unless `append` is set. A failure part way through leaves
    /// the lines already written in place.
    pub fn export<I>(&self, records: I, append: bool, format: Option<&FormatFn>) -> TransportResult<u64>
    where
        I: IntoIterator,
        I::Item: Borrow<Record>,
    {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .open(self.path)
            .map_err(|source| TransportError::Open {
                path: self.path.to_path_buf(),
                source,
            })?;

        let _lock = ExclusiveLock::acquire(&file, self.path)?;
        if !append {
            file.set_len(0)?;
        }

        let mut writer = BufWriter::new(&file);
        let mut count = 0u64;
        for record in records {
            let record = record.borrow();
            let mut line = match format {
                Some(format) => format(record),
                None => self.join_values(record),
            };
            line.push_str(self.line_separator);

            let bytes = self
                .encoding
                .encode(&line)
                .ok_or_else(|| TransportError::Unencodable {
                    record: count + 1,
                    encoding: self.encoding.to_string(),
                })?;
            writer.write_all(&bytes)?;
            count += 1;
        }
        writer.flush()?;

        debug!(path = %self.path.display(), records = count, append, "Export written");
        Ok(count)
    }

    fn join_values(&self, record: &Record) -> String {
        record
            .values()
            .map(value_text)
            .collect::<Vec<_>>()
            .join(self.data_separator.unwrap_or(""))
    }
}

fn value_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Holds an exclusive `flock` on a file until dropped.
struct ExclusiveLock<'a> {
    file: &'a File,
}

impl<'a> ExclusiveLock<'a> {
    fn acquire(file: &'a File, path: &Path) -> TransportResult<Self> {
        file.lock_exclusive().map_err(|source| TransportError::Lock {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { file })
    }
}

impl Drop for ExclusiveLock<'_> {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.file);
    }
}
