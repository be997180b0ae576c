//! Record extraction from a byte stream.
//!
//! Reading a record is split into two stages that share the reader's
//! position: `read_raw` pulls the record bytes, `validate_boundary` checks
//! whatever sits between this record and the next one. Delimited records end
//! at the separator so the boundary check is a no-op; fixed-width records in
//! strip mode must be followed by whitespace up to the separator.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{TransportError, TransportResult};

/// How records are delimited in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
    /// One record per line, terminated by the line separator.
    Delimited,
    /// Each record is exactly this many bytes.
    FixedWidth(usize),
}

/// Undecoded bytes of one record and its 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub line: u64,
    pub bytes: Vec<u8>,
}

/// Lazy, non-restartable record source bound to one open stream.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    mode: RecordMode,
    separator: Vec<u8>,
    strip: bool,
    line: u64,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    pub fn new(reader: R, mode: RecordMode, line_separator: &str, strip: bool) -> Self {
        Self {
            reader,
            mode,
            separator: line_separator.as_bytes().to_vec(),
            strip,
            line: 0,
        }
    }

    /// Number of records returned so far.
    pub fn records_read(&self) -> u64 {
        self.line
    }

    /// Next record, or `None` at end of stream.
    pub async fn next_record(&mut self) -> TransportResult<Option<RawRecord>> {
        let line = self.line + 1;
        let Some(bytes) = self.read_raw(line).await? else {
            return Ok(None);
        };
        self.validate_boundary(line).await?;
        self.line = line;
        Ok(Some(RawRecord { line, bytes }))
    }

    async fn read_raw(&mut self, line: u64) -> TransportResult<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        match self.mode {
            RecordMode::Delimited => {
                if self.read_through_separator(&mut buf).await? == 0 {
                    return Ok(None);
                }
                if buf.ends_with(&self.separator) {
                    buf.truncate(buf.len() - self.separator.len());
                }
                if self.strip {
                    let kept = buf.trim_ascii_end().len();
                    buf.truncate(kept);
                }
            }
            RecordMode::FixedWidth(size) => {
                (&mut self.reader)
                    .take(size as u64)
                    .read_to_end(&mut buf)
                    .await?;
                if buf.is_empty() {
                    return Ok(None);
                }
                if buf.len() < size {
                    return Err(TransportError::bad_format(
                        line,
                        format!("truncated record: expected {} bytes, got {}", size, buf.len()),
                    ));
                }
            }
        }
        Ok(Some(buf))
    }

    async fn validate_boundary(&mut self, line: u64) -> TransportResult<()> {
        if !(self.strip && matches!(self.mode, RecordMode::FixedWidth(_))) {
            return Ok(());
        }

        let mut trailer = Vec::new();
        self.read_through_separator(&mut trailer).await?;
        let gap = trailer.strip_suffix(self.separator.as_slice()).unwrap_or(&trailer[..]);
        if gap.iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(TransportError::bad_format(
                line,
                "unexpected data between fixed-width records",
            ))
        }
    }

    /// Append bytes up to and including the next separator (or end of stream).
    async fn read_through_separator(&mut self, buf: &mut Vec<u8>) -> TransportResult<usize> {
        let start = buf.len();
        let Some(&last) = self.separator.last() else {
            self.reader.read_to_end(buf).await?;
            return Ok(buf.len() - start);
        };
        loop {
            let n = self.reader.read_until(last, buf).await?;
            if n == 0 || buf[start..].ends_with(&self.separator) {
                break;
            }
        }
        Ok(buf.len() - start)
    }
}
