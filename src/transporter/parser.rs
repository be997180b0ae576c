//! Raw record to field values.

use std::fmt;

use super::dataset::Row;
use super::encoding::Encoding;
use super::reader::RawRecord;
use crate::error::{TransportError, TransportResult};

/// Caller-supplied parse function: decoded record text in, field values out.
pub type ParseFn = dyn Fn(&str) -> Row + Send + Sync;

enum Strategy {
    Separator(String),
    Whitespace,
    Widths(Vec<usize>),
    Custom(Box<ParseFn>),
}

/// Decodes a raw record and splits it into exactly one value per column.
pub struct RecordParser {
    encoding: Encoding,
    strategy: Strategy,
}

impl RecordParser {
    /// Split on `data_separator`, or on runs of whitespace when there is none.
    pub fn split(encoding: Encoding, data_separator: Option<&str>) -> Self {
        let strategy = match data_separator {
            Some(sep) => Strategy::Separator(sep.to_string()),
            None => Strategy::Whitespace,
        };
        Self { encoding, strategy }
    }

    /// Slice each record into fields of the given character widths, trimming padding.
    pub fn fixed_fields(encoding: Encoding, widths: Vec<usize>) -> Self {
        Self {
            encoding,
            strategy: Strategy::Widths(widths),
        }
    }

    /// Delegate splitting to `parse`.
    pub fn with_fn<F>(encoding: Encoding, parse: F) -> Self
    where
        F: Fn(&str) -> Row + Send + Sync + 'static,
    {
        Self {
            encoding,
            strategy: Strategy::Custom(Box::new(parse)),
        }
    }

    /// Decode and split `raw`, failing with `BadFormat` unless it yields one value per column.
    pub fn parse(&self, raw: &RawRecord, columns: &[String]) -> TransportResult<Row> {
        let text = self.encoding.decode(&raw.bytes).ok_or_else(|| {
            TransportError::bad_format(raw.line, format!("invalid {} data", self.encoding))
        })?;

        let values = match &self.strategy {
            Strategy::Separator(sep) => text.split(sep.as_str()).map(String::from).collect(),
            Strategy::Whitespace => text.split_whitespace().map(String::from).collect(),
            Strategy::Widths(widths) => slice_fields(&text, widths),
            Strategy::Custom(parse) => parse(text.as_ref()),
        };

        if values.len() != columns.len() {
            return Err(TransportError::bad_format(
                raw.line,
                format!(
                    "columns number ({}) does not match with values ({})",
                    columns.len(),
                    values.len()
                ),
            ));
        }
        Ok(values)
    }
}

impl fmt::Debug for RecordParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match &self.strategy {
            Strategy::Separator(sep) => format!("Separator({:?})", sep),
            Strategy::Whitespace => "Whitespace".to_string(),
            Strategy::Widths(widths) => format!("Widths({:?})", widths),
            Strategy::Custom(_) => "Custom".to_string(),
        };
        f.debug_struct("RecordParser")
            .field("encoding", &self.encoding)
            .field("strategy", &strategy)
            .finish()
    }
}

fn slice_fields(text: &str, widths: &[usize]) -> Row {
    let mut chars = text.chars();
    widths
        .iter()
        .map(|&width| {
            let field: String = chars.by_ref().take(width).collect();
            field.trim().to_string()
        })
        .collect()
}
