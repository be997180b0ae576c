//! Row-level failures and import results.

use serde::Serialize;

use super::dataset::Row;

/// Outcome of a completed import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    /// Records read from the file.
    pub lines_read: u64,
    /// `Dataset::count()` after the final flush.
    pub records_in_dataset: u64,
}

/// A row whose fallback insert failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: Row,
    pub message: String,
    /// Source chain of the insert error, one cause per line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl RowError {
    /// Capture an insert failure for `row`.
    pub fn new(row: Row, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            row,
            message: err.to_string(),
            trace: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }
}

/// Append-only collector of row failures for one import call.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ErrorLog {
    entries: Vec<RowError>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn push(&mut self, entry: RowError) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RowError] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RowError> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a ErrorLog {
    type Item = &'a RowError;
    type IntoIter = std::slice::Iter<'a, RowError>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
