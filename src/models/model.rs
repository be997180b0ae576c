//! Model definitions held by the registry.

use serde::{Deserialize, Serialize};

/// A domain model bound to one table of a repository's adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDef {
    pub table: String,
    /// Columns used for imports and exports. Empty means "introspect the table".
    #[serde(default)]
    pub columns: Vec<String>,
}

impl ModelDef {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }
}
