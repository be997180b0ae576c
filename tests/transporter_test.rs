//! Integration tests for file import/export against an in-memory dataset.
//!
//! Covers batching, the row-level fallback, record count checks, format errors
//! and export/import round trips.

use std::future::{Future, ready};
use std::sync::Mutex;

use db_transporter::error::TransportError;
use db_transporter::transporter::{
    Dataset, Record, RecordParser, Row, TransportConfig, Transporter,
};
use serde_json::json;
use tempfile::TempDir;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct MemoryError(String);

/// Dataset keeping rows in memory and recording every bulk import.
#[derive(Default)]
struct MemoryDataset {
    rows: Mutex<Vec<Row>>,
    batches: Mutex<Vec<Vec<Row>>>,
    fail_bulk: bool,
    /// Rows whose first value matches are rejected by both write paths.
    reject: Option<&'static str>,
}

impl MemoryDataset {
    fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    fn rejects(&self, row: &Row) -> bool {
        self.reject
            .is_some_and(|value| row.first().map(String::as_str) == Some(value))
    }

    fn rows(&self) -> Vec<Row> {
        self.rows.lock().unwrap().clone()
    }

    fn batches(&self) -> Vec<Vec<Row>> {
        self.batches.lock().unwrap().clone()
    }
}

impl Dataset for MemoryDataset {
    type Error = MemoryError;

    fn count(&self) -> impl Future<Output = Result<u64, MemoryError>> + Send {
        ready(Ok(self.rows.lock().unwrap().len() as u64))
    }

    fn import(
        &self,
        _columns: &[String],
        rows: &[Row],
    ) -> impl Future<Output = Result<(), MemoryError>> + Send {
        self.batches.lock().unwrap().push(rows.to_vec());
        let result = if self.fail_bulk {
            Err(MemoryError("bulk writes disabled".to_string()))
        } else if rows.iter().any(|row| self.rejects(row)) {
            Err(MemoryError("batch contains a rejected row".to_string()))
        } else {
            self.rows.lock().unwrap().extend_from_slice(rows);
            Ok(())
        };
        ready(result)
    }

    fn insert(
        &self,
        _columns: &[String],
        row: &Row,
    ) -> impl Future<Output = Result<(), MemoryError>> + Send {
        let result = if self.rejects(row) {
            Err(MemoryError(format!("rejected value {}", row[0])))
        } else {
            self.rows.lock().unwrap().push(row.clone());
            Ok(())
        };
        ready(result)
    }
}

fn row(values: &[&str]) -> Row {
    values.iter().map(|v| v.to_string()).collect()
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn write_input(dir: &TempDir, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join("input.txt");
    std::fs::write(&path, contents).unwrap();
    path
}

fn csv_transporter(path: &std::path::Path, buffer_size: usize) -> Transporter {
    Transporter::new(
        TransportConfig::builder(path)
            .data_separator(",")
            .buffer_size(buffer_size)
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_small_file_single_bulk_import() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"1,2\n3,4\n");
    let dataset = MemoryDataset::default();
    let mut transporter = csv_transporter(&path, 10);

    let result = transporter
        .import(&dataset, &columns(&["x", "y"]))
        .await
        .unwrap();

    assert_eq!((result.lines_read, result.records_in_dataset), (2, 2));
    assert_eq!(
        dataset.batches(),
        vec![vec![row(&["1", "2"]), row(&["3", "4"])]]
    );
    assert!(transporter.errors().is_empty());
}

#[tokio::test]
async fn test_buffer_size_two_five_rows_three_imports() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"a,1\nb,2\nc,3\nd,4\ne,5\n");
    let dataset = MemoryDataset::default();
    let mut transporter = csv_transporter(&path, 2);

    let result = transporter
        .import(&dataset, &columns(&["name", "n"]))
        .await
        .unwrap();

    assert_eq!((result.lines_read, result.records_in_dataset), (5, 5));
    let sizes: Vec<usize> = dataset.batches().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[tokio::test]
async fn test_exact_multiple_skips_empty_final_flush() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"a,1\nb,2\nc,3\nd,4\n");
    let dataset = MemoryDataset::default();
    let mut transporter = csv_transporter(&path, 2);

    transporter
        .import(&dataset, &columns(&["name", "n"]))
        .await
        .unwrap();
    assert_eq!(dataset.batches().len(), 2);
    assert!(dataset.batches().iter().all(|batch| !batch.is_empty()));
}

#[tokio::test]
async fn test_empty_file_issues_no_bulk_import() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"");
    let dataset = MemoryDataset::default();
    let mut transporter = csv_transporter(&path, 2);

    let result = transporter
        .import(&dataset, &columns(&["name", "n"]))
        .await
        .unwrap();
    assert_eq!((result.lines_read, result.records_in_dataset), (0, 0));
    assert!(dataset.batches().is_empty());
}

#[tokio::test]
async fn test_all_bulk_imports_fail_fallback_per_row() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"ok,1\nbad,2\nok,3\nbad,4\nok,5\n");
    let dataset = MemoryDataset {
        fail_bulk: true,
        reject: Some("bad"),
        ..Default::default()
    };
    let mut transporter = csv_transporter(&path, 2);

    let result = transporter
        .import(&dataset, &columns(&["status", "n"]))
        .await
        .unwrap();

    assert_eq!(result.lines_read, 5);
    assert_eq!(result.records_in_dataset, 3);
    assert_eq!(dataset.batches().len(), 3);

    let errors = transporter.errors();
    assert_eq!(errors.len(), 2);
    let failed: Vec<&Row> = errors.iter().map(|e| &e.row).collect();
    assert_eq!(failed, vec![&row(&["bad", "2"]), &row(&["bad", "4"])]);
    assert_eq!(errors.entries()[0].message, "rejected value bad");
}

#[tokio::test]
async fn test_rejected_batch_keeps_good_rows() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"ok,1\nbad,2\nok,3\n");
    let dataset = MemoryDataset {
        reject: Some("bad"),
        ..Default::default()
    };
    let mut transporter = csv_transporter(&path, 10);

    let result = transporter
        .import(&dataset, &columns(&["status", "n"]))
        .await
        .unwrap();

    assert_eq!((result.lines_read, result.records_in_dataset), (3, 2));
    assert_eq!(dataset.rows(), vec![row(&["ok", "1"]), row(&["ok", "3"])]);
    assert_eq!(transporter.errors().len(), 1);
}

#[tokio::test]
async fn test_check_count_mismatch() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"1,2\n3,4\n");
    let dataset = MemoryDataset::with_rows(vec![row(&["0", "0"])]);
    let mut transporter = Transporter::new(
        TransportConfig::builder(&path)
            .data_separator(",")
            .check_count(true)
            .build()
            .unwrap(),
    );

    let err = transporter
        .import(&dataset, &columns(&["x", "y"]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransportError::RecordCountMismatch {
            lines_read: 2,
            dataset_count: 3
        }
    ));
    // Rows are written before the count is checked.
    assert_eq!(dataset.rows().len(), 3);
}

#[tokio::test]
async fn test_without_check_count_mismatch_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"1,2\n3,4\n");
    let dataset = MemoryDataset::with_rows(vec![row(&["0", "0"])]);
    let mut transporter = csv_transporter(&path, 10);

    let result = transporter
        .import(&dataset, &columns(&["x", "y"]))
        .await
        .unwrap();
    assert_eq!((result.lines_read, result.records_in_dataset), (2, 3));
}

#[tokio::test]
async fn test_column_mismatch_names_line_and_stops() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"1,2\n3,4\n5,6\n7\n8,9\n");
    let dataset = MemoryDataset::default();
    let mut transporter = csv_transporter(&path, 2);

    let err = transporter
        .import(&dataset, &columns(&["x", "y"]))
        .await
        .unwrap_err();

    match err {
        TransportError::BadFormat { line, reason } => {
            assert_eq!(line, 4);
            assert!(reason.contains("columns number (2) does not match with values (1)"));
        }
        other => panic!("expected BadFormat, got {other:?}"),
    }
    // The first batch was flushed; row 3 was still buffered.
    assert_eq!(dataset.rows(), vec![row(&["1", "2"]), row(&["3", "4"])]);
}

#[tokio::test]
async fn test_whitespace_split_without_data_separator() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"alice   30\n  bob\t41  \n");
    let dataset = MemoryDataset::default();
    let mut transporter = Transporter::new(TransportConfig::builder(&path).build().unwrap());

    transporter
        .import(&dataset, &columns(&["name", "age"]))
        .await
        .unwrap();
    assert_eq!(
        dataset.rows(),
        vec![row(&["alice", "30"]), row(&["bob", "41"])]
    );
}

#[tokio::test]
async fn test_fixed_width_import_with_field_widths() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"0001alice \r\n0002bob   \r\n");
    let dataset = MemoryDataset::default();
    let mut transporter = Transporter::new(
        TransportConfig::builder(&path)
            .line_size(10)
            .line_separator("\r\n")
            .strip(true)
            .build()
            .unwrap(),
    );
    let parser = RecordParser::fixed_fields(transporter.config().encoding(), vec![4, 6]);

    let result = transporter
        .import_with(&dataset, &columns(&["id", "name"]), &parser)
        .await
        .unwrap();

    assert_eq!((result.lines_read, result.records_in_dataset), (2, 2));
    assert_eq!(
        dataset.rows(),
        vec![row(&["0001", "alice"]), row(&["0002", "bob"])]
    );
}

#[tokio::test]
async fn test_fixed_width_desync_is_bad_format() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"0001alice \n0002bob   xx\n0003carol \n");
    let dataset = MemoryDataset::default();
    let mut transporter = Transporter::new(
        TransportConfig::builder(&path)
            .line_size(10)
            .strip(true)
            .build()
            .unwrap(),
    );
    let parser = RecordParser::fixed_fields(transporter.config().encoding(), vec![4, 6]);

    let err = transporter
        .import_with(&dataset, &columns(&["id", "name"]), &parser)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::BadFormat { line: 2, .. }));
}

#[tokio::test]
async fn test_custom_parse_function() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"k1=v1;k2=v2\n");
    let dataset = MemoryDataset::default();
    let mut transporter = Transporter::new(TransportConfig::builder(&path).build().unwrap());
    let parser = RecordParser::with_fn(transporter.config().encoding(), |line: &str| {
        line.split(';')
            .filter_map(|pair| pair.split_once('=').map(|(_, v)| v.to_string()))
            .collect()
    });

    transporter
        .import_with(&dataset, &columns(&["a", "b"]), &parser)
        .await
        .unwrap();
    assert_eq!(dataset.rows(), vec![row(&["v1", "v2"])]);
}

#[tokio::test]
async fn test_missing_file_is_open_error() {
    let dir = TempDir::new().unwrap();
    let dataset = MemoryDataset::default();
    let mut transporter = csv_transporter(&dir.path().join("missing.txt"), 10);

    let err = transporter
        .import(&dataset, &columns(&["x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Open { .. }));
}

#[tokio::test]
async fn test_errors_reset_between_imports() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, b"bad,1\n");
    let dataset = MemoryDataset {
        reject: Some("bad"),
        ..Default::default()
    };
    let mut transporter = csv_transporter(&path, 10);

    transporter.import(&dataset, &columns(&["s", "n"])).await.unwrap();
    assert_eq!(transporter.errors().len(), 1);

    std::fs::write(&path, b"ok,1\n").unwrap();
    transporter.import(&dataset, &columns(&["s", "n"])).await.unwrap();
    assert!(transporter.errors().is_empty());
}

fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::test]
async fn test_export_then_import_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("round_trip.txt");
    let transporter = Transporter::new(
        TransportConfig::builder(&path)
            .data_separator("|")
            .build()
            .unwrap(),
    );

    let records = vec![
        record(&[("id", json!(1)), ("name", json!("alice")), ("score", json!(9.5))]),
        record(&[("id", json!(2)), ("name", json!("bob")), ("score", json!(null))]),
        record(&[("id", json!(3)), ("name", json!("carol")), ("score", json!(7))]),
    ];
    let written = transporter.export(&records, false).unwrap();
    assert_eq!(written, 3);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "1|alice|9.5\n2|bob|\n3|carol|7\n"
    );

    let dataset = MemoryDataset::default();
    let mut transporter = transporter;
    let result = transporter
        .import(&dataset, &columns(&["id", "name", "score"]))
        .await
        .unwrap();
    assert_eq!((result.lines_read, result.records_in_dataset), (3, 3));
    assert_eq!(dataset.rows()[1], row(&["2", "bob", ""]));
}

#[test]
fn test_export_one_appends() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.txt");
    let transporter = Transporter::new(
        TransportConfig::builder(&path)
            .data_separator(",")
            .line_separator("\r\n")
            .build()
            .unwrap(),
    );

    transporter
        .export_one(&record(&[("a", json!("x")), ("b", json!(true))]), false)
        .unwrap();
    transporter
        .export_one(&record(&[("a", json!("y")), ("b", json!(false))]), true)
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "x,true\r\ny,false\r\n"
    );
}

#[tokio::test]
async fn test_default_encoding_imports_utf8_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = write_input(&dir, "caf\u{e9},1\n\u{65e5}\u{672c},2\n".as_bytes());
    let dataset = MemoryDataset::default();
    let mut transporter = csv_transporter(&path, 10);

    transporter
        .import(&dataset, &columns(&["name", "n"]))
        .await
        .unwrap();

    assert_eq!(
        dataset.rows(),
        vec![row(&["caf\u{e9}", "1"]), row(&["\u{65e5}\u{672c}", "2"])]
    );
}

#[test]
fn test_default_encoding_exports_utf8_bytes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wide.txt");
    let transporter = csv_transporter(&path, 10);

    transporter
        .export_one(
            &record(&[("name", json!("\u{65e5}\u{672c}")), ("n", json!(1))]),
            false,
        )
        .unwrap();
    transporter
        .export_one(&record(&[("name", json!("caf\u{e9}")), ("n", json!(2))]), true)
        .unwrap();

    assert_eq!(
        std::fs::read(&path).unwrap(),
        "\u{65e5}\u{672c},1\ncaf\u{e9},2\n".as_bytes()
    );
}
