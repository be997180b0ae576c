//! Integration tests for exclusive locking during export.

use std::fs::OpenOptions;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use db_transporter::error::TransportError;
use db_transporter::transporter::{Encoding, Record, TransportConfig, Transporter};
use fs2::FileExt;
use serde_json::json;
use tempfile::TempDir;

fn record(name: &str, n: i64) -> Record {
    let mut record = Record::new();
    record.insert("name".to_string(), json!(name));
    record.insert("n".to_string(), json!(n));
    record
}

#[test]
fn test_export_waits_for_concurrent_lock_holder() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shared.txt");
    std::fs::write(&path, "old contents\n").unwrap();

    let holder = OpenOptions::new().write(true).open(&path).unwrap();
    holder.lock_exclusive().unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let export_path = path.clone();
    let exporter = thread::spawn(move || {
        let transporter = Transporter::new(
            TransportConfig::builder(&export_path)
                .data_separator(",")
                .build()
                .unwrap(),
        );
        let written = transporter
            .export(&[record("a", 1), record("b", 2)], false)
            .unwrap();
        done_tx.send(written).unwrap();
    });

    // Still blocked: nothing written and the file not yet truncated.
    assert!(done_rx.recv_timeout(Duration::from_millis(300)).is_err());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "old contents\n");

    FileExt::unlock(&holder).unwrap();
    let written = done_rx.recv_timeout(Duration::from_secs(10)).unwrap();
    exporter.join().unwrap();

    assert_eq!(written, 2);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,1\nb,2\n");
}

#[test]
fn test_lock_released_after_success_and_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.txt");
    let transporter = Transporter::new(
        TransportConfig::builder(&path)
            .encoding(Encoding::Latin1)
            .build()
            .unwrap(),
    );

    transporter.export(&[record("x", 1)], false).unwrap();
    let other = OpenOptions::new().write(true).open(&path).unwrap();
    other.try_lock_exclusive().unwrap();
    FileExt::unlock(&other).unwrap();

    // Latin-1 covers code points 0-255 only.
    let err = transporter
        .export(&[record("ok", 1), record("\u{263A}", 2)], true)
        .unwrap_err();
    assert!(matches!(err, TransportError::Unencodable { record: 2, .. }));

    other.try_lock_exclusive().unwrap();
    FileExt::unlock(&other).unwrap();
}

#[tokio::test]
async fn test_export_from_async_context() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("async.txt");
    let transporter = Transporter::new(
        TransportConfig::builder(&path)
            .data_separator("\t")
            .build()
            .unwrap(),
    );

    let records = vec![record("tab", 7)];
    let written = tokio::task::spawn_blocking(move || transporter.export(&records, false))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(written, 1);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "tab\t7\n");
}
