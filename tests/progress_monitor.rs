//! End-to-end tests of backup progress monitoring over a file-backed
//! store: a job thread publishes records through a ProgressWriter while
//! the monitor polls the same namespace, exactly as a real backup and its
//! watcher share a target namespace.

use nslock::error::NslockError;
use nslock::monitor::{
    FileProgressStore, JobStatus, JobTask, ProgressStore, ProgressWriter, monitor_job,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(25);

fn create_backend(namespaces: &[&str]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    for ns in namespaces {
        std::fs::create_dir(root.join(ns)).unwrap();
    }
    (dir, root)
}

#[test]
fn poll_before_any_backup_returns_none() {
    let (_dir, root) = create_backend(&["monitortest"]);
    let store = FileProgressStore::new(root);
    assert!(store.poll("monitortest").unwrap().is_none());
}

#[test]
fn backup_with_monitoring_end_to_end() {
    let (_dir, root) = create_backend(&["monitortest"]);
    let job_root = root.clone();

    let task = JobTask::spawn(move || {
        let store: Arc<dyn ProgressStore> = Arc::new(FileProgressStore::new(job_root));
        let mut writer = ProgressWriter::new(store, "monitortest", 4096);
        writer.set_snapshot_range(Some("B"), Some("E"));
        writer.start(Duration::from_millis(20))?;

        // Four chunks of examination, shipping most of what was seen.
        for _ in 0..4 {
            thread::sleep(Duration::from_millis(60));
            writer.add_seen(1024);
            writer.add_kept(512);
            writer.add_sent_to_backend(512);
        }

        writer.finish()?;
        Ok(4096u64)
    })
    .unwrap();

    let store = FileProgressStore::new(root.clone());
    let report = monitor_job(task, &store, "monitortest", POLL).unwrap();
    assert_eq!(report.output, 4096);

    // Monotonic progress across every retained pair.
    for pair in report.samples.windows(2) {
        assert!(pair[1].seen > pair[0].seen);
        assert!(pair[1].sent_to_backend >= pair[0].sent_to_backend);
        assert_eq!(pair[1].total_size, pair[0].total_size);
    }

    // The run ends on a well-formed terminal record.
    let last = report.samples.last().unwrap();
    assert_eq!(last.status, JobStatus::Finished);
    assert_eq!(last.seen, last.total_size);
    assert_eq!(last.still_to_be_examined, 0);
    assert!(last.sent_to_backend <= last.total_size);
    assert_eq!(last.start_snapshot.as_deref(), Some("B"));
    assert_eq!(last.end_snapshot.as_deref(), Some("E"));

    // The record on the backend agrees with what the monitor saw last.
    let info = store.poll("monitortest").unwrap().unwrap();
    assert_eq!(info.seen, info.total_size);
    assert_eq!(info.still_to_be_examined, 0);
    assert!(info.sent_to_backend <= info.total_size);
}

#[test]
fn job_without_terminal_record_is_a_protocol_violation() {
    let (_dir, root) = create_backend(&["monitortest"]);
    let job_root = root.clone();

    let task = JobTask::spawn(move || {
        let store: Arc<dyn ProgressStore> = Arc::new(FileProgressStore::new(job_root));
        let mut writer = ProgressWriter::new(store, "monitortest", 1024);
        writer.start(Duration::from_millis(20))?;
        writer.add_seen(1024);
        thread::sleep(Duration::from_millis(80));
        // The job "succeeds" without ever publishing a finished record.
        Ok(())
    })
    .unwrap();

    let store = FileProgressStore::new(root);
    let result = monitor_job(task, &store, "monitortest", POLL);
    match result {
        Err(NslockError::ProtocolViolation(msg)) => {
            assert!(msg.contains("running"), "message: {}", msg)
        }
        other => panic!(
            "expected ProtocolViolation, got {:?}",
            other.map(|r| r.samples)
        ),
    }
}

#[test]
fn failed_backup_surfaces_its_own_error() {
    let (_dir, root) = create_backend(&["monitortest"]);
    let job_root = root.clone();

    let task: JobTask<()> = JobTask::spawn(move || {
        let store: Arc<dyn ProgressStore> = Arc::new(FileProgressStore::new(job_root));
        let mut writer = ProgressWriter::new(store, "monitortest", 2048);
        writer.start(Duration::from_millis(20))?;
        writer.add_seen(512);
        thread::sleep(Duration::from_millis(60));
        Err(NslockError::UserError(
            "backup failed: backend connection lost".to_string(),
        ))
    })
    .unwrap();

    let store = FileProgressStore::new(root);
    let result = monitor_job(task, &store, "monitortest", POLL);
    match result {
        Err(NslockError::UserError(msg)) => {
            assert!(msg.contains("backend connection lost"), "message: {}", msg)
        }
        other => panic!(
            "expected the job's own error, got {:?}",
            other.map(|_| ())
        ),
    }
}

#[test]
fn publishing_into_a_missing_namespace_fails() {
    let (_dir, root) = create_backend(&[]);
    let store = FileProgressStore::new(root);

    let sample = nslock::monitor::ProgressSample {
        total_size: 10,
        seen: 0,
        sent_to_backend: 0,
        still_to_be_examined: 10,
        status: JobStatus::Running,
        kept: 0,
        pending: 10,
        start_snapshot: None,
        end_snapshot: None,
        start_date: None,
        update_date: None,
        runtime_in_seconds: None,
    };
    assert!(matches!(
        store.publish("nowhere", &sample),
        Err(NslockError::UserError(_))
    ));
}
