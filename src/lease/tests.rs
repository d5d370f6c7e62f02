//! Tests for the lease subsystem.
//!
//! The process-level protocol (handshake, signals, sweep) is exercised by
//! the integration suites; these tests cover the registry bookkeeping and
//! the store/service protocol in-process with sub-second sessions.

use super::record::LeaseRecord;
use super::registry::LockRegistry;
use super::service::{AcquireOutcome, HEARTBEAT_MISSES_BEFORE_STEAL, LeaseService};
use super::store::{FileLeaseStore, LeaseStore};
use crate::error::NslockError;
use crate::test_support::create_test_backend;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SESSION: Duration = Duration::from_millis(50);

fn file_store(root: &std::path::Path, ns: &str) -> FileLeaseStore {
    FileLeaseStore::new(root, ns).unwrap()
}

fn spawn_sleeper() -> std::process::Child {
    Command::new("sleep")
        .arg("60")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn sleep")
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn registry_register_and_deregister() {
    let registry = LockRegistry::new();
    assert!(registry.is_empty());

    let child = spawn_sleeper();
    let handle = registry.register(child, "ns1", Duration::from_secs(1));
    assert_eq!(registry.len(), 1);
    assert_eq!(handle.namespace(), "ns1");
    assert_eq!(handle.session_timeout(), Duration::from_secs(1));

    let holder = registry.deregister(handle.id()).unwrap();
    assert_eq!(holder.namespace, "ns1");
    assert!(registry.is_empty());

    let mut child = holder.child;
    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn registry_deregister_twice_returns_none() {
    let registry = LockRegistry::new();
    let handle = registry.register(spawn_sleeper(), "ns1", Duration::from_secs(1));

    let holder = registry.deregister(handle.id()).unwrap();
    assert!(registry.deregister(handle.id()).is_none());

    let mut child = holder.child;
    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn registry_handles_are_unique() {
    let registry = LockRegistry::new();
    let h1 = registry.register(spawn_sleeper(), "ns1", Duration::from_secs(1));
    let h2 = registry.register(spawn_sleeper(), "ns2", Duration::from_secs(1));
    assert_ne!(h1.id(), h2.id());

    for holder in registry.drain() {
        let mut child = holder.child;
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[test]
fn registry_drain_empties_the_table() {
    let registry = LockRegistry::new();
    registry.register(spawn_sleeper(), "ns1", Duration::from_secs(1));
    registry.register(spawn_sleeper(), "ns2", Duration::from_secs(1));

    let drained = registry.drain();
    assert_eq!(drained.len(), 2);
    assert!(registry.is_empty());

    for holder in drained {
        let mut child = holder.child;
        let _ = child.kill();
        let _ = child.wait();
    }
}

// ============================================================================
// Record
// ============================================================================

#[test]
fn record_tag_changes_on_tick() {
    let mut record = LeaseRecord::new("ns1", SESSION);
    let before = record.clone();
    assert!(record.same_tag(&before));

    record.tick();
    assert!(!record.same_tag(&before));
    assert!(record.same_owner(&before));
    assert_eq!(record.counter, 1);
}

#[test]
fn record_json_round_trip() {
    let record = LeaseRecord::new("ns1", SESSION);
    let json = record.to_json().unwrap();
    let parsed = LeaseRecord::from_json(&json).unwrap();
    assert_eq!(record, parsed);
}

#[test]
fn record_age_string_scales_with_age() {
    let mut record = LeaseRecord::new("ns1", SESSION);

    // Just heartbeated.
    assert!(record.age_string().ends_with('s'));

    record.updated_at = chrono::Utc::now() - chrono::Duration::minutes(5);
    assert!(record.age_string().contains('m'));

    record.updated_at = chrono::Utc::now() - chrono::Duration::hours(2);
    assert!(record.age_string().contains('h'));
}

#[test]
fn record_presumed_dead_after_missed_heartbeats() {
    let mut record = LeaseRecord::new("ns1", Duration::from_secs(1));
    assert!(!record.presumed_dead(HEARTBEAT_MISSES_BEFORE_STEAL));

    record.updated_at = chrono::Utc::now() - chrono::Duration::seconds(10);
    assert!(record.presumed_dead(HEARTBEAT_MISSES_BEFORE_STEAL));
}

#[test]
fn records_from_different_holders_differ() {
    let a = LeaseRecord::new("ns1", SESSION);
    let b = LeaseRecord::new("ns1", SESSION);
    assert!(!a.same_owner(&b));
    assert!(!a.same_tag(&b));
}

// ============================================================================
// File store
// ============================================================================

#[test]
fn file_store_requires_existing_namespace() {
    let (_dir, root) = create_test_backend(&[]);
    let result = FileLeaseStore::new(&root, "missing");
    assert!(matches!(result, Err(NslockError::UserError(_))));
}

#[test]
fn file_store_create_is_exclusive() {
    let (_dir, root) = create_test_backend(&["ns1"]);
    let store = file_store(&root, "ns1");

    let first = LeaseRecord::new("ns1", SESSION);
    let second = LeaseRecord::new("ns1", SESSION);

    assert!(store.create(&first).unwrap());
    assert!(!store.create(&second).unwrap());

    let current = store.read().unwrap().unwrap();
    assert!(current.same_owner(&first));
}

#[test]
fn file_store_read_absent_is_none() {
    let (_dir, root) = create_test_backend(&["ns1"]);
    let store = file_store(&root, "ns1");
    assert!(store.read().unwrap().is_none());
}

#[test]
fn file_store_replace_and_remove() {
    let (_dir, root) = create_test_backend(&["ns1"]);
    let store = file_store(&root, "ns1");

    let mut record = LeaseRecord::new("ns1", SESSION);
    assert!(store.create(&record).unwrap());

    record.tick();
    store.replace(&record).unwrap();
    assert_eq!(store.read().unwrap().unwrap().counter, 1);

    store.remove().unwrap();
    assert!(store.read().unwrap().is_none());

    // Removing an absent record is fine.
    store.remove().unwrap();
}

#[test]
fn file_store_leaves_no_temp_files_behind() {
    let (_dir, root) = create_test_backend(&["ns1"]);
    let store = file_store(&root, "ns1");

    let record = LeaseRecord::new("ns1", SESSION);
    assert!(store.create(&record).unwrap());
    assert!(!store.create(&LeaseRecord::new("ns1", SESSION)).unwrap());

    let entries: Vec<_> = std::fs::read_dir(root.join("ns1"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec![super::record::LOCK_OBJECT_NAME.to_string()]);
}

// ============================================================================
// Service protocol
// ============================================================================

#[test]
fn uncontended_acquire_is_immediate() {
    let (_dir, root) = create_test_backend(&["ns1"]);
    let service = LeaseService::new(Box::new(file_store(&root, "ns1")), "ns1", SESSION);

    let started = Instant::now();
    match service.acquire().unwrap() {
        AcquireOutcome::Acquired(lease) => {
            assert!(started.elapsed() < SESSION);
            lease.release().unwrap();
        }
        AcquireOutcome::Contended { owner } => panic!("unexpected contention by {}", owner),
    }
}

#[test]
fn acquire_against_live_holder_fails_after_observation_window() {
    let (_dir, root) = create_test_backend(&["ns1"]);

    // Simulated live holder: heartbeats slightly faster than the session.
    let holder_store = file_store(&root, "ns1");
    let mut record = LeaseRecord::new("ns1", SESSION);
    assert!(holder_store.create(&record).unwrap());

    let stop = Arc::new(AtomicBool::new(false));
    let beat_stop = Arc::clone(&stop);
    let beater = thread::spawn(move || {
        while !beat_stop.load(Ordering::SeqCst) {
            record.tick();
            holder_store.replace(&record).unwrap();
            thread::sleep(SESSION / 2);
        }
    });

    let service = LeaseService::new(Box::new(file_store(&root, "ns1")), "ns1", SESSION);
    let started = Instant::now();
    let outcome = service.acquire().unwrap();
    let elapsed = started.elapsed();

    stop.store(true, Ordering::SeqCst);
    beater.join().unwrap();

    assert!(matches!(outcome, AcquireOutcome::Contended { .. }));
    assert!(
        elapsed >= SESSION * HEARTBEAT_MISSES_BEFORE_STEAL,
        "gave up after {:?}, expected at least {:?}",
        elapsed,
        SESSION * HEARTBEAT_MISSES_BEFORE_STEAL
    );
}

#[test]
fn acquire_steals_from_dead_holder_after_missed_heartbeats() {
    let (_dir, root) = create_test_backend(&["ns1"]);

    // A record whose holder never heartbeats again.
    let dead = LeaseRecord::new("ns1", SESSION);
    assert!(file_store(&root, "ns1").create(&dead).unwrap());

    let service = LeaseService::new(Box::new(file_store(&root, "ns1")), "ns1", SESSION);
    let started = Instant::now();
    let outcome = service.acquire().unwrap();
    let elapsed = started.elapsed();

    match outcome {
        AcquireOutcome::Acquired(lease) => {
            assert!(
                elapsed >= SESSION * HEARTBEAT_MISSES_BEFORE_STEAL,
                "stole after {:?}, expected at least {:?}",
                elapsed,
                SESSION * HEARTBEAT_MISSES_BEFORE_STEAL
            );
            assert!(!lease.record().same_owner(&dead));
            lease.release().unwrap();
        }
        AcquireOutcome::Contended { owner } => panic!("expected steal, got contention by {}", owner),
    }
}

#[test]
fn acquire_takes_over_quickly_after_release() {
    let (_dir, root) = create_test_backend(&["ns1"]);

    let holder_store = file_store(&root, "ns1");
    let record = LeaseRecord::new("ns1", SESSION);
    assert!(holder_store.create(&record).unwrap());

    // Release one session period in.
    let releaser = thread::spawn(move || {
        thread::sleep(SESSION / 2);
        holder_store.remove().unwrap();
    });

    let service = LeaseService::new(Box::new(file_store(&root, "ns1")), "ns1", SESSION);
    let started = Instant::now();
    let outcome = service.acquire().unwrap();
    let elapsed = started.elapsed();
    releaser.join().unwrap();

    match outcome {
        AcquireOutcome::Acquired(lease) => {
            // One observation window, not the full steal window.
            assert!(elapsed < SESSION * HEARTBEAT_MISSES_BEFORE_STEAL);
            lease.release().unwrap();
        }
        AcquireOutcome::Contended { owner } => panic!("unexpected contention by {}", owner),
    }
}

#[test]
fn namespaces_do_not_contend() {
    let (_dir, root) = create_test_backend(&["ns1", "ns2"]);

    let held = LeaseService::new(Box::new(file_store(&root, "ns1")), "ns1", SESSION);
    let lease1 = match held.acquire().unwrap() {
        AcquireOutcome::Acquired(lease) => lease,
        AcquireOutcome::Contended { .. } => panic!("ns1 should be free"),
    };

    let other = LeaseService::new(Box::new(file_store(&root, "ns2")), "ns2", SESSION);
    let started = Instant::now();
    match other.acquire().unwrap() {
        AcquireOutcome::Acquired(lease2) => {
            assert!(started.elapsed() < SESSION);
            lease2.release().unwrap();
        }
        AcquireOutcome::Contended { owner } => panic!("unexpected contention by {}", owner),
    }

    lease1.release().unwrap();
}

#[test]
fn heartbeat_reports_lost_lease() {
    let (_dir, root) = create_test_backend(&["ns1"]);

    let service = LeaseService::new(Box::new(file_store(&root, "ns1")), "ns1", SESSION);
    let mut lease = match service.acquire().unwrap() {
        AcquireOutcome::Acquired(lease) => lease,
        AcquireOutcome::Contended { .. } => panic!("ns1 should be free"),
    };
    assert!(lease.heartbeat().unwrap());

    // A foreign record takes over behind our back.
    let usurper_store = file_store(&root, "ns1");
    usurper_store.remove().unwrap();
    assert!(
        usurper_store
            .create(&LeaseRecord::new("ns1", SESSION))
            .unwrap()
    );

    assert!(!lease.heartbeat().unwrap());

    // Releasing a lost lease must not clobber the usurper's record.
    lease.release().unwrap();
    assert!(usurper_store.read().unwrap().is_some());
}
