//! Lock acquisition, release and waiter ordering through the public API

#[path = "testutils/mod.rs"]
mod testutils;

use metalock::{LockError, LockManagerConfig, LockType, Locker, LockerState};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use testutils::{manager_with, owner_types, spawn_locker, test_manager, wait_until, waiter_count};

const PATIENCE: Duration = Duration::from_secs(5);

#[test]
fn test_reentrant_requests_never_block_or_duplicate() {
    let manager = test_manager();
    let locker = Arc::new(Locker::new());

    manager.lock(10, &locker, LockType::Write, 50).unwrap();
    let start = Instant::now();
    manager.lock(10, &locker, LockType::Write, 50).unwrap();
    manager.lock(10, &locker, LockType::Read, 50).unwrap();
    manager.lock(10, &locker, LockType::IntentionShared, 50).unwrap();
    assert!(start.elapsed() < Duration::from_millis(50));

    let info = manager.lock_info(10).unwrap();
    assert_eq!(info.owners.len(), 1);
    assert_eq!(info.owners[0].reentrant_count, 4);
    assert!(info.waiters.is_empty());

    manager.release(10, &locker, LockType::IntentionShared).unwrap();
    manager.release(10, &locker, LockType::Read).unwrap();
    manager.release(10, &locker, LockType::Write).unwrap();
    assert!(manager.is_owner(10, &locker, LockType::Write));
    manager.release(10, &locker, LockType::Write).unwrap();
    assert!(!manager.is_owner(10, &locker, LockType::Write));
    assert!(manager.dump().is_empty());
}

#[test]
fn test_shared_holders_coexist() {
    let manager = test_manager();
    let a = Arc::new(Locker::new());
    let b = Arc::new(Locker::new());

    manager.lock(3, &a, LockType::Read, 50).unwrap();
    manager.lock(3, &b, LockType::Read, 50).unwrap();
    manager.lock(4, &a, LockType::IntentionExclusive, 50).unwrap();
    manager.lock(4, &b, LockType::IntentionShared, 50).unwrap();

    assert_eq!(owner_types(&manager, 3), vec![LockType::Read, LockType::Read]);
    assert_eq!(manager.dump().len(), 2);

    for (rid, locker, lock_type) in [
        (3, &a, LockType::Read),
        (3, &b, LockType::Read),
        (4, &a, LockType::IntentionExclusive),
        (4, &b, LockType::IntentionShared),
    ] {
        manager.release(rid, locker, lock_type).unwrap();
    }
    assert!(manager.dump().is_empty());
}

#[test]
fn test_intention_scope_rejects_read_write() {
    let manager = test_manager();
    let locker = Arc::new(Locker::new());
    manager.lock(1, &locker, LockType::IntentionShared, 0).unwrap();

    let err = manager.lock(1, &locker, LockType::Read, 0).unwrap_err();
    assert!(matches!(err, LockError::NotSupported(_)));
    assert!(!err.is_retryable());
    assert_eq!(locker.state(), LockerState::Aborted);
    assert_eq!(owner_types(&manager, 1), vec![LockType::IntentionShared]);

    manager.release(1, &locker, LockType::IntentionShared).unwrap();
    assert!(manager.dump().is_empty());
}

#[test]
fn test_release_of_unheld_lock_fails() {
    let manager = test_manager();
    let owner = Arc::new(Locker::new());
    let stranger = Arc::new(Locker::new());
    manager.lock(8, &owner, LockType::Read, 0).unwrap();

    assert!(matches!(
        manager.release(8, &stranger, LockType::Read),
        Err(LockError::NotLocked { rid: 8, .. })
    ));
    assert!(matches!(
        manager.release(9, &owner, LockType::Read),
        Err(LockError::NotLocked { rid: 9, .. })
    ));
    assert!(manager.is_owner(8, &owner, LockType::Read));
}

#[test]
#[serial_test::serial]
fn test_timeout_against_exclusive_holder() {
    let manager = test_manager();
    let holder = Arc::new(Locker::new());
    manager.lock(77, &holder, LockType::Write, 0).unwrap();

    let requester = Arc::new(Locker::new());
    let start = Instant::now();
    let err = manager.lock(77, &requester, LockType::Write, 100).unwrap_err();
    let elapsed = start.elapsed();

    assert!(err.is_timeout(), "unexpected error: {}", err);
    assert!(elapsed >= Duration::from_millis(100), "gave up after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1_000), "gave up after {:?}", elapsed);
    assert!(!manager.is_owner(77, &requester, LockType::Write));
    assert_eq!(waiter_count(&manager, 77), 0);
    assert_eq!(requester.state(), LockerState::Aborted);
}

#[test]
#[serial_test::serial]
fn test_timeout_shorter_than_slow_lock_threshold() {
    let manager = manager_with(LockManagerConfig::for_testing().with_slow_lock_threshold_ms(5_000));
    let holder = Arc::new(Locker::new());
    manager.lock(78, &holder, LockType::Read, 0).unwrap();

    let requester = Arc::new(Locker::new());
    let start = Instant::now();
    let err = manager.lock(78, &requester, LockType::Write, 50).unwrap_err();
    assert!(err.is_timeout());
    assert!(start.elapsed() < Duration::from_millis(1_000));
}

#[test]
#[serial_test::serial]
fn test_release_grants_shared_waiter_before_exclusive_waiter() {
    let manager = test_manager();
    let owner = Arc::new(Locker::new());
    manager.lock(20, &owner, LockType::Write, 0).unwrap();

    let (tx, rx) = mpsc::channel::<&'static str>();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let m = Arc::clone(&manager);
    let reader_tx = tx.clone();
    let reader = spawn_locker("shared-waiter", move |locker| {
        m.lock(20, &locker, LockType::Read, 0).unwrap();
        reader_tx.send("shared").unwrap();
        release_rx.recv().unwrap();
        m.release(20, &locker, LockType::Read).unwrap();
    });
    assert!(wait_until(|| waiter_count(&manager, 20) == 1, PATIENCE));

    let m = Arc::clone(&manager);
    let writer = spawn_locker("exclusive-waiter", move |locker| {
        m.lock(20, &locker, LockType::Write, 0).unwrap();
        tx.send("exclusive").unwrap();
        m.release(20, &locker, LockType::Write).unwrap();
    });
    assert!(wait_until(|| waiter_count(&manager, 20) == 2, PATIENCE));

    manager.release(20, &owner, LockType::Write).unwrap();
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), "shared");
    assert_eq!(owner_types(&manager, 20), vec![LockType::Read]);
    assert_eq!(waiter_count(&manager, 20), 1);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    release_tx.send(()).unwrap();
    assert_eq!(rx.recv_timeout(PATIENCE).unwrap(), "exclusive");

    reader.join().unwrap();
    writer.join().unwrap();
    assert!(manager.dump().is_empty());
}

#[test]
#[serial_test::serial]
fn test_exclusive_requests_granted_in_arrival_order() {
    let manager = test_manager();
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();

    for i in 0..3usize {
        let m = Arc::clone(&manager);
        let order = Arc::clone(&order);
        handles.push(spawn_locker(&format!("session-{}", i), move |locker| {
            let start = Instant::now();
            m.lock(42, &locker, LockType::Write, 0).unwrap();
            let waited = start.elapsed();
            order.lock().unwrap().push(i);
            thread::sleep(Duration::from_millis(30));
            m.release(42, &locker, LockType::Write).unwrap();
            waited
        }));
        // the next session only starts once this one is owner or queued
        assert!(wait_until(
            || manager
                .lock_info(42)
                .map(|info| info.owners.len() + info.waiters.len() == i + 1)
                .unwrap_or(false),
            PATIENCE
        ));
    }

    let waits: Vec<Duration> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    assert!(waits[0] < Duration::from_millis(30));
    assert!(waits[1] > Duration::from_millis(5));
    assert!(waits[2] > Duration::from_millis(5));
    assert!(manager.dump().is_empty());
}

#[test]
#[serial_test::serial]
fn test_upgrade_waits_for_other_reader() {
    let manager = test_manager();
    let upgrader = Arc::new(Locker::new());
    let reader = Arc::new(Locker::new());
    manager.lock(30, &upgrader, LockType::Read, 0).unwrap();
    manager.lock(30, &reader, LockType::Read, 0).unwrap();

    let m = Arc::clone(&manager);
    let u = Arc::clone(&upgrader);
    let handle = thread::spawn(move || m.lock(30, &u, LockType::Write, 5_000));

    assert!(wait_until(|| waiter_count(&manager, 30) == 1, PATIENCE));
    assert_eq!(upgrader.waiting_for(), Some((30, LockType::Write)));
    manager.release(30, &reader, LockType::Read).unwrap();

    handle.join().unwrap().unwrap();
    assert!(manager.is_owner(30, &upgrader, LockType::Write));
    assert_eq!(upgrader.state(), LockerState::Granted);

    manager.release(30, &upgrader, LockType::Write).unwrap();
    manager.release(30, &upgrader, LockType::Read).unwrap();
    assert!(manager.dump().is_empty());
}

#[test]
#[serial_test::serial]
fn test_withdrawn_waiter_unblocks_followers() {
    let manager = test_manager();
    let owner = Arc::new(Locker::new());
    manager.lock(50, &owner, LockType::Read, 0).unwrap();

    let m = Arc::clone(&manager);
    let writer = spawn_locker("impatient-writer", move |locker| {
        m.lock(50, &locker, LockType::Write, 150)
    });
    assert!(wait_until(|| waiter_count(&manager, 50) == 1, PATIENCE));

    let m = Arc::clone(&manager);
    let reader = spawn_locker("queued-reader", move |locker| {
        m.lock(50, &locker, LockType::Read, 5_000)?;
        m.release(50, &locker, LockType::Read)
    });

    assert!(writer.join().unwrap().unwrap_err().is_timeout());
    reader.join().unwrap().unwrap();
    assert_eq!(owner_types(&manager, 50), vec![LockType::Read]);

    manager.release(50, &owner, LockType::Read).unwrap();
    assert!(manager.dump().is_empty());
}

#[test]
#[serial_test::serial]
fn test_interrupt_withdraws_waiter() {
    let manager = test_manager();
    let owner = Arc::new(Locker::new());
    manager.lock(60, &owner, LockType::Write, 0).unwrap();

    let waiter = Arc::new(Locker::new());
    let m = Arc::clone(&manager);
    let w = Arc::clone(&waiter);
    let handle = thread::spawn(move || m.lock(60, &w, LockType::Read, 0));

    assert!(wait_until(|| waiter_count(&manager, 60) == 1, PATIENCE));
    waiter.interrupt();

    let err = handle.join().unwrap().unwrap_err();
    assert!(matches!(err, LockError::Interrupted { rid: 60, .. }));
    assert_eq!(waiter_count(&manager, 60), 0);
    assert!(!manager.is_owner(60, &waiter, LockType::Read));
    assert_eq!(waiter.state(), LockerState::Aborted);

    manager.release(60, &owner, LockType::Write).unwrap();
    assert!(manager.dump().is_empty());
}

#[test]
fn test_dump_reports_owners_and_waiters() {
    let manager = test_manager();
    let query_id = uuid::Uuid::new_v4();
    let owner = Arc::new(Locker::with_query_id(query_id));
    manager.lock(90, &owner, LockType::Write, 0).unwrap();

    let m = Arc::clone(&manager);
    let handle = spawn_locker("dump-waiter", move |locker| {
        let err = m.lock(90, &locker, LockType::Read, 300).unwrap_err();
        (locker.id(), err)
    });
    assert!(wait_until(|| waiter_count(&manager, 90) == 1, PATIENCE));

    let dump = manager.dump();
    assert_eq!(dump.len(), 1);
    let info = &dump[0];
    assert_eq!(info.rid, 90);
    assert_eq!(info.owners[0].locker_id, owner.id());
    assert_eq!(info.owners[0].query_id, Some(query_id));
    assert_eq!(info.owners[0].lock_type, LockType::Write);
    assert_eq!(info.waiters[0].thread_name, "dump-waiter");
    assert_eq!(info.waiters[0].lock_type, LockType::Read);

    let json = serde_json::to_value(&dump).unwrap();
    assert_eq!(json[0]["rid"], 90);

    let (waiter_id, err) = handle.join().unwrap();
    assert!(err.is_timeout());
    assert_ne!(waiter_id, owner.id());
    manager.release(90, &owner, LockType::Write).unwrap();
    assert!(manager.dump().is_empty());
}

#[test]
#[serial_test::serial]
fn test_mutual_exclusion_under_random_load() {
    let manager = test_manager();
    let holders: Arc<Mutex<HashMap<i64, Vec<LockType>>>> = Arc::new(Mutex::new(HashMap::new()));
    let mut handles = Vec::new();

    for t in 0..6 {
        let m = Arc::clone(&manager);
        let holders = Arc::clone(&holders);
        handles.push(spawn_locker(&format!("worker-{}", t), move |locker| {
            let mut granted = 0;
            for _ in 0..200 {
                let rid = fastrand::i64(0..4);
                let lock_type = LockType::ALL[fastrand::usize(0..LockType::ALL.len())];
                if m.lock(rid, &locker, lock_type, 2_000).is_err() {
                    continue;
                }
                {
                    let mut holders = holders.lock().unwrap();
                    let current = holders.entry(rid).or_default();
                    for held in current.iter() {
                        assert!(
                            held.is_compatible(&lock_type),
                            "{} granted next to {} on resource {}",
                            lock_type,
                            held,
                            rid
                        );
                    }
                    current.push(lock_type);
                }
                granted += 1;
                thread::sleep(Duration::from_micros(50));
                {
                    let mut holders = holders.lock().unwrap();
                    let current = holders.entry(rid).or_default();
                    if let Some(pos) = current.iter().position(|t| *t == lock_type) {
                        current.remove(pos);
                    }
                }
                m.release(rid, &locker, lock_type).unwrap();
            }
            granted
        }));
    }

    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(granted > 0);
    assert!(manager.dump().is_empty());
}
