//! Architectural Contract Test: Transaction Discipline
//!
//! This test verifies that every failure between lock and commit leaves the
//! device configuration untouched and the configuration lock released.
//!
//! Constraints verified:
//! - A failed apply is discarded and never committed
//! - A rejected commit is discarded
//! - A failed lock stages nothing
//! - A commit the device acknowledges but does not apply is reported as
//!   a state inconsistency, for policies and for interfaces
//! - Commit warnings are surfaced in the outcome
//! - Every opened session is closed
//!
//! If this test fails, failed operations can leave staged configuration behind.

mod common;

use common::*;
use jsync_core::resources::ProtocolProfiles;
use jsync_core::{EngineEvent, ErrorKind, InterfacePhysicalOptions, UtmPolicyOptions};
use std::sync::atomic::Ordering;
use tokio_test::{assert_err, assert_ok};

fn policy() -> UtmPolicyOptions {
    UtmPolicyOptions {
        anti_spam_smtp_profile: Some("spam-default".to_string()),
        ..UtmPolicyOptions::new("mail-policy")
    }
}

fn interface() -> InterfacePhysicalOptions {
    InterfacePhysicalOptions {
        description: Some("uplink".to_string()),
        ..InterfacePhysicalOptions::new("ge-0/0/1")
    }
}

#[tokio::test]
async fn failed_apply_is_discarded() {
    let connector = RecordingConnector::new(memory_device(&["ge-0/0/1"], &[]));
    connector.faults().fail_apply.store(true, Ordering::SeqCst);
    let (engine, mut events) = engine_for(&connector, &minimal_config());

    let err = assert_err!(engine.create_interface_physical(&interface()).await);

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(connector.commit_count(), 0);
    assert_eq!(connector.discard_count(), 1);
    assert!(connector.device().configuration().await.is_empty());
    assert!(
        drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, EngineEvent::Discarded { .. }))
    );
}

#[tokio::test]
async fn rejected_commit_is_discarded_and_lock_released() {
    let connector = RecordingConnector::new(memory_device(&[], &[]));
    connector.faults().fail_commit.store(true, Ordering::SeqCst);
    let (engine, _events) = engine_for(&connector, &minimal_config());

    let err = assert_err!(engine.create_utm_policy(&policy()).await);
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(connector.discard_count(), 1);
    assert!(connector.device().commit_log().await.is_empty());
    assert!(connector.device().configuration().await.is_empty());

    // the next operation can take the lock again
    connector.faults().fail_commit.store(false, Ordering::SeqCst);
    assert_ok!(engine.create_utm_policy(&policy()).await);
    assert_eq!(connector.device().commit_log().await.len(), 1);
}

#[tokio::test]
async fn failed_lock_stages_nothing() {
    let connector = RecordingConnector::new(memory_device(&[], &[]));
    connector.faults().fail_lock.store(true, Ordering::SeqCst);
    let (engine, _events) = engine_for(&connector, &minimal_config());

    let err = assert_err!(engine.create_utm_policy(&policy()).await);

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(CallCounters::get(&connector.counters().applies), 0);
    assert_eq!(connector.commit_count(), 0);
}

#[tokio::test]
async fn unapplied_commit_is_state_inconsistency() {
    let connector = RecordingConnector::new(memory_device(&[], &[]));
    connector.faults().drop_commits.store(true, Ordering::SeqCst);
    let (engine, mut events) = engine_for(&connector, &minimal_config());

    let err = assert_err!(engine.create_utm_policy(&policy()).await);
    assert_eq!(err.kind(), ErrorKind::StateInconsistency);

    assert_eq!(connector.commit_count(), 1);
    assert!(connector.device().configuration().await.is_empty());

    assert!(
        drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, EngineEvent::VerificationFailed { kind: "security_utm_policy", .. }))
    );
}

fn assert_interface_verification_failed(events: &[EngineEvent]) {
    assert!(
        events.iter().any(|e| matches!(
            e,
            EngineEvent::VerificationFailed { kind: "interface_physical", .. }
        )),
        "Expected a failed interface verification, got {:?}",
        events
    );
}

#[tokio::test]
async fn unapplied_unpark_is_state_inconsistency() {
    let device = memory_device(
        &["ge-0/0/1"],
        &[
            "set interfaces ge-0/0/1 disable",
            "set interfaces ge-0/0/1 description NC",
        ],
    );
    let connector = RecordingConnector::new(device);
    connector.faults().drop_commits.store(true, Ordering::SeqCst);
    let (engine, mut events) = engine_for(&connector, &minimal_config());

    let err = assert_err!(engine.create_interface_physical(&interface()).await);

    assert_eq!(err.kind(), ErrorKind::StateInconsistency);
    assert!(err.to_string().contains("always disable (NC)"));
    assert_interface_verification_failed(&drain_events(&mut events));
}

#[tokio::test]
async fn unapplied_aggregate_create_is_state_inconsistency() {
    let connector = RecordingConnector::new(memory_device(&[], &[]));
    connector.faults().drop_commits.store(true, Ordering::SeqCst);
    let (engine, mut events) = engine_for(&connector, &minimal_config());

    let desired = InterfacePhysicalOptions {
        description: Some("bundle".to_string()),
        ..InterfacePhysicalOptions::new("ae5")
    };
    let err = assert_err!(engine.create_interface_physical(&desired).await);

    assert_eq!(err.kind(), ErrorKind::StateInconsistency);
    assert!(err.to_string().contains("not exists"));
    assert_eq!(connector.commit_count(), 1);
    assert_interface_verification_failed(&drain_events(&mut events));
}

#[tokio::test]
async fn unapplied_interface_delete_is_state_inconsistency() {
    let device = memory_device(
        &["ge-0/0/1"],
        &["set interfaces ge-0/0/1 description uplink"],
    );
    let connector = RecordingConnector::new(device);
    connector.faults().drop_commits.store(true, Ordering::SeqCst);
    let (engine, mut events) = engine_for(&connector, &minimal_config());

    let err = assert_err!(engine.delete_interface_physical("ge-0/0/1").await);

    assert_eq!(err.kind(), ErrorKind::StateInconsistency);
    assert!(err.to_string().contains("still configured after delete"));
    assert_eq!(
        connector.commit_descriptions(),
        vec!["delete resource interface_physical".to_string()],
        "Nothing is parked after a failed verification"
    );
    assert_eq!(
        connector.device().configuration().await,
        vec!["set interfaces ge-0/0/1 description uplink"]
    );
    assert_interface_verification_failed(&drain_events(&mut events));
}

#[tokio::test]
async fn commit_warnings_are_surfaced() {
    let connector = RecordingConnector::new(memory_device(&[], &[]));
    connector
        .faults()
        .commit_warnings
        .lock()
        .unwrap()
        .push("statement has no contents; ignored".to_string());
    let (engine, _events) = engine_for(&connector, &minimal_config());

    let outcome = engine
        .create_utm_policy(&UtmPolicyOptions {
            anti_virus: Some(ProtocolProfiles {
                smtp_profile: Some("av-smtp".to_string()),
                ..Default::default()
            }),
            ..UtmPolicyOptions::new("mail-policy")
        })
        .await
        .expect("create succeeds");

    assert_eq!(
        outcome.warnings,
        vec!["statement has no contents; ignored".to_string()]
    );
}

#[tokio::test]
async fn every_session_is_closed() {
    let connector = RecordingConnector::new(memory_device(&["ge-0/0/1"], &[]));
    let (engine, _events) = engine_for(&connector, &minimal_config());

    assert_ok!(engine.create_interface_physical(&interface()).await);
    assert_ok!(engine.read_interface_physical("ge-0/0/1").await);
    assert_ok!(engine.update_interface_physical(&interface()).await);
    assert_ok!(engine.delete_interface_physical("ge-0/0/1").await);
    let _ = engine.create_utm_policy(&UtmPolicyOptions::new("bare")).await;

    let counters = connector.counters();
    assert_eq!(CallCounters::get(&counters.connects), 4);
    assert_eq!(
        CallCounters::get(&counters.connects),
        CallCounters::get(&counters.closes)
    );
}
