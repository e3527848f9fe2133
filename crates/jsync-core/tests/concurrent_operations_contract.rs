//! Architectural Contract Test: Concurrent Operations
//!
//! This test verifies that operations running concurrently on clones of one
//! engine leave the device consistent.
//!
//! Constraints verified:
//! - Each allocation rescans inside its own locked transaction
//! - The final device count covers every aggregated interface created
//! - Concurrent deletes leave no configuration behind
//!
//! If this test fails, concurrent operations can lose device-count updates.

mod common;

use common::*;
use jsync_core::InterfacePhysicalOptions;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_aggregate_creates_keep_count_consistent() {
    let connector = RecordingConnector::new(memory_device(&[], &[]));
    let (engine, _events) = engine_for(&connector, &minimal_config());

    let mut handles = Vec::new();
    for n in [1u32, 4, 2, 3] {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let desired = InterfacePhysicalOptions {
                description: Some(format!("bundle {}", n)),
                ..InterfacePhysicalOptions::new(format!("ae{}", n))
            };
            engine.create_interface_physical(&desired).await
        }));
    }
    for handle in handles {
        handle
            .await
            .expect("task completes")
            .expect("create succeeds");
    }

    let configuration = connector.device().configuration().await;
    let counts: Vec<&String> = configuration
        .iter()
        .filter(|line| line.starts_with("set chassis aggregated-devices ethernet device-count"))
        .collect();
    assert_eq!(
        counts,
        vec!["set chassis aggregated-devices ethernet device-count 5"],
        "Count must cover ae4 whatever the commit order"
    );
    assert_eq!(connector.commit_count(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_member_deletes_release_count() {
    let device = memory_device(
        &["ge-0/0/1", "ge-0/0/2", "ge-0/0/3"],
        &[
            "set interfaces ge-0/0/1 ether-options 802.3ad ae0",
            "set interfaces ge-0/0/2 ether-options 802.3ad ae0",
            "set interfaces ge-0/0/3 ether-options 802.3ad ae2",
            "set chassis aggregated-devices ethernet device-count 3",
        ],
    );
    let connector = RecordingConnector::new(device);
    let mut config = minimal_config();
    config.interface.no_disable_on_destroy = true;
    let (engine, _events) = engine_for(&connector, &config);

    let mut handles = Vec::new();
    for name in ["ge-0/0/1", "ge-0/0/2", "ge-0/0/3"] {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.delete_interface_physical(name).await
        }));
    }
    for handle in handles {
        handle
            .await
            .expect("task completes")
            .expect("delete succeeds");
    }

    assert!(
        connector.device().configuration().await.is_empty(),
        "No member and no device count should remain"
    );
}
