//! Architectural Contract Test: UTM Policy Sync
//!
//! This test verifies the create/read/update/delete/import cycle of a
//! UTM policy against an emulated device.
//!
//! Constraints verified:
//! - Create refuses an existing policy
//! - Update re-sets the whole policy in one commit
//! - Every commit carries the resource description
//! - Events follow started → committed → verified
//!
//! If this test fails, UTM policy sync is broken.

mod common;

use common::*;
use jsync_core::resources::{ProtocolProfiles, SessionsPerClient};
use jsync_core::{EngineEvent, Error, Operation, UtmPolicyOptions};

fn policy() -> UtmPolicyOptions {
    UtmPolicyOptions {
        anti_virus: Some(ProtocolProfiles {
            http_profile: Some("av-http".to_string()),
            ..Default::default()
        }),
        traffic_sessions_per_client: Some(SessionsPerClient {
            limit: Some(100),
            over_limit: Some("block".to_string()),
        }),
        ..UtmPolicyOptions::new("web-policy")
    }
}

#[tokio::test]
async fn policy_lifecycle() {
    let connector = RecordingConnector::new(memory_device(&[], &[]));
    let (engine, mut events) = engine_for(&connector, &minimal_config());

    let created = engine.create_utm_policy(&policy()).await.expect("create succeeds");
    assert_eq!(
        rendered(&created.statements),
        vec![
            "set security utm utm-policy web-policy anti-virus http-profile av-http",
            "set security utm utm-policy web-policy traffic-options sessions-per-client limit 100",
            "set security utm utm-policy web-policy traffic-options sessions-per-client over-limit block",
        ]
    );
    assert_eq!(created.options, Some(policy()));

    let events = drain_events(&mut events);
    assert_eq!(
        events,
        vec![
            EngineEvent::OperationStarted {
                kind: "security_utm_policy",
                name: "web-policy".to_string(),
                operation: Operation::Create,
            },
            EngineEvent::Committed {
                kind: "security_utm_policy",
                name: "web-policy".to_string(),
                description: "create resource security_utm_policy".to_string(),
                statements: 3,
            },
            EngineEvent::Verified {
                kind: "security_utm_policy",
                name: "web-policy".to_string(),
            },
        ]
    );

    let mut desired = policy();
    desired.traffic_sessions_per_client = None;
    desired.web_filtering_profile = Some("wf default".to_string());
    let updated = engine.update_utm_policy(&desired).await.expect("update succeeds");
    assert_eq!(
        updated.statements[0].to_string(),
        "delete security utm utm-policy web-policy"
    );
    assert_eq!(updated.options, Some(desired.clone()));
    assert_eq!(
        engine.read_utm_policy("web-policy").await.unwrap(),
        Some(desired.clone())
    );
    assert_eq!(
        engine.import_utm_policy("web-policy").await.unwrap(),
        desired
    );

    let deleted = engine.delete_utm_policy("web-policy").await.expect("delete succeeds");
    assert!(deleted.is_changed());
    assert_eq!(engine.read_utm_policy("web-policy").await.unwrap(), None);

    assert_eq!(
        connector.commit_descriptions(),
        vec![
            "create resource security_utm_policy".to_string(),
            "update resource security_utm_policy".to_string(),
            "delete resource security_utm_policy".to_string(),
        ]
    );
    assert!(connector.device().configuration().await.is_empty());
}

#[tokio::test]
async fn create_refuses_existing_policy() {
    let device = memory_device(
        &[],
        &["set security utm utm-policy web-policy web-filtering http-profile wf"],
    );
    let connector = RecordingConnector::new(device);
    let (engine, _events) = engine_for(&connector, &minimal_config());

    let err = engine
        .create_utm_policy(&policy())
        .await
        .expect_err("existing policy cannot be created");

    assert!(matches!(err, Error::Conflict(_)));
    assert_eq!(connector.commit_count(), 0);
    assert_eq!(connector.device().configuration().await.len(), 1);
}

#[tokio::test]
async fn missing_policy_is_not_found() {
    let connector = RecordingConnector::new(memory_device(&[], &[]));
    let (engine, _events) = engine_for(&connector, &minimal_config());

    assert_eq!(engine.read_utm_policy("web-policy").await.unwrap(), None);
    assert!(matches!(
        engine.import_utm_policy("web-policy").await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        engine.update_utm_policy(&policy()).await,
        Err(Error::NotFound(_))
    ));
    assert_eq!(connector.commit_count(), 0);
}

#[tokio::test]
async fn invalid_policy_never_reaches_device() {
    let connector = RecordingConnector::new(memory_device(&[], &[]));
    let (engine, _events) = engine_for(&connector, &minimal_config());

    let empty_block = UtmPolicyOptions {
        content_filtering: Some(ProtocolProfiles::default()),
        ..UtmPolicyOptions::new("web-policy")
    };
    assert!(matches!(
        engine.create_utm_policy(&empty_block).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        engine.create_utm_policy(&UtmPolicyOptions::new("bare")).await,
        Err(Error::Validation(_))
    ));

    assert_eq!(CallCounters::get(&connector.counters().connects), 0);
}
