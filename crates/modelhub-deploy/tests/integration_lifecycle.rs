//! Integration tests for deployment lifecycle scenarios.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fixtures::SpecBuilder, FailingProvisioner, TestHub, OWNER, STRANGER};
use modelhub_deploy::{
    DeploymentAction, DeploymentKind, DeploymentPatch, DeploymentStatus, DeploymentStore,
    EventLevel, HubError,
};
use serde_json::json;

#[tokio::test]
async fn create_provisions_through_to_running() {
    let hub = TestHub::new();

    let spec = SpecBuilder::new("resnet-prod", hub.model.id)
        .kind(DeploymentKind::Endpoint)
        .build();
    let record = hub.manager.create(OWNER, spec).await.unwrap();

    // Created record is returned before provisioning starts
    assert_eq!(record.status, DeploymentStatus::Pending);
    assert_eq!(record.model_version_id, hub.version.id);
    assert!(record.endpoint_url.is_none());

    let running = hub
        .wait_for_status(record.id, DeploymentStatus::Running)
        .await;
    assert_eq!(
        running.endpoint_url.as_deref(),
        Some(
            format!(
                "https://endpoint.modelhub.com/v1/deployments/{}/predict",
                record.id
            )
            .as_str()
        )
    );
    assert!(running.error_message.is_none());
    assert!(running.deployed_at.is_some());

    hub.wait_idle().await;

    // Events come back newest first
    let messages: Vec<String> = hub
        .manager
        .logs(OWNER, record.id, None)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(
        messages.last().map(String::as_str),
        Some("Deployment 'resnet-prod' created")
    );
    assert!(messages.contains(&"Starting model deployment process".to_owned()));
    assert!(messages[0].starts_with("Deployment successful. Endpoint: https://endpoint."));
}

#[tokio::test]
async fn create_pins_explicit_version_of_the_same_model_only() {
    let hub = TestHub::new();
    let other = hub.store.add_model(OWNER, "bert", "onnx").unwrap();
    let other_version = hub.store.add_version(other.id, "2.0", "s3://bert/2").unwrap();
    let newer = hub
        .store
        .add_version(hub.model.id, "1.1.0", "s3://models/resnet/2")
        .unwrap();

    // Latest version is chosen when none is given
    let latest = hub
        .manager
        .create(OWNER, SpecBuilder::new("latest", hub.model.id).build())
        .await
        .unwrap();
    assert_eq!(latest.model_version_id, newer.id);

    let pinned = hub
        .manager
        .create(
            OWNER,
            SpecBuilder::new("pinned", hub.model.id)
                .version(hub.version.id)
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(pinned.model_version_id, hub.version.id);

    let err = hub
        .manager
        .create(
            OWNER,
            SpecBuilder::new("mismatch", hub.model.id)
                .version(other_version.id)
                .build(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::NotFound(_)));
}

#[tokio::test]
async fn create_rejects_invalid_and_duplicate_specs() {
    let hub = TestHub::new();

    let err = hub
        .manager
        .create(
            OWNER,
            SpecBuilder::new("bad", hub.model.id).replicas(4, 2).build(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Validation(_)));

    hub.manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();
    let err = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Conflict(_)));

    // Only the valid, first deployment exists
    let listed = hub.manager.list(OWNER, None, 0, None).await.unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn model_without_versions_is_not_found() {
    let hub = TestHub::new();
    let empty = hub.store.add_model(OWNER, "empty", "onnx").unwrap();

    let err = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", empty.id).build())
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::NotFound(_)));
}

#[tokio::test]
async fn starting_a_running_deployment_conflicts() {
    let hub = TestHub::new();
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();
    let running = hub
        .wait_for_status(record.id, DeploymentStatus::Running)
        .await;

    let err = hub.manager.start(OWNER, record.id).await.unwrap_err();
    assert!(matches!(err, HubError::Conflict(_)));

    // Record untouched
    let after = hub.manager.get(OWNER, record.id).await.unwrap();
    assert_eq!(after.generation, running.generation);
    assert_eq!(after.endpoint_url, running.endpoint_url);
}

#[tokio::test]
async fn stop_then_start_redeploys() {
    let hub = TestHub::new();
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();
    hub.wait_for_status(record.id, DeploymentStatus::Running)
        .await;

    let stopped = hub.manager.stop(OWNER, record.id).await.unwrap();
    assert_eq!(stopped.status, DeploymentStatus::Stopped);
    assert!(stopped.endpoint_url.is_none());
    assert_eq!(stopped.generation, record.generation + 1);

    let started = hub
        .manager
        .perform(OWNER, record.id, DeploymentAction::Start)
        .await
        .unwrap();
    assert_eq!(started.status, DeploymentStatus::Deploying);
    assert_eq!(started.generation, record.generation + 2);

    let running = hub
        .wait_for_status(record.id, DeploymentStatus::Running)
        .await;
    assert!(running.endpoint_url.is_some());
}

#[tokio::test]
async fn stopping_twice_is_idempotent() {
    let hub = TestHub::new();
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();
    hub.wait_for_status(record.id, DeploymentStatus::Running)
        .await;
    hub.wait_idle().await;

    let first = hub.manager.stop(OWNER, record.id).await.unwrap();
    let before = hub.manager.logs(OWNER, record.id, None).await.unwrap().len();
    let second = hub.manager.stop(OWNER, record.id).await.unwrap();

    // Same record, the request is logged again
    assert_eq!(first, second);
    assert_eq!(hub.manager.get(OWNER, record.id).await.unwrap(), first);

    let events = hub.manager.logs(OWNER, record.id, None).await.unwrap();
    assert_eq!(events.len(), before + 1);
    assert_eq!(events[0].level, EventLevel::Info);
    assert_eq!(events[0].message, "Deployment stopped");
    assert_eq!(events[0].metadata["previous_status"], "stopped");
}

#[tokio::test]
async fn stop_during_provisioning_is_never_overwritten() {
    let hub = TestHub::with_delay(Duration::from_millis(100));
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    hub.manager.stop(OWNER, record.id).await.unwrap();

    hub.wait_idle().await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let after = hub.manager.get(OWNER, record.id).await.unwrap();
    assert_eq!(after.status, DeploymentStatus::Stopped);
    assert!(after.endpoint_url.is_none());
}

#[tokio::test]
async fn restart_supersedes_the_previous_attempt() {
    let hub = TestHub::with_delay(Duration::from_millis(50));
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();

    let restarted = hub.manager.restart(OWNER, record.id).await.unwrap();
    assert_eq!(restarted.status, DeploymentStatus::Deploying);

    hub.wait_for_status(record.id, DeploymentStatus::Running)
        .await;
    hub.wait_idle().await;

    let successes = hub
        .manager
        .logs(OWNER, record.id, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.message.starts_with("Deployment successful"))
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn missing_version_fails_provisioning() {
    let hub = TestHub::with_delay(Duration::from_millis(50));
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();
    hub.wait_for_status(record.id, DeploymentStatus::Running)
        .await;
    hub.manager.stop(OWNER, record.id).await.unwrap();

    hub.store.remove_version(hub.version.id).unwrap();
    hub.manager.start(OWNER, record.id).await.unwrap();

    let failed = hub
        .wait_for_status(record.id, DeploymentStatus::Failed)
        .await;
    assert_eq!(failed.error_message.as_deref(), Some("Model version not found"));
    assert!(failed.endpoint_url.is_none());

    // Stopping a failed deployment clears the error
    let stopped = hub.manager.stop(OWNER, record.id).await.unwrap();
    assert_eq!(stopped.status, DeploymentStatus::Stopped);
    assert!(stopped.error_message.is_none());
}

#[tokio::test]
async fn provisioner_failure_is_recorded() {
    let hub = TestHub::with_provisioner(Arc::new(FailingProvisioner {
        reason: "registry unreachable",
    }));
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();

    let failed = hub
        .wait_for_status(record.id, DeploymentStatus::Failed)
        .await;
    assert_eq!(failed.error_message.as_deref(), Some("registry unreachable"));
    hub.wait_idle().await;

    let events = hub.manager.logs(OWNER, record.id, None).await.unwrap();
    assert_eq!(events[0].level, EventLevel::Error);
    assert_eq!(events[0].message, "Deployment failed: registry unreachable");

    // A failed deployment can be retried
    let retried = hub.manager.start(OWNER, record.id).await.unwrap();
    assert_eq!(retried.status, DeploymentStatus::Deploying);
    assert!(retried.error_message.is_none());
}

#[tokio::test]
async fn delete_running_deployment_removes_record_and_events() {
    let hub = TestHub::new();
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();
    hub.wait_for_status(record.id, DeploymentStatus::Running)
        .await;
    hub.wait_idle().await;

    hub.manager.delete(OWNER, record.id).await.unwrap();

    let err = hub.manager.get(OWNER, record.id).await.unwrap_err();
    assert!(matches!(err, HubError::NotFound(_)));
    assert!(hub.store.list_events(record.id, 100).await.unwrap().is_empty());

    // Name is free again
    hub.manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_during_provisioning_does_not_resurrect() {
    let hub = TestHub::with_delay(Duration::from_millis(50));
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();

    hub.manager.delete(OWNER, record.id).await.unwrap();
    hub.wait_idle().await;
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(hub.store.get(record.id).await.unwrap().is_none());
    assert!(hub.store.list_events(record.id, 100).await.unwrap().is_empty());
}

#[tokio::test]
async fn other_owners_cannot_see_or_touch_deployments() {
    let hub = TestHub::new();
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();

    // Model belongs to OWNER
    let err = hub
        .manager
        .create(STRANGER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::NotFound(_)));

    assert!(matches!(
        hub.manager.get(STRANGER, record.id).await,
        Err(HubError::NotFound(_))
    ));
    assert!(matches!(
        hub.manager.stop(STRANGER, record.id).await,
        Err(HubError::NotFound(_))
    ));
    assert!(matches!(
        hub.manager.delete(STRANGER, record.id).await,
        Err(HubError::NotFound(_))
    ));
    assert!(matches!(
        hub.manager.logs(STRANGER, record.id, None).await,
        Err(HubError::NotFound(_))
    ));
    assert!(hub
        .manager
        .list(STRANGER, None, 0, None)
        .await
        .unwrap()
        .is_empty());

    // Still there for the owner
    hub.manager.get(OWNER, record.id).await.unwrap();
}

#[tokio::test]
async fn predict_requires_running_and_counts_requests() {
    let hub = TestHub::with_delay(Duration::from_millis(50));
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();

    let err = hub
        .manager
        .predict(OWNER, record.id, json!({ "x": 1 }))
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::InvalidState(_)));

    hub.wait_for_status(record.id, DeploymentStatus::Running)
        .await;

    let response = hub
        .manager
        .predict(OWNER, record.id, json!({ "x": 1 }))
        .await
        .unwrap();
    assert_eq!(response["status"], "success");
    assert_eq!(response["model_name"], "resnet");
    assert_eq!(response["input"], json!({ "x": 1 }));
    hub.manager
        .predict(OWNER, record.id, json!({ "x": 2 }))
        .await
        .unwrap();

    let metrics = hub.manager.metrics(OWNER, record.id).await.unwrap();
    assert_eq!(metrics.request_count, 2);
    assert!(metrics.last_request_at.is_some());
    assert_eq!(metrics.current_replicas, record.resources.min_replicas);
}

#[tokio::test]
async fn invalid_update_leaves_record_unchanged() {
    let hub = TestHub::new();
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();
    let running = hub
        .wait_for_status(record.id, DeploymentStatus::Running)
        .await;

    let err = hub
        .manager
        .update(
            OWNER,
            record.id,
            DeploymentPatch {
                min_replicas: Some(9),
                max_replicas: Some(2),
                ..DeploymentPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Validation(_)));
    assert_eq!(hub.manager.get(OWNER, record.id).await.unwrap(), running);

    let updated = hub
        .manager
        .update(
            OWNER,
            record.id,
            DeploymentPatch {
                description: Some("image classifier".to_owned()),
                memory_mb: Some(2048),
                ..DeploymentPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.description.as_deref(), Some("image classifier"));
    assert_eq!(updated.resources.memory_mb, 2048);
    // Configuration changes do not touch the lifecycle
    assert_eq!(updated.status, DeploymentStatus::Running);
    assert_eq!(updated.endpoint_url, running.endpoint_url);

    let events = hub.manager.logs(OWNER, record.id, Some(1)).await.unwrap();
    assert_eq!(events[0].message, "Deployment configuration updated");
}

#[tokio::test]
async fn list_filters_and_pages() {
    let hub = TestHub::with_provisioner(Arc::new(FailingProvisioner { reason: "boom" }));
    for name in ["a", "b", "c"] {
        hub.manager
            .create(OWNER, SpecBuilder::new(name, hub.model.id).build())
            .await
            .unwrap();
    }
    for record in hub.manager.list(OWNER, None, 0, None).await.unwrap() {
        hub.wait_for_status(record.id, DeploymentStatus::Failed)
            .await;
    }
    hub.wait_idle().await;

    let first = hub.manager.list(OWNER, None, 0, Some(1)).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].name, "c");

    let rest = hub.manager.list(OWNER, None, 1, Some(10)).await.unwrap();
    assert_eq!(
        rest.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        ["b", "a"]
    );

    let failed = hub
        .manager
        .list(OWNER, Some(DeploymentStatus::Failed), 0, None)
        .await
        .unwrap();
    assert_eq!(failed.len(), 3);
    let running = hub
        .manager
        .list(OWNER, Some(DeploymentStatus::Running), 0, None)
        .await
        .unwrap();
    assert!(running.is_empty());

    let err = hub.manager.list(OWNER, None, 0, Some(0)).await.unwrap_err();
    assert!(matches!(err, HubError::Validation(_)));
}

#[tokio::test]
async fn health_checks_stamp_only_running_deployments() {
    let hub = TestHub::new();
    let live = hub
        .manager
        .create(OWNER, SpecBuilder::new("live", hub.model.id).build())
        .await
        .unwrap();
    let idle = hub
        .manager
        .create(OWNER, SpecBuilder::new("idle", hub.model.id).build())
        .await
        .unwrap();
    hub.wait_for_status(live.id, DeploymentStatus::Running)
        .await;
    hub.wait_for_status(idle.id, DeploymentStatus::Running)
        .await;
    hub.manager.stop(OWNER, idle.id).await.unwrap();

    assert_eq!(hub.manager.record_health_checks().await.unwrap(), 1);

    let live = hub.manager.metrics(OWNER, live.id).await.unwrap();
    let idle = hub.manager.metrics(OWNER, idle.id).await.unwrap();
    assert!(live.last_health_check.is_some());
    assert!(idle.last_health_check.is_none());
}

#[tokio::test]
async fn detail_includes_metrics_and_recent_events() {
    let hub = TestHub::new();
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();
    hub.wait_for_status(record.id, DeploymentStatus::Running)
        .await;
    hub.wait_idle().await;

    let detail = hub.manager.detail(OWNER, record.id).await.unwrap();
    assert_eq!(detail.deployment.id, record.id);
    assert_eq!(detail.metrics.request_count, 0);
    assert!(!detail.recent_logs.is_empty());
    assert!(detail.recent_logs.len() <= 10);
    assert!(detail
        .recent_logs
        .windows(2)
        .all(|w| w[0].created_at >= w[1].created_at));
}

#[tokio::test]
async fn records_stay_consistent_across_operations() {
    let hub = TestHub::with_delay(Duration::from_millis(10));
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();

    for action in [
        DeploymentAction::Restart,
        DeploymentAction::Stop,
        DeploymentAction::Start,
        DeploymentAction::Restart,
    ] {
        let record = hub.manager.perform(OWNER, record.id, action).await.unwrap();
        assert!(record.is_consistent(), "{action} left {record:?}");
        tokio::time::sleep(Duration::from_millis(3)).await;
        let stored = hub.manager.get(OWNER, record.id).await.unwrap();
        assert!(stored.is_consistent(), "{action} stored {stored:?}");
    }

    let running = hub
        .wait_for_status(record.id, DeploymentStatus::Running)
        .await;
    assert!(running.is_consistent());
}

#[tokio::test]
async fn rename_onto_existing_name_conflicts() {
    let hub = TestHub::new();
    hub.manager
        .create(OWNER, SpecBuilder::new("a", hub.model.id).build())
        .await
        .unwrap();
    let b = hub
        .manager
        .create(OWNER, SpecBuilder::new("b", hub.model.id).build())
        .await
        .unwrap();

    let err = hub
        .manager
        .update(
            OWNER,
            b.id,
            DeploymentPatch {
                name: Some("a".to_owned()),
                ..DeploymentPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::Conflict(_)));
    assert_eq!(hub.manager.get(OWNER, b.id).await.unwrap().name, "b");
}

#[tokio::test]
async fn double_start_settles_on_one_terminal_state() {
    let hub = TestHub::with_delay(Duration::from_millis(30));
    let record = hub
        .manager
        .create(OWNER, SpecBuilder::new("svc", hub.model.id).build())
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        hub.manager.start(OWNER, record.id),
        hub.manager.start(OWNER, record.id)
    );
    assert!(first.is_ok() || second.is_ok());

    let running = hub
        .wait_for_status(record.id, DeploymentStatus::Running)
        .await;
    hub.wait_idle().await;
    assert!(running.is_consistent());

    let events = hub.manager.logs(OWNER, record.id, None).await.unwrap();
    let terminal = events
        .iter()
        .filter(|e| {
            e.message.starts_with("Deployment successful") || e.message.starts_with("Deployment failed")
        })
        .count();
    assert_eq!(terminal, 1);
}
