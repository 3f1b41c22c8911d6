// tests/handler_idempotency.rs

mod common;
use crate::common::builders::fast_config;
use crate::common::init_tracing;

use std::error::Error;
use std::sync::Arc;

use serde_json::{Value, json};

use pitrix::errors::PitrixError;
use pitrix::model::{InstanceDirective, ReleaseDirective, Task};
use pitrix::provider::{
    FrontgateStatus, HelmHandler, IaasHandler, InstanceStatus, ProviderHandler, ReleaseStatus,
    StopSignal, VolumeStatus, Waiter,
};
use pitrix::types::{Provider, TaskAction, Target};
use pitrix_test_utils::fake_release::FakeReleaseApi;
use pitrix_test_utils::sim_cloud::SimCloud;

type TestResult = Result<(), Box<dyn Error>>;

fn task(action: TaskAction, provider: Provider, directive: Value) -> Task {
    Task {
        job_id: "j-1".to_string(),
        owner: "usr-1".to_string(),
        task_action: action,
        target: Target::Provider(provider),
        node_id: "cln-1".to_string(),
        directive,
        failure_allowed: false,
        timeout: 0,
    }
}

fn iaas(cloud: &Arc<SimCloud>, stop: &StopSignal) -> IaasHandler<SimCloud> {
    IaasHandler::new(Arc::clone(cloud), Waiter::new(fast_config().wait, stop.clone()))
}

#[tokio::test]
async fn run_then_wait_writes_back_instance_facts() -> TestResult {
    init_tracing();
    let cloud = Arc::new(SimCloud::new(Provider::QingCloud));
    cloud.insert_volume("vol-1", VolumeStatus::Available);
    let handler = iaas(&cloud, &StopSignal::new());

    let mut t = task(
        TaskAction::RunInstances,
        Provider::QingCloud,
        json!({ "node_id": "cln-1", "image_id": "img-1", "volume_id": "vol-1" }),
    );
    handler.handle_subtask(&mut t).await?;
    handler.wait_subtask(&mut t).await?;

    let d: InstanceDirective = t.decode_directive()?;
    assert!(d.instance_id.starts_with("i-"));
    assert!(d.private_ip.starts_with("10.0.0."));
    assert_eq!(d.device, "/dev/vdb");
    Ok(())
}

#[tokio::test]
async fn resources_in_target_state_are_not_touched() -> TestResult {
    init_tracing();
    let cloud = Arc::new(SimCloud::new(Provider::QingCloud));
    cloud.insert_instance("i-running", InstanceStatus::Running);
    cloud.insert_instance("i-stopped", InstanceStatus::Stopped);
    cloud.insert_instance("i-gone", InstanceStatus::Terminated);
    cloud.insert_volume("vol-free", VolumeStatus::Available);
    let handler = iaas(&cloud, &StopSignal::new());

    let cases = [
        (TaskAction::RunInstances, json!({ "instance_id": "i-running" })),
        (TaskAction::StartInstances, json!({ "instance_id": "i-running" })),
        (TaskAction::StopInstances, json!({ "instance_id": "i-stopped" })),
        (TaskAction::DeleteInstances, json!({ "instance_id": "i-gone" })),
        (TaskAction::DeleteInstances, json!({ "instance_id": "i-never-existed" })),
        (TaskAction::DetachVolumes, json!({ "volume_id": "vol-free" })),
        (TaskAction::DeleteVolumes, json!({ "volume_id": "vol-never-existed" })),
        (TaskAction::CreateVolumes, json!({ "volume_id": "vol-free", "size": 10 })),
    ];
    for (action, directive) in cases {
        let mut t = task(action, Provider::QingCloud, directive);
        handler.handle_subtask(&mut t).await?;
        handler.wait_subtask(&mut t).await?;
    }

    assert!(cloud.calls().is_empty(), "unexpected calls: {:?}", cloud.calls());
    Ok(())
}

#[tokio::test]
async fn empty_directives_and_missing_ids_are_no_ops() -> TestResult {
    let cloud = Arc::new(SimCloud::new(Provider::Aws));
    let handler = iaas(&cloud, &StopSignal::new());

    for action in [
        TaskAction::RunInstances,
        TaskAction::StopInstances,
        TaskAction::DeleteVolumes,
        TaskAction::WaitFrontgateAvailable,
    ] {
        let mut t = task(action, Provider::Aws, Value::Null);
        handler.handle_subtask(&mut t).await?;
        handler.wait_subtask(&mut t).await?;
    }

    for action in [
        TaskAction::StopInstances,
        TaskAction::DeleteInstances,
        TaskAction::DetachVolumes,
        TaskAction::DeleteVolumes,
    ] {
        let mut t = task(action, Provider::Aws, json!({ "node_id": "cln-1" }));
        handler.handle_subtask(&mut t).await?;
    }

    assert!(cloud.calls().is_empty());
    assert_eq!(cloud.describe_count(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_resource_aborts_the_wait() {
    let cloud = Arc::new(SimCloud::new(Provider::QingCloud));
    cloud.insert_instance("i-broken", InstanceStatus::Failed("ceased".to_string()));
    let handler = iaas(&cloud, &StopSignal::new());

    let mut t = task(
        TaskAction::StartInstances,
        Provider::QingCloud,
        json!({ "instance_id": "i-broken" }),
    );
    let err = handler.wait_subtask(&mut t).await.unwrap_err();
    match err {
        PitrixError::ResourceFailed { status, .. } => assert_eq!(status, "ceased"),
        other => panic!("expected ResourceFailed, got {other:?}"),
    }
    assert_eq!(cloud.describe_count(), 1);
}

#[tokio::test]
async fn pending_resource_times_out() {
    let cloud = Arc::new(SimCloud::new(Provider::QingCloud));
    cloud.insert_instance("i-slow", InstanceStatus::Pending);
    let handler = iaas(&cloud, &StopSignal::new());

    let mut t = task(
        TaskAction::StartInstances,
        Provider::QingCloud,
        json!({ "instance_id": "i-slow", "timeout": 1 }),
    );
    let err = handler.wait_subtask(&mut t).await.unwrap_err();
    assert!(matches!(err, PitrixError::WaitTimeout { .. }), "got {err:?}");
}

#[tokio::test]
async fn stop_signal_cancels_a_wait() {
    let cloud = Arc::new(
        SimCloud::new(Provider::QingCloud).with_frontgate("cl-fg-1", FrontgateStatus::Pending),
    );
    let stop = StopSignal::new();
    let handler = iaas(&cloud, &stop);

    let mut t = task(
        TaskAction::WaitFrontgateAvailable,
        Provider::QingCloud,
        json!({ "cluster_id": "cl-1", "frontgate_id": "cl-fg-1" }),
    );

    let stopper = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        stopper.stop();
    });

    let err = tokio::time::timeout(
        std::time::Duration::from_secs(1),
        handler.wait_subtask(&mut t),
    )
    .await
    .expect("wait must end once stopped")
    .unwrap_err();
    assert!(matches!(err, PitrixError::Cancelled(_)), "got {err:?}");
}

#[tokio::test]
async fn frontgate_wait_holds_until_the_transition_settles() -> TestResult {
    let cloud = Arc::new(
        SimCloud::new(Provider::QingCloud).with_frontgate("cl-fg-1", FrontgateStatus::Updating),
    );
    let handler = iaas(&cloud, &StopSignal::new());

    let settle = Arc::clone(&cloud);
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        settle.set_frontgate("cl-fg-1", FrontgateStatus::Active);
    });

    let mut t = task(
        TaskAction::WaitFrontgateAvailable,
        Provider::QingCloud,
        json!({ "cluster_id": "cl-1", "frontgate_id": "cl-fg-1" }),
    );
    handler.wait_subtask(&mut t).await?;
    assert!(cloud.describe_count() > 1, "wait returned while still updating");
    Ok(())
}

fn release_task(action: TaskAction) -> Task {
    let directive = ReleaseDirective {
        runtime_id: "rt-1".to_string(),
        cluster_id: "cl-1".to_string(),
        namespace: "pek3".to_string(),
        release_name: "cl-1".to_string(),
        values: json!({}),
        timeout: 1,
    };
    task(
        action,
        Provider::Kubernetes,
        serde_json::to_value(directive).unwrap(),
    )
}

#[tokio::test]
async fn failed_release_is_fatal_immediately() {
    let api = Arc::new(FakeReleaseApi::new().failing_installs("ImagePullBackOff"));
    let handler = HelmHandler::new(
        Arc::clone(&api),
        Waiter::new(fast_config().wait, StopSignal::new()),
    );

    let mut t = release_task(TaskAction::RunInstances);
    handler.handle_subtask(&mut t).await.unwrap();
    let err = handler.wait_subtask(&mut t).await.unwrap_err();
    match err {
        PitrixError::ResourceFailed { status, .. } => assert_eq!(status, "ImagePullBackOff"),
        other => panic!("expected ResourceFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn release_operations_skip_when_already_done() -> TestResult {
    let api = Arc::new(FakeReleaseApi::new());
    api.insert("pek3", "cl-1", ReleaseStatus::Suspended);
    let handler = HelmHandler::new(
        Arc::clone(&api),
        Waiter::new(fast_config().wait, StopSignal::new()),
    );

    let mut run = release_task(TaskAction::RunInstances);
    handler.handle_subtask(&mut run).await?;
    let mut stop = release_task(TaskAction::StopInstances);
    handler.handle_subtask(&mut stop).await?;
    handler.wait_subtask(&mut stop).await?;
    assert!(api.calls().is_empty());

    let mut start = release_task(TaskAction::StartInstances);
    handler.handle_subtask(&mut start).await?;
    handler.wait_subtask(&mut start).await?;
    let mut delete = release_task(TaskAction::DeleteInstances);
    handler.handle_subtask(&mut delete).await?;
    handler.wait_subtask(&mut delete).await?;
    assert_eq!(api.calls(), vec!["scale:cl-1:true", "uninstall:cl-1"]);

    // Second delete finds nothing to remove.
    handler.handle_subtask(&mut delete).await?;
    assert_eq!(api.calls().len(), 2);
    Ok(())
}

#[tokio::test]
async fn volume_actions_are_no_ops_on_kubernetes() -> TestResult {
    let api = Arc::new(FakeReleaseApi::new());
    let handler = HelmHandler::new(
        Arc::clone(&api),
        Waiter::new(fast_config().wait, StopSignal::new()),
    );
    let mut t = task(TaskAction::CreateVolumes, Provider::Kubernetes, json!({ "size": 10 }));
    handler.handle_subtask(&mut t).await?;
    handler.wait_subtask(&mut t).await?;
    assert!(api.calls().is_empty());
    Ok(())
}
