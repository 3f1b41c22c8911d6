// tests/driver_execution.rs

mod common;
use crate::common::builders::{fast_config, hbase_like, runtime};
use crate::common::init_tracing;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use pitrix::engine::{CoreDriver, Driver, DriverEvent, JobOutcome, TaskOutcome};
use pitrix::execute_plan;
use pitrix::pilot::{MetadataPilot, PilotHandler};
use pitrix::plan::{TaskPlan, build_plan};
use pitrix::provider::{FrontgateStatus, ReleaseStatus, StopSignal};
use pitrix::store::MemoryStore;
use pitrix::types::{JobAction, Provider, TaskAction};
use pitrix_test_utils::fake_executor::{Batch, FakeExecutor};
use pitrix_test_utils::fake_release::FakeReleaseApi;
use pitrix_test_utils::handlers_for;
use pitrix_test_utils::recording_agent::RecordingAgent;
use pitrix_test_utils::sim_cloud::SimCloud;

fn create_plan(provider: Provider) -> TaskPlan {
    let job = hbase_like().job(JobAction::CreateCluster, provider);
    build_plan(job, runtime(provider), fast_config()).unwrap()
}

fn planned_batches(plan: &TaskPlan) -> Vec<Batch> {
    plan.layers()
        .map(|layer| {
            layer
                .tasks
                .iter()
                .map(|t| (t.task_action, t.node_id.clone()))
                .collect()
        })
        .collect()
}

/// Run `plan` on a fake executor and return the report plus recorded batches.
async fn run_fake(
    plan: TaskPlan,
    configure: impl FnOnce(FakeExecutor) -> FakeExecutor,
) -> (pitrix::engine::JobReport, Vec<Batch>) {
    let (tx, rx) = mpsc::channel::<DriverEvent>(64);
    let batches = Arc::new(Mutex::new(Vec::new()));
    let executor = configure(FakeExecutor::new(tx, Arc::clone(&batches)));

    let driver = Driver::new(CoreDriver::new(plan), rx, executor, StopSignal::new());
    let report = tokio::time::timeout(Duration::from_secs(5), driver.run())
        .await
        .expect("driver timed out")
        .expect("driver errored");

    let batches = batches.lock().unwrap().clone();
    (report, batches)
}

#[tokio::test]
async fn layers_are_dispatched_one_barrier_at_a_time() {
    init_tracing();
    let plan = create_plan(Provider::QingCloud);
    let expected = planned_batches(&plan);

    let (report, batches) = run_fake(plan, |e| e).await;

    assert_eq!(report.outcome, JobOutcome::Succeeded);
    assert_eq!(batches, expected);
    assert_eq!(report.tasks.len(), expected.iter().map(Vec::len).sum::<usize>());
}

#[tokio::test]
async fn allowed_failures_do_not_stop_the_plan() {
    let plan = create_plan(Provider::QingCloud);
    let layers = plan.len();

    let (report, batches) =
        run_fake(plan, |e| e.failing(TaskAction::DeregisterCmd, "cln-m1")).await;

    assert_eq!(report.outcome, JobOutcome::Succeeded);
    assert_eq!(batches.len(), layers);
    let failed: Vec<_> = report
        .tasks
        .iter()
        .filter(|t| matches!(t.outcome, TaskOutcome::Failed(_)))
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].failure_allowed);
}

#[tokio::test]
async fn hard_failure_drains_the_layer_then_stops() {
    let plan = create_plan(Provider::QingCloud);

    let (report, batches) =
        run_fake(plan, |e| e.failing(TaskAction::RunInstances, "cln-s2")).await;

    // CreateVolumes, then RunInstances; nothing after.
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].len(), 5);
    match report.outcome {
        JobOutcome::Failed {
            action, node_id, ..
        } => {
            assert_eq!(action, TaskAction::RunInstances);
            assert_eq!(node_id, "cln-s2");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    // Every task of the failing layer still reported.
    assert_eq!(report.tasks.len(), 10);
}

struct World {
    cloud: Arc<SimCloud>,
    store: Arc<MemoryStore>,
    agent: Arc<RecordingAgent>,
    pilot: Arc<dyn PilotHandler>,
}

fn world(cloud: SimCloud) -> World {
    let cloud = Arc::new(cloud);
    let store = Arc::new(MemoryStore::new());
    let agent = Arc::new(RecordingAgent::new());
    let pilot: Arc<dyn PilotHandler> =
        Arc::new(MetadataPilot::new(Arc::clone(&store)).with_agent(agent.clone()));
    World {
        cloud,
        store,
        agent,
        pilot,
    }
}

#[tokio::test]
async fn create_cluster_runs_end_to_end() {
    init_tracing();
    let w = world(
        SimCloud::new(Provider::QingCloud).with_frontgate("cl-fg-1", FrontgateStatus::Active),
    );
    let config = fast_config();
    let stop = StopSignal::new();
    let handlers = handlers_for(&config, &stop, Arc::clone(&w.cloud), None);

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        execute_plan(create_plan(Provider::QingCloud), handlers, w.pilot, stop),
    )
    .await
    .expect("plan timed out")
    .unwrap();

    assert_eq!(report.outcome, JobOutcome::Succeeded);
    assert_eq!(w.cloud.instance_count(), 5);
    assert_eq!(w.cloud.volume_count(), 5);

    let snapshot = w.store.snapshot();
    assert_eq!(snapshot["/clusters/cl-hbase/cluster/cluster_id"], "cl-hbase");
    let host_keys: Vec<&str> = snapshot
        .keys()
        .filter(|k| k.starts_with("/clusters/cl-hbase/hosts/"))
        .map(|k| k.split('/').nth(5).unwrap())
        .collect();
    assert!(!host_keys.is_empty());
    assert!(
        host_keys.iter().all(|k| k.starts_with("i-")),
        "host records not keyed by instance id: {host_keys:?}"
    );
    assert!(
        snapshot.keys().all(|k| !k.contains("/cmd/")),
        "commands left registered"
    );

    let confd = w
        .agent
        .calls()
        .iter()
        .filter(|(action, _)| *action == TaskAction::StartConfd)
        .count();
    assert_eq!(confd, 5);
    assert_eq!(w.agent.waited().len(), 6);
}

#[tokio::test]
async fn finished_job_leaves_no_background_tasks() {
    let w = world(
        SimCloud::new(Provider::QingCloud).with_frontgate("cl-fg-1", FrontgateStatus::Active),
    );
    let config = fast_config();
    let stop = StopSignal::new();
    let handlers = handlers_for(&config, &stop, Arc::clone(&w.cloud), None);
    let metrics = tokio::runtime::Handle::current().metrics();
    let alive_before = metrics.num_alive_tasks();

    let report = execute_plan(create_plan(Provider::QingCloud), handlers, w.pilot, stop)
        .await
        .unwrap();
    assert_eq!(report.outcome, JobOutcome::Succeeded);

    // Aborted tasks are reaped on the next scheduler pass.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(metrics.num_alive_tasks(), alive_before);
}

#[tokio::test]
async fn failed_instance_stops_before_metadata() {
    let w = world(
        SimCloud::new(Provider::QingCloud)
            .with_frontgate("cl-fg-1", FrontgateStatus::Active)
            .fail_run_for("cln-s1"),
    );
    let config = fast_config();
    let stop = StopSignal::new();
    let handlers = handlers_for(&config, &stop, Arc::clone(&w.cloud), None);

    let report = execute_plan(create_plan(Provider::QingCloud), handlers, w.pilot, stop)
        .await
        .unwrap();

    match report.outcome {
        JobOutcome::Failed {
            action, node_id, ..
        } => {
            assert_eq!(action, TaskAction::RunInstances);
            assert_eq!(node_id, "cln-s1");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(w.store.snapshot().is_empty());
    assert!(w.agent.calls().is_empty());
}

#[tokio::test]
async fn stop_cancels_a_pending_frontgate_wait() {
    let w = world(
        SimCloud::new(Provider::QingCloud).with_frontgate("cl-fg-1", FrontgateStatus::Pending),
    );
    let config = fast_config();
    let stop = StopSignal::new();
    let handlers = handlers_for(&config, &stop, Arc::clone(&w.cloud), None);

    let stopper = stop.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.stop();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        execute_plan(create_plan(Provider::QingCloud), handlers, w.pilot, stop),
    )
    .await
    .expect("cancelled plan must end promptly")
    .unwrap();

    assert_eq!(report.outcome, JobOutcome::Cancelled);
    assert!(w.store.snapshot().is_empty());
}

#[tokio::test]
async fn release_create_installs_the_chart() {
    let w = world(SimCloud::new(Provider::QingCloud));
    let releases = Arc::new(FakeReleaseApi::new());
    let config = fast_config();
    let stop = StopSignal::new();
    let handlers = handlers_for(
        &config,
        &stop,
        Arc::clone(&w.cloud),
        Some(Arc::clone(&releases)),
    );

    let report = execute_plan(create_plan(Provider::Kubernetes), handlers, w.pilot, stop)
        .await
        .unwrap();

    assert_eq!(report.outcome, JobOutcome::Succeeded);
    assert_eq!(
        releases.status_of("pek3", "cl-hbase"),
        Some(ReleaseStatus::Deployed)
    );
    assert_eq!(releases.calls(), vec!["install:cl-hbase"]);
    assert!(w.cloud.calls().is_empty());
}
