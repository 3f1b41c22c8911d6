pub mod builders;
pub mod fake_executor;
pub mod fake_release;
pub mod recording_agent;
pub mod sim_cloud;

use std::sync::{Arc, Once};

use pitrix::config::PlanConfig;
use pitrix::provider::{Handlers, HelmHandler, IaasHandler, StopSignal, Waiter};
use tracing_subscriber::{fmt, EnvFilter};

use crate::fake_release::FakeReleaseApi;
use crate::sim_cloud::SimCloud;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Handlers backed by `cloud` (and `releases` when given), polling with the
/// policy of `config`.
pub fn handlers_for(
    config: &PlanConfig,
    stop: &StopSignal,
    cloud: Arc<SimCloud>,
    releases: Option<Arc<FakeReleaseApi>>,
) -> Handlers {
    let waiter = Waiter::new(config.wait, stop.clone());
    let mut handlers = Handlers::new().register(Arc::new(IaasHandler::new(cloud, waiter.clone())));
    if let Some(releases) = releases {
        handlers = handlers.register(Arc::new(HelmHandler::new(releases, waiter)));
    }
    handlers
}
