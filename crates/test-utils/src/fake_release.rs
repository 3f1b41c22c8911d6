use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use pitrix::BoxFuture;
use pitrix::model::ReleaseDirective;
use pitrix::provider::{ReleaseApi, ReleaseStatus};

#[derive(Debug, Default)]
struct ReleaseState {
    releases: BTreeMap<(String, String), ReleaseStatus>,
    calls: Vec<String>,
    fail_install_with: Option<String>,
}

/// Release manager double keyed by `(namespace, release name)`.
#[derive(Debug, Default)]
pub struct FakeReleaseApi {
    state: Mutex<ReleaseState>,
}

impl FakeReleaseApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installed releases end up `Failed(status)` instead of deployed.
    pub fn failing_installs(self, status: &str) -> Self {
        self.state().fail_install_with = Some(status.to_string());
        self
    }

    fn state(&self) -> MutexGuard<'_, ReleaseState> {
        self.state.lock().expect("fake release state poisoned")
    }

    pub fn insert(&self, namespace: &str, name: &str, status: ReleaseStatus) {
        self.state()
            .releases
            .insert((namespace.to_string(), name.to_string()), status);
    }

    pub fn status_of(&self, namespace: &str, name: &str) -> Option<ReleaseStatus> {
        self.state()
            .releases
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }
}

impl ReleaseApi for FakeReleaseApi {
    fn install<'a>(&'a self, directive: &'a ReleaseDirective) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(format!("install:{}", directive.release_name));
            let status = match &state.fail_install_with {
                Some(raw) => ReleaseStatus::Failed(raw.clone()),
                None => ReleaseStatus::Deployed,
            };
            state.releases.insert(
                (directive.namespace.clone(), directive.release_name.clone()),
                status,
            );
            Ok(())
        })
    }

    fn uninstall<'a>(&'a self, namespace: &'a str, release_name: &'a str) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(format!("uninstall:{release_name}"));
            state
                .releases
                .remove(&(namespace.to_string(), release_name.to_string()));
            Ok(())
        })
    }

    fn scale<'a>(
        &'a self,
        namespace: &'a str,
        release_name: &'a str,
        up: bool,
    ) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(format!("scale:{release_name}:{up}"));
            let status = if up {
                ReleaseStatus::Deployed
            } else {
                ReleaseStatus::Suspended
            };
            state
                .releases
                .insert((namespace.to_string(), release_name.to_string()), status);
            Ok(())
        })
    }

    fn status<'a>(
        &'a self,
        namespace: &'a str,
        release_name: &'a str,
    ) -> BoxFuture<'a, Option<ReleaseStatus>> {
        Box::pin(async move { Ok(self.status_of(namespace, release_name)) })
    }
}
