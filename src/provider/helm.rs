// src/provider/helm.rs

//! Handler contract for Kubernetes runtimes, one release per cluster.
//!
//! Instance actions map onto release operations; volume actions are no-ops
//! because storage is declared by the chart. A release reported as failed
//! aborts the wait at once, without spending the transient error budget.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::BoxFuture;
use crate::errors::{PitrixError, Result};
use crate::model::{ReleaseDirective, Task};
use crate::provider::wait::{PollStatus, Waiter};
use crate::provider::{ProviderHandler, SubnetInfo, VpcInfo};
use crate::types::Provider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseStatus {
    Pending,
    Deployed,
    /// Scaled to zero replicas.
    Suspended,
    Failed(String),
}

/// Boundary to the release manager. `status` returns `None` for unknown
/// releases.
pub trait ReleaseApi: Send + Sync {
    fn install<'a>(&'a self, directive: &'a ReleaseDirective) -> BoxFuture<'a>;
    fn uninstall<'a>(&'a self, namespace: &'a str, release_name: &'a str) -> BoxFuture<'a>;
    /// Scale every workload of the release up (`true`) or down to zero.
    fn scale<'a>(&'a self, namespace: &'a str, release_name: &'a str, up: bool)
    -> BoxFuture<'a>;
    fn status<'a>(
        &'a self,
        namespace: &'a str,
        release_name: &'a str,
    ) -> BoxFuture<'a, Option<ReleaseStatus>>;
}

pub struct HelmHandler<R> {
    api: Arc<R>,
    waiter: Waiter,
}

impl<R> fmt::Debug for HelmHandler<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HelmHandler")
            .field("waiter", &self.waiter)
            .finish_non_exhaustive()
    }
}

/// What a wait expects the release to look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Deployed,
    Suspended,
    Gone,
}

impl<R: ReleaseApi> HelmHandler<R> {
    pub fn new(api: Arc<R>, waiter: Waiter) -> Self {
        Self { api, waiter }
    }

    fn directive(&self, task: &Task) -> Result<Option<ReleaseDirective>> {
        if task.directive_is_empty() {
            debug!(node_id = %task.node_id, action = %task.task_action, "empty directive; nothing to do");
            return Ok(None);
        }
        let d: ReleaseDirective = task.decode_directive()?;
        if d.release_name.is_empty() {
            return Err(PitrixError::InvalidDirective {
                action: task.task_action,
                reason: "release name must not be empty".to_string(),
            });
        }
        Ok(Some(d))
    }

    async fn wait_for(&self, task: &Task, expect: Expect) -> Result<()> {
        let Some(d) = self.directive(task)? else {
            return Ok(());
        };
        let what = format!("release {}/{} ({expect:?})", d.namespace, d.release_name);
        let api = &*self.api;
        let (namespace, name) = (d.namespace.as_str(), d.release_name.as_str());
        self.waiter
            .poll_until(&what, d.timeout, move || async move {
                let status = api.status(namespace, name).await?;
                Ok(match (expect, status) {
                    (_, Some(ReleaseStatus::Failed(raw))) => PollStatus::Failed(raw),
                    (Expect::Gone, None) => PollStatus::Ready(()),
                    (Expect::Gone, Some(_)) => PollStatus::Pending,
                    (_, None) => PollStatus::Failed("release not found".to_string()),
                    (Expect::Deployed, Some(ReleaseStatus::Deployed)) => PollStatus::Ready(()),
                    (Expect::Suspended, Some(ReleaseStatus::Suspended)) => PollStatus::Ready(()),
                    (_, Some(_)) => PollStatus::Pending,
                })
            })
            .await
    }

    async fn scale(&self, task: &Task, up: bool) -> Result<()> {
        let Some(d) = self.directive(task)? else {
            return Ok(());
        };
        let wanted = if up {
            ReleaseStatus::Deployed
        } else {
            ReleaseStatus::Suspended
        };
        match self.api.status(&d.namespace, &d.release_name).await? {
            None => Err(PitrixError::ResourceFailed {
                what: format!("release {}/{}", d.namespace, d.release_name),
                status: "not found".to_string(),
            }),
            Some(status) if status == wanted => {
                info!(release = %d.release_name, ?status, "release already in target state; skipping");
                Ok(())
            }
            Some(_) => {
                info!(release = %d.release_name, up, "scaling release");
                self.api.scale(&d.namespace, &d.release_name, up).await
            }
        }
    }
}

fn noop<'a>(task: &Task) -> BoxFuture<'a> {
    debug!(action = %task.task_action, "volumes are managed by the chart; nothing to do");
    Box::pin(async { Ok(()) })
}

impl<R: ReleaseApi + 'static> ProviderHandler for HelmHandler<R> {
    fn provider(&self) -> Provider {
        Provider::Kubernetes
    }

    fn run_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(d) = self.directive(task)? else {
                return Ok(());
            };
            if let Some(status) = self.api.status(&d.namespace, &d.release_name).await? {
                info!(release = %d.release_name, ?status, "release already installed; skipping");
                return Ok(());
            }
            info!(
                job_id = %task.job_id,
                namespace = %d.namespace,
                release = %d.release_name,
                "installing release"
            );
            self.api.install(&d).await
        })
    }

    fn wait_run_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.wait_for(task, Expect::Deployed).await })
    }

    fn stop_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.scale(task, false).await })
    }

    fn wait_stop_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.wait_for(task, Expect::Suspended).await })
    }

    fn start_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.scale(task, true).await })
    }

    fn wait_start_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.wait_for(task, Expect::Deployed).await })
    }

    fn delete_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move {
            let Some(d) = self.directive(task)? else {
                return Ok(());
            };
            if self
                .api
                .status(&d.namespace, &d.release_name)
                .await?
                .is_none()
            {
                info!(release = %d.release_name, "release already gone; skipping");
                return Ok(());
            }
            info!(release = %d.release_name, "uninstalling release");
            self.api.uninstall(&d.namespace, &d.release_name).await
        })
    }

    fn wait_delete_instances<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async move { self.wait_for(task, Expect::Gone).await })
    }

    fn create_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        noop(task)
    }

    fn wait_create_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        noop(task)
    }

    fn attach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        noop(task)
    }

    fn wait_attach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        noop(task)
    }

    fn detach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        noop(task)
    }

    fn wait_detach_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        noop(task)
    }

    fn delete_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        noop(task)
    }

    fn wait_delete_volumes<'a>(&'a self, task: &'a mut Task) -> BoxFuture<'a> {
        noop(task)
    }

    fn wait_frontgate_available<'a>(&'a self, _task: &'a mut Task) -> BoxFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn describe_subnet<'a>(
        &'a self,
        _runtime_id: &'a str,
        _subnet_id: &'a str,
    ) -> BoxFuture<'a, SubnetInfo> {
        Box::pin(async {
            Err(PitrixError::UnsupportedAction(
                "kubernetes runtimes have no subnets".to_string(),
            ))
        })
    }

    fn describe_vpc<'a>(
        &'a self,
        _runtime_id: &'a str,
        _vpc_id: &'a str,
    ) -> BoxFuture<'a, VpcInfo> {
        Box::pin(async {
            Err(PitrixError::UnsupportedAction(
                "kubernetes runtimes have no vpcs".to_string(),
            ))
        })
    }
}
