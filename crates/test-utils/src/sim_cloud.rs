use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use pitrix::BoxFuture;
use pitrix::errors::PitrixError;
use pitrix::model::{InstanceDirective, VolumeDirective};
use pitrix::provider::{
    CloudApi, FrontgateStatus, InstanceInfo, InstanceStatus, SubnetInfo, VolumeInfo,
    VolumeStatus, VpcInfo,
};
use pitrix::types::Provider;

#[derive(Debug, Default)]
struct SimState {
    next_id: u32,
    instances: BTreeMap<String, InstanceInfo>,
    volumes: BTreeMap<String, VolumeInfo>,
    frontgates: BTreeMap<String, FrontgateStatus>,
    /// Mutating calls, in order: `"<call>:<subject>"`.
    calls: Vec<String>,
    describes: usize,
    fail_run_for: Option<String>,
}

/// In-memory cloud: every mutation settles immediately.
#[derive(Debug)]
pub struct SimCloud {
    provider: Provider,
    state: Mutex<SimState>,
}

impl SimCloud {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            state: Mutex::new(SimState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().expect("sim cloud state poisoned")
    }

    pub fn with_frontgate(self, frontgate_id: &str, status: FrontgateStatus) -> Self {
        self.state()
            .frontgates
            .insert(frontgate_id.to_string(), status);
        self
    }

    /// Make `run_instance` fail for the given node.
    pub fn fail_run_for(self, node_id: &str) -> Self {
        self.state().fail_run_for = Some(node_id.to_string());
        self
    }

    pub fn insert_instance(&self, instance_id: &str, status: InstanceStatus) {
        self.state().instances.insert(
            instance_id.to_string(),
            InstanceInfo {
                instance_id: instance_id.to_string(),
                status,
                private_ip: "10.0.0.99".to_string(),
                device: String::new(),
            },
        );
    }

    pub fn insert_volume(&self, volume_id: &str, status: VolumeStatus) {
        self.state().volumes.insert(
            volume_id.to_string(),
            VolumeInfo {
                volume_id: volume_id.to_string(),
                status,
                instance_id: String::new(),
                device: String::new(),
            },
        );
    }

    pub fn set_frontgate(&self, frontgate_id: &str, status: FrontgateStatus) {
        self.state()
            .frontgates
            .insert(frontgate_id.to_string(), status);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn describe_count(&self) -> usize {
        self.state().describes
    }

    pub fn instance(&self, instance_id: &str) -> Option<InstanceInfo> {
        self.state().instances.get(instance_id).cloned()
    }

    pub fn instance_count(&self) -> usize {
        self.state().instances.len()
    }

    pub fn volume_count(&self) -> usize {
        self.state().volumes.len()
    }
}

impl SimState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    fn instance_mut(&mut self, provider: Provider, id: &str) -> Result<&mut InstanceInfo, PitrixError> {
        self.instances
            .get_mut(id)
            .ok_or_else(|| PitrixError::ProviderApi {
                provider,
                message: format!("instance {id} not found"),
            })
    }

    fn volume_mut(&mut self, provider: Provider, id: &str) -> Result<&mut VolumeInfo, PitrixError> {
        self.volumes
            .get_mut(id)
            .ok_or_else(|| PitrixError::ProviderApi {
                provider,
                message: format!("volume {id} not found"),
            })
    }
}

impl CloudApi for SimCloud {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn describe_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BoxFuture<'a, Option<InstanceInfo>> {
        Box::pin(async move {
            let mut state = self.state();
            state.describes += 1;
            Ok(state.instances.get(instance_id).cloned())
        })
    }

    fn run_instance<'a>(&'a self, request: &'a InstanceDirective) -> BoxFuture<'a, String> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(format!("run_instance:{}", request.node_id));
            if state.fail_run_for.as_deref() == Some(request.node_id.as_str()) {
                return Err(PitrixError::ProviderApi {
                    provider: self.provider,
                    message: format!("quota exceeded for {}", request.node_id),
                });
            }
            let id = state.next("i");
            let ip = format!("10.0.0.{}", state.next_id);
            let mut device = String::new();
            for volume_id in request.volume_id.split(',').filter(|v| !v.is_empty()) {
                if let Some(volume) = state.volumes.get_mut(volume_id) {
                    volume.status = VolumeStatus::InUse;
                    volume.instance_id = id.clone();
                    volume.device = "/dev/vdb".to_string();
                    device = volume.device.clone();
                }
            }
            state.instances.insert(
                id.clone(),
                InstanceInfo {
                    instance_id: id.clone(),
                    status: InstanceStatus::Running,
                    private_ip: ip,
                    device,
                },
            );
            Ok(id)
        })
    }

    fn start_instance<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(format!("start_instance:{instance_id}"));
            state.instance_mut(self.provider, instance_id)?.status = InstanceStatus::Running;
            Ok(())
        })
    }

    fn stop_instance<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(format!("stop_instance:{instance_id}"));
            state.instance_mut(self.provider, instance_id)?.status = InstanceStatus::Stopped;
            Ok(())
        })
    }

    fn terminate_instance<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(format!("terminate_instance:{instance_id}"));
            state.instance_mut(self.provider, instance_id)?.status = InstanceStatus::Terminated;
            Ok(())
        })
    }

    fn describe_volume<'a>(&'a self, volume_id: &'a str) -> BoxFuture<'a, Option<VolumeInfo>> {
        Box::pin(async move {
            let mut state = self.state();
            state.describes += 1;
            Ok(state.volumes.get(volume_id).cloned())
        })
    }

    fn create_volume<'a>(&'a self, request: &'a VolumeDirective) -> BoxFuture<'a, String> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(format!("create_volume:{}", request.name));
            let id = state.next("vol");
            state.volumes.insert(
                id.clone(),
                VolumeInfo {
                    volume_id: id.clone(),
                    status: VolumeStatus::Available,
                    instance_id: String::new(),
                    device: String::new(),
                },
            );
            Ok(id)
        })
    }

    fn attach_volume<'a>(&'a self, volume_id: &'a str, instance_id: &'a str) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(format!("attach_volume:{volume_id}"));
            let volume = state.volume_mut(self.provider, volume_id)?;
            volume.status = VolumeStatus::InUse;
            volume.instance_id = instance_id.to_string();
            volume.device = "/dev/vdb".to_string();
            Ok(())
        })
    }

    fn detach_volume<'a>(&'a self, volume_id: &'a str, _instance_id: &'a str) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(format!("detach_volume:{volume_id}"));
            let volume = state.volume_mut(self.provider, volume_id)?;
            volume.status = VolumeStatus::Available;
            volume.instance_id.clear();
            volume.device.clear();
            Ok(())
        })
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut state = self.state();
            state.calls.push(format!("delete_volume:{volume_id}"));
            state.volumes.remove(volume_id);
            Ok(())
        })
    }

    fn describe_subnet<'a>(&'a self, subnet_id: &'a str) -> BoxFuture<'a, SubnetInfo> {
        Box::pin(async move {
            Ok(SubnetInfo {
                subnet_id: subnet_id.to_string(),
                vpc_id: "rtr-1".to_string(),
                zone: "pek3".to_string(),
                name: format!("subnet {subnet_id}"),
            })
        })
    }

    fn describe_vpc<'a>(&'a self, vpc_id: &'a str) -> BoxFuture<'a, VpcInfo> {
        Box::pin(async move {
            Ok(VpcInfo {
                vpc_id: vpc_id.to_string(),
                name: format!("vpc {vpc_id}"),
                subnets: vec!["vxnet-1".to_string()],
                eip: None,
            })
        })
    }

    fn describe_frontgate<'a>(
        &'a self,
        frontgate_id: &'a str,
    ) -> BoxFuture<'a, Option<FrontgateStatus>> {
        Box::pin(async move {
            let mut state = self.state();
            state.describes += 1;
            Ok(state.frontgates.get(frontgate_id).cloned())
        })
    }
}
