// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_INSTANCE_SIZE: i64 = 20;
pub const DEFAULT_MOUNT_POINT: &str = "/data";
pub const DEFAULT_FILE_SYSTEM: &str = "ext4";

/// Planner configuration as read from a TOML file.
///
/// ```toml
/// [pilot]
/// host = "openpitrix-pilot-service"
/// port = 9110
///
/// [frontgate]
/// image_id = "img-frontgate"
/// etcd_endpoints = ["127.0.0.1:2379"]
///
/// [defaults]
/// instance_size = 20
///
/// [wait]
/// interval = "2s"
/// timeout = "10m"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPlanConfig {
    #[serde(default)]
    pub pilot: PilotSection,

    #[serde(default)]
    pub frontgate: FrontgateSection,

    #[serde(default)]
    pub defaults: DefaultsSection,

    #[serde(default)]
    pub wait: RawWaitSection,
}

/// Validated planner configuration, threaded into every frame.
#[derive(Debug, Clone)]
pub struct PlanConfig {
    pub pilot: PilotSection,
    pub frontgate: FrontgateSection,
    pub defaults: DefaultsSection,
    pub wait: WaitPolicy,
}

impl PlanConfig {
    pub(crate) fn new_unchecked(
        pilot: PilotSection,
        frontgate: FrontgateSection,
        defaults: DefaultsSection,
        wait: WaitPolicy,
    ) -> Self {
        Self {
            pilot,
            frontgate,
            defaults,
            wait,
        }
    }
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            pilot: PilotSection::default(),
            frontgate: FrontgateSection::default(),
            defaults: DefaultsSection::default(),
            wait: WaitPolicy::default(),
        }
    }
}

/// `[pilot]` section: where frontgates and drones reach the control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct PilotSection {
    #[serde(default = "default_pilot_host")]
    pub host: String,

    #[serde(default = "default_pilot_port")]
    pub port: u16,
}

fn default_pilot_host() -> String {
    "openpitrix-pilot-service".to_string()
}

fn default_pilot_port() -> u16 {
    9110
}

impl Default for PilotSection {
    fn default() -> Self {
        Self {
            host: default_pilot_host(),
            port: default_pilot_port(),
        }
    }
}

/// `[frontgate]` section: defaults pushed to frontgate instances.
#[derive(Debug, Clone, Deserialize)]
pub struct FrontgateSection {
    /// Image used when the frontgate cluster document does not name one.
    #[serde(default)]
    pub image_id: Option<String>,

    #[serde(default = "default_etcd_endpoints")]
    pub etcd_endpoints: Vec<String>,

    /// Port the frontgate listens on for drone connections.
    #[serde(default = "default_frontgate_port")]
    pub listen_port: u16,
}

fn default_etcd_endpoints() -> Vec<String> {
    vec!["127.0.0.1:2379".to_string()]
}

fn default_frontgate_port() -> u16 {
    9111
}

impl Default for FrontgateSection {
    fn default() -> Self {
        Self {
            image_id: None,
            etcd_endpoints: default_etcd_endpoints(),
            listen_port: default_frontgate_port(),
        }
    }
}

/// `[defaults]` section: values applied when a cluster document omits them.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_instance_size")]
    pub instance_size: i64,

    #[serde(default = "default_mount_point")]
    pub mount_point: String,

    #[serde(default = "default_file_system")]
    pub file_system: String,

    /// Fallback image when neither the role nor the frontgate section has one.
    #[serde(default)]
    pub image_id: Option<String>,
}

fn default_instance_size() -> i64 {
    DEFAULT_INSTANCE_SIZE
}

fn default_mount_point() -> String {
    DEFAULT_MOUNT_POINT.to_string()
}

fn default_file_system() -> String {
    DEFAULT_FILE_SYSTEM.to_string()
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            instance_size: default_instance_size(),
            mount_point: default_mount_point(),
            file_system: default_file_system(),
            image_id: None,
        }
    }
}

/// `[wait]` section as written in TOML (durations are strings like `"2s"`).
#[derive(Debug, Clone, Deserialize)]
pub struct RawWaitSection {
    #[serde(default = "default_interval")]
    pub interval: String,

    #[serde(default = "default_timeout")]
    pub timeout: String,

    /// Consecutive describe failures tolerated inside one wait.
    #[serde(default = "default_max_transient_errors")]
    pub max_transient_errors: u32,
}

fn default_interval() -> String {
    "2s".to_string()
}

fn default_timeout() -> String {
    "10m".to_string()
}

fn default_max_transient_errors() -> u32 {
    3
}

impl Default for RawWaitSection {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
            max_transient_errors: default_max_transient_errors(),
        }
    }
}

/// Polling policy used by every `Wait*` handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
    pub max_transient_errors: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(600),
            max_transient_errors: default_max_transient_errors(),
        }
    }
}
