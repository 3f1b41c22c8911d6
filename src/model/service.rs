// src/model/service.rs

//! Lifecycle service descriptors.
//!
//! Cluster documents carry each service as a JSON string on the role's
//! common record. They are decoded exactly once, when the cluster wrapper is
//! built, into [`ServiceSpec`] values keyed by [`ServiceKind`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{PitrixError, Result};
use crate::types::ServiceKind;

/// One lifecycle service of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceSpec {
    /// Command the drone runs on the node.
    pub cmd: String,

    /// Execution tier: lower orders run first, equal orders share a layer.
    pub order: i32,

    /// Command timeout in seconds; 0 means "use the planner default".
    pub timeout: u64,

    /// Cap on how many nodes of the role run this service; 0 means all.
    pub nodes_to_execute_on: usize,

    /// Only meaningful for the init service: run it after the start service.
    pub post_start_service: bool,
}

impl ServiceSpec {
    pub fn has_cmd(&self) -> bool {
        !self.cmd.trim().is_empty()
    }
}

/// Decode one service descriptor. Blank input means "role has no such service".
pub fn decode_service(role: &str, kind: &ServiceKind, raw: &str) -> Result<Option<ServiceSpec>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<ServiceSpec>(raw)
        .map(Some)
        .map_err(|e| PitrixError::InvalidService {
            role: role.to_string(),
            service: kind.to_string(),
            reason: e.to_string(),
        })
}

/// Decode the `custom_service` blob: a JSON object of name → descriptor.
pub fn decode_custom_services(role: &str, raw: &str) -> Result<BTreeMap<ServiceKind, ServiceSpec>> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let custom: BTreeMap<String, ServiceSpec> =
        serde_json::from_str(raw).map_err(|e| PitrixError::InvalidService {
            role: role.to_string(),
            service: "CustomService".to_string(),
            reason: e.to_string(),
        })?;
    Ok(custom
        .into_iter()
        .map(|(name, spec)| (ServiceKind::Custom(name), spec))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_descriptor() {
        let spec = decode_service(
            "master",
            &ServiceKind::Init,
            r#"{"cmd":"/opt/init.sh","order":2,"timeout":300,"nodes_to_execute_on":1,"post_start_service":true}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(spec.order, 2);
        assert_eq!(spec.nodes_to_execute_on, 1);
        assert!(spec.post_start_service);
    }

    #[test]
    fn blank_descriptor_means_no_service() {
        assert!(decode_service("master", &ServiceKind::Start, "  ").unwrap().is_none());
    }

    #[test]
    fn malformed_descriptor_is_fatal() {
        let err = decode_service("master", &ServiceKind::Start, "{cmd: nope").unwrap_err();
        match err {
            PitrixError::InvalidService { role, service, .. } => {
                assert_eq!(role, "master");
                assert_eq!(service, "StartService");
            }
            other => panic!("expected InvalidService, got {other:?}"),
        }
    }

    #[test]
    fn custom_services_are_keyed_by_name() {
        let map = decode_custom_services("web", r#"{"reload":{"cmd":"nginx -s reload"}}"#).unwrap();
        assert!(map.contains_key(&ServiceKind::Custom("reload".to_string())));
    }
}
