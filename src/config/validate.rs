// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{PlanConfig, RawPlanConfig, WaitPolicy};
use crate::errors::{PitrixError, Result};

impl TryFrom<RawPlanConfig> for PlanConfig {
    type Error = PitrixError;

    fn try_from(raw: RawPlanConfig) -> std::result::Result<Self, Self::Error> {
        validate_pilot(&raw)?;
        validate_defaults(&raw)?;
        let wait = validate_wait(&raw)?;
        Ok(PlanConfig::new_unchecked(
            raw.pilot,
            raw.frontgate,
            raw.defaults,
            wait,
        ))
    }
}

fn validate_pilot(cfg: &RawPlanConfig) -> Result<()> {
    if cfg.pilot.host.trim().is_empty() {
        return Err(PitrixError::ConfigError(
            "[pilot].host must not be empty".to_string(),
        ));
    }
    if cfg.pilot.port == 0 {
        return Err(PitrixError::ConfigError(
            "[pilot].port must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.frontgate.etcd_endpoints.is_empty() {
        return Err(PitrixError::ConfigError(
            "[frontgate].etcd_endpoints must list at least one endpoint".to_string(),
        ));
    }
    Ok(())
}

fn validate_defaults(cfg: &RawPlanConfig) -> Result<()> {
    if cfg.defaults.instance_size <= 0 {
        return Err(PitrixError::ConfigError(format!(
            "[defaults].instance_size must be > 0 (got {})",
            cfg.defaults.instance_size
        )));
    }
    if !cfg.defaults.mount_point.starts_with('/') {
        return Err(PitrixError::ConfigError(format!(
            "[defaults].mount_point must be an absolute path (got '{}')",
            cfg.defaults.mount_point
        )));
    }
    match cfg.defaults.file_system.as_str() {
        "ext4" | "xfs" => Ok(()),
        other => Err(PitrixError::ConfigError(format!(
            "[defaults].file_system must be \"ext4\" or \"xfs\" (got \"{other}\")"
        ))),
    }
}

fn validate_wait(cfg: &RawPlanConfig) -> Result<WaitPolicy> {
    let interval = parse_duration(&cfg.wait.interval)
        .map_err(|e| PitrixError::ConfigError(format!("[wait].interval: {e}")))?;
    let timeout = parse_duration(&cfg.wait.timeout)
        .map_err(|e| PitrixError::ConfigError(format!("[wait].timeout: {e}")))?;

    if interval.is_zero() {
        return Err(PitrixError::ConfigError(
            "[wait].interval must be greater than zero".to_string(),
        ));
    }
    if timeout < interval {
        return Err(PitrixError::ConfigError(format!(
            "[wait].timeout ({}) must not be shorter than [wait].interval ({})",
            cfg.wait.timeout, cfg.wait.interval
        )));
    }

    Ok(WaitPolicy {
        interval,
        timeout,
        max_transient_errors: cfg.wait.max_transient_errors,
    })
}

/// Parse a duration string such as `"500ms"`, `"2s"`, `"10m"` or `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration(" 10m ").unwrap(), Duration::from_secs(600));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
    }

    #[test]
    fn oversized_durations_are_errors() {
        let err = parse_duration("9999999999999999h").unwrap_err();
        assert!(err.contains("too large"), "got {err}");
        assert!(parse_duration("999999999999999999m").is_err());

        let mut raw = RawPlanConfig::default();
        raw.wait.timeout = "9999999999999999h".to_string();
        let err = PlanConfig::try_from(raw).unwrap_err();
        assert!(matches!(err, PitrixError::ConfigError(msg) if msg.contains("[wait].timeout")));
    }

    #[test]
    fn default_raw_config_is_valid() {
        let cfg = PlanConfig::try_from(RawPlanConfig::default()).unwrap();
        assert_eq!(cfg.wait, WaitPolicy::default());
        assert_eq!(cfg.defaults.instance_size, 20);
    }

    #[test]
    fn rejects_timeout_shorter_than_interval() {
        let mut raw = RawPlanConfig::default();
        raw.wait.interval = "30s".to_string();
        raw.wait.timeout = "10s".to_string();
        let err = PlanConfig::try_from(raw).unwrap_err();
        assert!(matches!(err, PitrixError::ConfigError(msg) if msg.contains("[wait].timeout")));
    }
}
