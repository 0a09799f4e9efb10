//! Custom validation functions for configuration.

use once_cell::sync::Lazy;
use regex::Regex;
use validator::ValidationError;

use ringswitch_core::tree::{peer_name, FanOut};
use ringswitch_filter::FilterSpec;

use crate::SwitchConfig;

/// Longest endpoint name the ring substrate accepts.
pub const MAX_ENDPOINT_NAME: usize = 64;

static ENDPOINT_NAME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.:\-{}]+$").ok());

static ENGINE_NAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").ok());

fn matches(re: &Lazy<Option<Regex>>, value: &str) -> Result<bool, ValidationError> {
    re.as_ref()
        .map(|re| re.is_match(value))
        .ok_or_else(|| ValidationError::new("invalid_regex"))
}

/// Interface or pipe name, e.g. `eth0`, `vale0:p{1`.
pub fn validate_endpoint(name: &str) -> Result<(), ValidationError> {
    if !name.is_empty() && name.len() <= MAX_ENDPOINT_NAME && matches(&ENDPOINT_NAME, name)? {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_endpoint"))
    }
}

pub fn validate_engine_name(name: &str) -> Result<(), ValidationError> {
    if matches(&ENGINE_NAME, name)? {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_engine_name"))
    }
}

/// Channels carry SHARE or COPY only.
pub fn validate_fan_out(mode: &FanOut) -> Result<(), ValidationError> {
    match mode {
        FanOut::Share | FanOut::Copy => Ok(()),
        FanOut::Drop => Err(ValidationError::new("drop_carries_no_channels")),
    }
}

pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

pub fn validate_power_of_two(value: u32) -> Result<(), ValidationError> {
    if value.is_power_of_two() {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_power_of_two"))
    }
}

/// The filter must compile (valid hex, no empty patterns).
pub fn validate_filter(spec: &FilterSpec) -> Result<(), ValidationError> {
    spec.compile().map(|_| ()).map_err(|e| {
        let mut error = ValidationError::new("invalid_filter");
        error.message = Some(e.to_string().into());
        error
    })
}

/// Every channel source must be the linked interface or a leaf created by an
/// earlier channel, and a source keeps a single fan-out mode.
pub fn validate_topology(config: &SwitchConfig) -> Result<(), ValidationError> {
    let mut nodes: Vec<(String, Option<FanOut>)> = vec![(config.link.interface.clone(), None)];

    for channel in &config.pipeline {
        let Some(pos) = nodes.iter().position(|(n, _)| *n == channel.source) else {
            let mut error = ValidationError::new("unknown_source");
            error.message = Some(format!("no channel source named {}", channel.source).into());
            return Err(error);
        };
        match nodes[pos].1 {
            Some(mode) if mode != channel.mode => {
                let mut error = ValidationError::new("mode_conflict");
                error.message = Some(
                    format!(
                        "{} already fans out as {:?}, not {:?}",
                        channel.source, mode, channel.mode
                    )
                    .into(),
                );
                return Err(error);
            }
            _ => nodes[pos].1 = Some(channel.mode),
        }
        nodes.push((peer_name(&channel.destination), None));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn endpoint_names() {
        assert!(validate_endpoint("eth0").is_ok());
        assert!(validate_endpoint("vale0:p{1").is_ok());
        assert!(validate_endpoint("netmap:ix0-1").is_ok());
        assert!(validate_endpoint("").is_err());
        assert!(validate_endpoint("eth 0").is_err());
        assert!(validate_endpoint(&"x".repeat(65)).is_err());
    }

    #[test]
    fn fan_out_excludes_drop() {
        assert!(validate_fan_out(&FanOut::Share).is_ok());
        assert!(validate_fan_out(&FanOut::Drop).is_err());
    }

    #[test]
    fn log_levels() {
        assert!(validate_log_level("INFO").is_ok());
        assert!(validate_log_level("loud").is_err());
    }

    #[test]
    fn ring_sizes_are_powers_of_two() {
        assert!(validate_power_of_two(256).is_ok());
        assert!(validate_power_of_two(300).is_err());
    }

    #[test]
    fn bad_ring_size_fails_config_validation() {
        let mut config = SwitchConfig::default();
        config.simulator.ring_size = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn broken_filter_is_reported() {
        let spec = FilterSpec {
            patterns: vec!["hex:xyz".into()],
            ..Default::default()
        };
        assert_eq!(validate_filter(&spec).unwrap_err().code, "invalid_filter");
    }
}
