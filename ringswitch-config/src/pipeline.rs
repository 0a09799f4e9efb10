//! Channels and filters applied at startup, in order.

use serde::{Deserialize, Serialize};
use validator::Validate;

use ringswitch_core::tree::FanOut;
use ringswitch_filter::FilterSpec;

use crate::validation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ChannelConfig {
    /// Linked interface, or the leaf name of an earlier channel.
    #[validate(custom(function = validation::validate_endpoint))]
    pub source: String,

    #[validate(custom(function = validation::validate_endpoint))]
    pub destination: String,

    #[validate(custom(function = validation::validate_fan_out))]
    pub mode: FanOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct FilterConfig {
    /// Leaf name the filter is copied into.
    #[validate(custom(function = validation::validate_endpoint))]
    pub interface: String,

    #[validate(custom(function = validation::validate_filter))]
    pub filter: FilterSpec,
}
