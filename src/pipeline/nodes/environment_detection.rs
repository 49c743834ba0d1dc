//! Environment status source.

use crate::pipeline::caps::{media, Caps};
use crate::pipeline::factory::templates;
use crate::pipeline::node::{Node, NodeContext, NodeCore};
use crate::pipeline::packet::{EnvironmentStatus, WirePacket};
use crate::pipeline::pad::Pad;
use crate::pipeline::params::{NodeParams, ParamError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ENV_STATUS_OUT: &str = "env_status_out";

/// Operating conditions the perception stack adapts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentState {
    #[default]
    Normal,
    GpsDenied,
    LowLight,
    Unknown,
}

impl EnvironmentState {
    /// Wire code.
    pub fn code(self) -> i32 {
        match self {
            EnvironmentState::Normal => 0,
            EnvironmentState::GpsDenied => 1,
            EnvironmentState::LowLight => 2,
            EnvironmentState::Unknown => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(EnvironmentState::Normal),
            1 => Some(EnvironmentState::GpsDenied),
            2 => Some(EnvironmentState::LowLight),
            3 => Some(EnvironmentState::Unknown),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnvironmentState::Normal => "normal",
            EnvironmentState::GpsDenied => "gps_denied",
            EnvironmentState::LowLight => "low_light",
            EnvironmentState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publishes the current environment assessment every tick.
///
/// The state starts from `default_state` and can be overridden at runtime by
/// whatever owns the node (a GNSS monitor, an operator command).
pub struct EnvironmentDetectionNode {
    core: NodeCore,
    state: EnvironmentState,
    confidence: f32,
}

impl EnvironmentDetectionNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            core: NodeCore::new(id, templates::ENVIRONMENT_DETECTION)
                .with_pad(Pad::source(ENV_STATUS_OUT, Caps::media(media::ENVIRONMENT))),
            state: EnvironmentState::Normal,
            confidence: 1.0,
        }
    }

    pub fn environment_state(&self) -> EnvironmentState {
        self.state
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn set_environment_state(&mut self, state: EnvironmentState) {
        if state != self.state {
            tracing::debug!("{}: environment {} -> {}", self.core.id(), self.state, state);
        }
        self.state = state;
    }

    /// Clamped to `[0, 1]`.
    pub fn set_confidence(&mut self, confidence: f32) {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
    }

    pub fn status(&self) -> EnvironmentStatus {
        EnvironmentStatus {
            state: self.state,
            confidence: self.confidence,
        }
    }
}

impl Node for EnvironmentDetectionNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn on_configure(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        match params {
            NodeParams::Environment(p) => {
                self.set_environment_state(p.default_state);
                self.set_confidence(p.confidence);
                Ok(())
            }
            NodeParams::None => Ok(()),
            _ => Err(ParamError::Mismatch {
                expected: "environment_detection",
            }),
        }
    }

    fn on_process(&mut self, _ctx: &mut NodeContext) {
        self.core.push(ENV_STATUS_OUT, &self.status().encode());
    }
}
