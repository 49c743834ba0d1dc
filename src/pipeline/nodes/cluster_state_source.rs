//! Swarm membership source.

use crate::pipeline::caps::{media, Caps};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::factory::templates;
use crate::pipeline::node::{Node, NodeContext, NodeCore};
use crate::pipeline::packet::{ClusterState, WirePacket};
use crate::pipeline::pad::Pad;
use crate::pipeline::params::{ClusterStateParams, NodeParams, ParamError};

pub const CLUSTER_STATE_OUT: &str = "cluster_state_out";

/// Publishes this vehicle's cluster role and peers every tick.
pub struct ClusterStateSourceNode {
    core: NodeCore,
    params: ClusterStateParams,
    timestamp_ns: u64,
}

impl ClusterStateSourceNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            core: NodeCore::new(id, templates::CLUSTER_STATE_SOURCE)
                .with_pad(Pad::source(CLUSTER_STATE_OUT, Caps::media(media::CLUSTER_STATE))),
            params: ClusterStateParams::default(),
            timestamp_ns: 0,
        }
    }

    pub fn params(&self) -> &ClusterStateParams {
        &self.params
    }

    pub fn state(&self) -> ClusterState {
        ClusterState {
            self_id: self.params.self_id.clone(),
            role: self.params.role.clone(),
            members: self.params.members.clone(),
            timestamp_ns: self.timestamp_ns,
        }
    }
}

impl Node for ClusterStateSourceNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn on_configure(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        match params {
            NodeParams::ClusterState(p) => {
                self.params = p.clone();
                Ok(())
            }
            NodeParams::None => Ok(()),
            _ => Err(ParamError::Mismatch {
                expected: "cluster_state_source",
            }),
        }
    }

    fn on_start(&mut self, _ctx: &mut NodeContext) -> PipelineResult<()> {
        tracing::info!(
            "{}: '{}' as {} with {} peer(s)",
            self.core.id(),
            self.params.self_id,
            self.params.role,
            self.params.members.len()
        );
        self.timestamp_ns = 0;
        Ok(())
    }

    fn on_process(&mut self, _ctx: &mut NodeContext) {
        self.timestamp_ns += 1;
        self.core.push(CLUSTER_STATE_OUT, &self.state().encode());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::nodes::test_support::{capture, Harness};
    use serde_json::json;

    #[test]
    fn test_publishes_configured_membership() {
        let harness = Harness::new();
        let mut node = ClusterStateSourceNode::new("cluster");
        let params = NodeParams::from_json(
            templates::CLUSTER_STATE_SOURCE,
            &json!({"self_id": "uav_1", "role": "leader", "members": "uav_2,uav_3"}),
        )
        .unwrap();
        node.configure(&params).unwrap();
        let out = capture(&node, CLUSTER_STATE_OUT);
        let mut ctx = harness.ctx();
        node.start(&mut ctx).unwrap();
        node.process(&mut ctx);
        node.process(&mut ctx);

        let packets = out.lock();
        assert_eq!(packets.len(), 2);
        let state = ClusterState::decode(&packets[1]).unwrap();
        assert_eq!(state.self_id, "uav_1");
        assert_eq!(state.role, "leader");
        assert_eq!(state.members, vec!["uav_2", "uav_3"]);
        assert_eq!(state.timestamp_ns, 2);
    }
}
