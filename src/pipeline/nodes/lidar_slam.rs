//! Lidar SLAM pose source.
//!
//! Point clouds arriving on `pointcloud_in` are opaque to the runtime and
//! go straight to the bound [`SlamClient`]. When the client has no pose yet
//! (or there is no client) the node falls back to an identity pose.

use super::visual_slam::{SlamClient, SlamLink};
use crate::pipeline::caps::{media, Caps};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::factory::templates;
use crate::pipeline::node::{Node, NodeContext, NodeCore, PadInbox};
use crate::pipeline::packet::{Pose3D, WirePacket};
use crate::pipeline::pad::Pad;
use crate::pipeline::params::{NodeParams, ParamError, SlamParams};
use std::sync::Arc;

pub const POINTCLOUD_IN: &str = "pointcloud_in";
pub const POSE_OUT: &str = "pose_out";

pub struct LidarSlamNode {
    core: NodeCore,
    inbox: PadInbox,
    params: SlamParams,
    link: SlamLink,
}

impl LidarSlamNode {
    pub fn new(id: impl Into<String>) -> Self {
        let cloud_in = Pad::sink(POINTCLOUD_IN, Caps::media(media::POINT_CLOUD));
        let inbox = PadInbox::attach(&cloud_in, 1);
        Self {
            core: NodeCore::new(id, templates::LIDAR_SLAM)
                .with_pad(cloud_in)
                .with_pad(Pad::source(POSE_OUT, Caps::media(media::POSE))),
            inbox,
            params: SlamParams::default(),
            link: SlamLink::default(),
        }
    }

    pub fn with_client(mut self, client: Arc<dyn SlamClient>) -> Self {
        self.link.inject(client);
        self
    }

    pub fn has_client(&self) -> bool {
        self.link.has_client()
    }

    fn current_pose(&mut self) -> Option<Pose3D> {
        let cloud = self.inbox.take_latest();
        if let Some(client) = self.link.available() {
            if let Some(cloud) = cloud {
                client.submit_point_cloud(&cloud);
            }
            if let Some(pose) = client.latest_pose() {
                return Some(pose);
            }
        }
        self.link.fallback(self.params.output_when_no_client)
    }
}

impl Node for LidarSlamNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn on_configure(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        match params {
            NodeParams::LidarSlam(p) => {
                self.params = p.clone();
                Ok(())
            }
            NodeParams::None => Ok(()),
            _ => Err(ParamError::Mismatch {
                expected: "lidar_slam",
            }),
        }
    }

    fn on_start(&mut self, ctx: &mut NodeContext) -> PipelineResult<()> {
        self.link
            .bind(self.core.id(), ctx.services, self.params.output_when_no_client);
        Ok(())
    }

    fn on_process(&mut self, _ctx: &mut NodeContext) {
        if let Some(pose) = self.current_pose() {
            self.core.push(POSE_OUT, &pose.encode());
        }
    }

    fn on_stop(&mut self, _ctx: &mut NodeContext) {
        self.link.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::nodes::test_support::{capture, feed, Harness};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Reports a pose only once it has seen a cloud.
    #[derive(Default)]
    struct CloudCounter {
        clouds: Mutex<Vec<usize>>,
    }

    impl SlamClient for CloudCounter {
        fn name(&self) -> &str {
            "cloud_counter"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn submit_point_cloud(&self, cloud: &[u8]) {
            self.clouds.lock().push(cloud.len());
        }
        fn latest_pose(&self) -> Option<Pose3D> {
            let seen = self.clouds.lock().len();
            (seen > 0).then(|| {
                let mut pose = Pose3D::identity(1_000);
                pose.x = seen as f64;
                pose
            })
        }
    }

    #[test]
    fn test_pads_and_template() {
        let node = LidarSlamNode::new("lidar");
        assert_eq!(node.template_id(), templates::LIDAR_SLAM);
        assert!(node.pad(POINTCLOUD_IN).is_some());
        assert!(node.pad(POSE_OUT).is_some());
    }

    #[test]
    fn test_identity_pose_without_client() {
        let harness = Harness::new();
        let mut node = LidarSlamNode::new("lidar");
        let out = capture(&node, POSE_OUT);
        let mut ctx = harness.ctx();
        node.start(&mut ctx).unwrap();
        for _ in 0..3 {
            node.process(&mut ctx);
        }

        let poses = out.lock();
        assert_eq!(poses.len(), 3);
        assert_eq!(Pose3D::decode(&poses[2]).unwrap(), Pose3D::identity(3));
    }

    #[test]
    fn test_silent_without_client_when_disabled() {
        let harness = Harness::new();
        let mut node = LidarSlamNode::new("lidar");
        let params =
            NodeParams::from_json(templates::LIDAR_SLAM, &json!({"output_when_no_client": false}))
                .unwrap();
        node.configure(&params).unwrap();
        let out = capture(&node, POSE_OUT);
        let mut ctx = harness.ctx();
        node.start(&mut ctx).unwrap();
        node.process(&mut ctx);
        assert!(out.lock().is_empty());
    }

    #[test]
    fn test_clouds_reach_client_and_fallback_until_pose() {
        let harness = Harness::new();
        let client = Arc::new(CloudCounter::default());
        let mut node = LidarSlamNode::new("lidar").with_client(client.clone());
        let input = feed(&node, POINTCLOUD_IN);
        let out = capture(&node, POSE_OUT);
        let mut ctx = harness.ctx();
        node.start(&mut ctx).unwrap();

        // No cloud yet: the client has no pose, identity goes out.
        node.process(&mut ctx);
        input.push(&[0u8; 48]);
        node.process(&mut ctx);

        let poses = out.lock();
        assert_eq!(poses.len(), 2);
        assert_eq!(Pose3D::decode(&poses[0]).unwrap(), Pose3D::identity(1));
        assert_eq!(Pose3D::decode(&poses[1]).unwrap().x, 1.0);
        assert_eq!(*client.clouds.lock(), vec![48]);

        drop(poses);
        node.stop(&mut ctx);
        assert!(node.has_client());
    }

    #[test]
    fn test_visual_params_rejected() {
        let mut node = LidarSlamNode::new("lidar");
        let params = NodeParams::from_json(templates::VISUAL_SLAM, &json!({})).unwrap();
        assert!(node.configure(&params).is_err());
    }
}
