//! Visual SLAM pose source.
//!
//! The SLAM engine itself runs out of process; this node forwards camera
//! frames to it through a [`SlamClient`] and publishes whatever pose the
//! client reports.

use crate::perception::PerceptionResult;
use crate::pipeline::caps::{media, Caps};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::factory::templates;
use crate::pipeline::node::{Node, NodeContext, NodeCore, NodeServices, PadInbox};
use crate::pipeline::packet::{CameraFrame, Pose3D, WirePacket};
use crate::pipeline::pad::Pad;
use crate::pipeline::params::{NodeParams, ParamError, SlamParams};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const IMAGE_IN: &str = "image_in";
pub const POSE_OUT: &str = "pose_out";

/// Connection to a pose estimator.
pub trait SlamClient: Send + Sync {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    /// Hand a frame to the estimator. Clients that track on their own
    /// camera ignore it.
    fn submit_frame(&self, _frame: &CameraFrame) {}

    /// Hand a raw point cloud payload to the estimator.
    fn submit_point_cloud(&self, _cloud: &[u8]) {}

    /// Most recent pose, if the estimator has one.
    fn latest_pose(&self) -> Option<Pose3D>;
}

/// Reads the latest pose from a file another process keeps overwriting
/// with one encoded [`Pose3D`].
#[derive(Debug, Clone)]
pub struct PoseFileClient {
    path: PathBuf,
}

impl PoseFileClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_pose(&self) -> PerceptionResult<Pose3D> {
        let bytes = std::fs::read(&self.path)?;
        Pose3D::decode(&bytes)
    }
}

impl SlamClient for PoseFileClient {
    fn name(&self) -> &str {
        "pose_file"
    }

    fn is_available(&self) -> bool {
        self.path.is_file()
    }

    fn latest_pose(&self) -> Option<Pose3D> {
        match self.read_pose() {
            Ok(pose) => Some(pose),
            Err(e) => {
                tracing::debug!("Pose file {} unreadable: {}", self.path.display(), e);
                None
            }
        }
    }
}

/// Client binding and identity fallback shared by the SLAM nodes.
#[derive(Default)]
pub(crate) struct SlamLink {
    client: Option<Arc<dyn SlamClient>>,
    injected: bool,
    fallback_ts: u64,
}

impl SlamLink {
    pub(crate) fn inject(&mut self, client: Arc<dyn SlamClient>) {
        self.client = Some(client);
        self.injected = true;
    }

    pub(crate) fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// The bound client, when it reports itself available.
    pub(crate) fn available(&self) -> Option<&Arc<dyn SlamClient>> {
        self.client.as_ref().filter(|c| c.is_available())
    }

    /// Take the service client unless one was injected, and restart the
    /// fallback clock.
    pub(crate) fn bind(&mut self, node_id: &str, services: &NodeServices, identity_output: bool) {
        if !self.injected {
            self.client = services.slam_client.clone();
        }
        match &self.client {
            Some(client) => tracing::info!("{}: pose from {}", node_id, client.name()),
            None => tracing::info!(
                "{}: no SLAM client, identity output {}",
                node_id,
                if identity_output { "on" } else { "off" }
            ),
        }
        self.fallback_ts = 0;
    }

    pub(crate) fn release(&mut self) {
        if !self.injected {
            self.client = None;
        }
    }

    /// Identity pose with the next fallback timestamp, when enabled.
    pub(crate) fn fallback(&mut self, enabled: bool) -> Option<Pose3D> {
        if !enabled {
            return None;
        }
        self.fallback_ts += 1;
        Some(Pose3D::identity(self.fallback_ts))
    }
}

pub struct VisualSlamNode {
    core: NodeCore,
    inbox: PadInbox,
    params: SlamParams,
    link: SlamLink,
}

impl VisualSlamNode {
    pub fn new(id: impl Into<String>) -> Self {
        let image_in = Pad::sink(IMAGE_IN, Caps::media(media::VIDEO_RAW));
        let inbox = PadInbox::attach(&image_in, 1);
        Self {
            core: NodeCore::new(id, templates::VISUAL_SLAM)
                .with_pad(image_in)
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
        if let Some(client) = self.link.available() {
            if let Some(bytes) = self.inbox.take_latest() {
                match CameraFrame::decode(&bytes) {
                    Ok(frame) => client.submit_frame(&frame),
                    Err(e) => tracing::warn!("{}: dropping frame: {}", self.core.id(), e),
                }
            }
            return client.latest_pose();
        }

        self.inbox.take_latest();
        self.link.fallback(self.params.output_when_no_client)
    }
}

impl Node for VisualSlamNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn on_configure(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        match params {
            NodeParams::VisualSlam(p) => {
                self.params = p.clone();
                Ok(())
            }
            NodeParams::None => Ok(()),
            _ => Err(ParamError::Mismatch {
                expected: "visual_slam",
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
