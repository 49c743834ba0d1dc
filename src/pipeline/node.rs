//! Node abstraction for the pipeline.
//!
//! A node owns a fixed set of pads (created in its constructor) and moves
//! through `Constructed → Configured → Started → Stopped`. Implementors
//! provide the `on_*` hooks; the provided `configure`/`start`/`process`/
//! `stop` methods enforce the lifecycle so the executor never has to.

use crate::perception::PerceptionPluginManager;
use crate::pipeline::bus::{Bus, BusMessage};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::nodes::SlamClient;
use crate::pipeline::pad::Pad;
use crate::pipeline::params::{NodeParams, ParamError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Constructed,
    Configured,
    Started,
    Stopped,
}

/// Collaborators shared by every node of a running flow.
#[derive(Clone)]
pub struct NodeServices {
    /// Detector and tracker backend registry.
    pub perception: Arc<PerceptionPluginManager>,
    /// Pose provider for SLAM nodes, when one is wired in.
    pub slam_client: Option<Arc<dyn SlamClient>>,
}

impl NodeServices {
    pub fn new(perception: Arc<PerceptionPluginManager>) -> Self {
        Self {
            perception,
            slam_client: None,
        }
    }

    pub fn with_slam_client(mut self, client: Arc<dyn SlamClient>) -> Self {
        self.slam_client = Some(client);
        self
    }
}

impl Default for NodeServices {
    fn default() -> Self {
        Self::new(Arc::new(PerceptionPluginManager::with_builtin_backends()))
    }
}

/// Context passed to node lifecycle hooks.
pub struct NodeContext<'a> {
    /// Diagnostics bus of the owning executor.
    pub bus: &'a Bus,
    /// Shared collaborators (backends, clients).
    pub services: &'a NodeServices,
    /// Current tick timestamp (relative to flow start).
    pub timestamp: Duration,
    /// Time since last tick.
    pub dt: Duration,
    /// Monotonic tick counter.
    pub tick: u64,
}

impl<'a> NodeContext<'a> {
    pub fn new(bus: &'a Bus, services: &'a NodeServices) -> Self {
        Self {
            bus,
            services,
            timestamp: Duration::ZERO,
            dt: Duration::ZERO,
            tick: 0,
        }
    }

    /// Post a diagnostic message on the bus.
    pub fn post(&self, category: &str, text: impl Into<String>) {
        self.bus.post(&BusMessage::new(category, text));
    }
}

/// Identity, pads and lifecycle state shared by every node implementation.
pub struct NodeCore {
    id: String,
    template_id: String,
    pads: Vec<Arc<Pad>>,
    state: NodeState,
}

impl NodeCore {
    pub fn new(id: impl Into<String>, template_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            template_id: template_id.into(),
            pads: Vec::new(),
            state: NodeState::Constructed,
        }
    }

    /// Add a pad at construction time.
    pub fn with_pad(mut self, pad: Arc<Pad>) -> Self {
        self.pads.push(pad);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn pads(&self) -> &[Arc<Pad>] {
        &self.pads
    }

    pub fn pad(&self, name: &str) -> Option<&Arc<Pad>> {
        self.pads.iter().find(|p| p.name() == name)
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn set_state(&mut self, state: NodeState) {
        self.state = state;
    }

    /// Push bytes out of the named source pad. Returns the number of sinks reached.
    pub fn push(&self, pad_name: &str, data: &[u8]) -> usize {
        match self.pad(pad_name) {
            Some(pad) if pad.is_source() => pad.push_to_connections(data),
            _ => {
                tracing::warn!("Node '{}' has no source pad '{}'", self.id, pad_name);
                0
            }
        }
    }
}

/// A processing step in the graph.
pub trait Node: Send {
    fn core(&self) -> &NodeCore;

    fn core_mut(&mut self) -> &mut NodeCore;

    /// Apply structured parameters. On error the node keeps its previous settings.
    fn on_configure(&mut self, _params: &NodeParams) -> Result<(), ParamError> {
        Ok(())
    }

    /// Called once before the first `process`.
    fn on_start(&mut self, _ctx: &mut NodeContext) -> PipelineResult<()> {
        Ok(())
    }

    /// Called every driver tick while started.
    fn on_process(&mut self, ctx: &mut NodeContext);

    /// Called once when the flow stops.
    fn on_stop(&mut self, _ctx: &mut NodeContext) {}

    fn id(&self) -> &str {
        self.core().id()
    }

    fn template_id(&self) -> &str {
        self.core().template_id()
    }

    fn state(&self) -> NodeState {
        self.core().state()
    }

    fn pad(&self, name: &str) -> Option<&Arc<Pad>> {
        self.core().pad(name)
    }

    fn configure(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        self.on_configure(params)?;
        if self.state() == NodeState::Constructed {
            self.core_mut().set_state(NodeState::Configured);
        }
        Ok(())
    }

    fn start(&mut self, ctx: &mut NodeContext) -> PipelineResult<()> {
        if self.state() == NodeState::Started {
            return Ok(());
        }
        self.on_start(ctx)?;
        self.core_mut().set_state(NodeState::Started);
        Ok(())
    }

    fn process(&mut self, ctx: &mut NodeContext) {
        if self.state() == NodeState::Started {
            self.on_process(ctx);
        }
    }

    fn stop(&mut self, ctx: &mut NodeContext) {
        if self.state() == NodeState::Started {
            self.on_stop(ctx);
        }
        self.core_mut().set_state(NodeState::Stopped);
    }
}

/// Buffer that collects payloads delivered to a sink pad.
///
/// The pad callback copies each payload in; the owning node drains it from
/// `on_process`. Holds at most `capacity` payloads, dropping the oldest.
#[derive(Clone)]
pub struct PadInbox {
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
    capacity: usize,
}

impl PadInbox {
    /// Register a callback on `pad` that feeds a new inbox.
    pub fn attach(pad: &Pad, capacity: usize) -> Self {
        let inbox = Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        };
        let feeder = inbox.clone();
        pad.set_data_callback(move |data| feeder.store(data));
        inbox
    }

    fn store(&self, data: &[u8]) {
        let mut queue = self.queue.lock();
        while queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(data.to_vec());
    }

    /// Most recent payload; discards anything older.
    pub fn take_latest(&self) -> Option<Vec<u8>> {
        let mut queue = self.queue.lock();
        let latest = queue.pop_back();
        queue.clear();
        latest
    }

    /// Every buffered payload in arrival order.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
