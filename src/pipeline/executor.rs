//! Flow executor: builds pipelines from flow definitions and drives them.
//!
//! Each running flow gets a dedicated driver thread. Each tick:
//! 1. Lock the live pipeline.
//! 2. Call `process()` on every node in topological order, so data pushed
//!    by a source reaches its sinks within the same tick.
//! 3. Rate-limit to the configured Hz, waking early on shutdown.
//!
//! `stop()` joins the driver thread before stopping nodes, so no pad
//! callback fires after it returns. `update_flow()` builds and starts the
//! replacement pipeline before touching the running one.

use crate::pipeline::bus::{category, Bus, BusMessage};
use crate::pipeline::error::{FlowError, FlowResult};
use crate::pipeline::factory::NodeFactory;
use crate::pipeline::flow::FlowDefinition;
use crate::pipeline::graph::{Pipeline, PipelineConfig, PipelineState};
use crate::pipeline::node::{NodeContext, NodeServices};
use crate::pipeline::params::NodeParams;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default driver tick rate in Hz.
pub const DEFAULT_TICK_RATE_HZ: u32 = 30;

/// A pipeline shared between the executor, its driver thread and observers.
pub type SharedPipeline = Arc<Mutex<Pipeline>>;

/// A mounted, started pipeline and the thread driving it.
struct ActiveFlow {
    flow_id: String,
    pipeline: SharedPipeline,
    order: Vec<String>,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

/// Loads flow definitions and runs them.
pub struct FlowExecutor {
    factory: Arc<NodeFactory>,
    services: NodeServices,
    bus: Arc<Bus>,
    tick_rate_hz: u32,
    definition: Option<FlowDefinition>,
    active: Option<ActiveFlow>,
}

impl FlowExecutor {
    /// Executor backed by the global node factory.
    pub fn new() -> Self {
        Self::with_factory(NodeFactory::global())
    }

    pub fn with_factory(factory: Arc<NodeFactory>) -> Self {
        Self {
            factory,
            services: NodeServices::default(),
            bus: Arc::new(Bus::new()),
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            definition: None,
            active: None,
        }
    }

    pub fn with_services(mut self, services: NodeServices) -> Self {
        self.services = services;
        self
    }

    pub fn with_bus(mut self, bus: Arc<Bus>) -> Self {
        self.bus = bus;
        self
    }

    /// Driver tick rate. `0` runs ticks back to back.
    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    pub fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    pub fn factory(&self) -> &Arc<NodeFactory> {
        &self.factory
    }

    pub fn services(&self) -> &NodeServices {
        &self.services
    }

    // ── Definitions ──

    /// Parse and store a flow definition. On error the previous one is kept.
    pub fn load_flow(&mut self, text: &str) -> FlowResult<()> {
        let definition = FlowDefinition::parse(text)?;
        tracing::info!(
            "Loaded flow '{}' ({} nodes, {} edges)",
            definition.flow_id,
            definition.nodes.len(),
            definition.edges.len()
        );
        self.definition = Some(definition);
        Ok(())
    }

    /// Read a flow definition from disk.
    pub fn load_flow_from_file(&mut self, path: impl AsRef<Path>) -> FlowResult<()> {
        let text = std::fs::read_to_string(path.as_ref())?;
        self.load_flow(&text)
    }

    pub fn flow_definition(&self) -> Option<&FlowDefinition> {
        self.definition.as_ref()
    }

    // ── Lifecycle ──

    /// Build, start and mount the loaded flow.
    pub fn start(&mut self) -> FlowResult<()> {
        if self.active.is_some() {
            return Err(FlowError::AlreadyRunning);
        }
        let definition = self.definition.clone().ok_or(FlowError::NoDefinition)?;
        let active = self.launch(&definition)?;
        self.active = Some(active);
        Ok(())
    }

    /// Stop the running flow. The loaded definition is kept.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            self.shutdown(active);
        }
    }

    /// Replace the running flow without a gap.
    ///
    /// The new pipeline is built and started first; only then is it swapped
    /// in and the old one stopped. On any error the running flow and the
    /// loaded definition are left as they were.
    pub fn update_flow(&mut self, text: &str) -> FlowResult<()> {
        let definition = FlowDefinition::parse(text)?;
        if self.active.is_none() {
            self.definition = Some(definition);
            return self.start();
        }

        let replacement = self.launch(&definition)?;
        let previous = self.active.replace(replacement);
        tracing::info!("Hot-swapped to flow '{}'", definition.flow_id);
        self.definition = Some(definition);
        if let Some(previous) = previous {
            self.shutdown(previous);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// The live pipeline, if a flow is running.
    pub fn pipeline(&self) -> Option<SharedPipeline> {
        self.active.as_ref().map(|a| a.pipeline.clone())
    }

    /// Ticks completed by the current driver thread.
    pub fn tick_count(&self) -> u64 {
        self.active
            .as_ref()
            .map(|a| a.ticks.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    // ── Building ──

    fn report(&self, category: &str, text: String) {
        self.bus.post(&BusMessage::new(category, text));
    }

    /// Create nodes and links. Nothing is started yet.
    fn build_pipeline(&self, definition: &FlowDefinition) -> FlowResult<Pipeline> {
        let mut pipeline = Pipeline::new(PipelineConfig {
            pipeline_id: definition.flow_id.clone(),
            name: definition.name.clone(),
            description: format!("flow version {}", definition.version),
        });

        for node_def in &definition.nodes {
            let node = self
                .factory
                .create_node(&node_def.template_id, &node_def.node_id, &node_def.parameters)
                .ok_or_else(|| FlowError::UnknownTemplate {
                    node_id: node_def.node_id.clone(),
                    template_id: node_def.template_id.clone(),
                })?;
            pipeline.add_node(node)?;
        }

        for edge in &definition.edges {
            pipeline
                .link(&edge.from_node_id, &edge.from_port, &edge.to_node_id, &edge.to_port)
                .map_err(|source| FlowError::Link {
                    edge_id: edge.edge_id.clone(),
                    source,
                })?;
        }

        pipeline.set_state(PipelineState::Ready);
        Ok(pipeline)
    }

    /// Apply each node's parameters. Rejected parameters are reported and
    /// the node keeps its defaults.
    fn configure_nodes(&self, pipeline: &mut Pipeline, definition: &FlowDefinition) {
        for node_def in &definition.nodes {
            let Some(node) = pipeline.node_mut(&node_def.node_id) else {
                continue;
            };
            let result = NodeParams::from_json(&node_def.template_id, &node_def.parameters)
                .and_then(|params| node.configure(&params));
            if let Err(e) = result {
                tracing::warn!("Node '{}' parameters rejected: {}", node_def.node_id, e);
                self.report(
                    category::CONFIG,
                    format!("node '{}' parameters rejected: {}", node_def.node_id, e),
                );
            }
        }
    }

    fn launch(&self, definition: &FlowDefinition) -> FlowResult<ActiveFlow> {
        let mut pipeline = self.build_pipeline(definition)?;
        self.configure_nodes(&mut pipeline, definition);

        let order = pipeline.execution_order();
        let mut ctx = NodeContext::new(&self.bus, &self.services);
        for (idx, id) in order.iter().enumerate() {
            let Some(node) = pipeline.node_mut(id) else {
                continue;
            };
            if let Err(e) = node.start(&mut ctx) {
                tracing::warn!("Node '{}' failed to start: {}", id, e);
                stop_nodes(&mut pipeline, &order[..idx], &mut ctx);
                return Err(e.into());
            }
        }
        pipeline.set_state(PipelineState::Playing);

        let pipeline = Arc::new(Mutex::new(pipeline));
        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, shutdown_rx) = bounded(1);

        let driver = Driver {
            pipeline: pipeline.clone(),
            order: order.clone(),
            bus: self.bus.clone(),
            services: self.services.clone(),
            running: running.clone(),
            ticks: ticks.clone(),
            shutdown_rx,
            tick_rate_hz: self.tick_rate_hz,
        };

        let handle = std::thread::Builder::new()
            .name(format!("flow-{}", definition.flow_id))
            .spawn(move || driver.run());
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                let mut guard = pipeline.lock();
                stop_nodes(&mut guard, &order, &mut ctx);
                guard.set_state(PipelineState::Null);
                return Err(FlowError::Spawn(e.to_string()));
            }
        };

        tracing::info!(
            "Flow '{}' started with {} nodes",
            definition.flow_id,
            order.len()
        );
        self.report(
            category::FLOW,
            format!("flow '{}' started ({} nodes)", definition.flow_id, order.len()),
        );

        Ok(ActiveFlow {
            flow_id: definition.flow_id.clone(),
            pipeline,
            order,
            running,
            ticks,
            shutdown_tx,
            handle: Some(handle),
        })
    }

    fn shutdown(&self, mut active: ActiveFlow) {
        active.running.store(false, Ordering::Release);
        let _ = active.shutdown_tx.try_send(());
        if let Some(handle) = active.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Driver thread for flow '{}' panicked", active.flow_id);
            }
        }

        let mut ctx = NodeContext::new(&self.bus, &self.services);
        let mut pipeline = active.pipeline.lock();
        stop_nodes(&mut pipeline, &active.order, &mut ctx);
        pipeline.set_state(PipelineState::Null);
        drop(pipeline);

        tracing::info!("Flow '{}' stopped", active.flow_id);
        self.report(category::FLOW, format!("flow '{}' stopped", active.flow_id));
    }
}

impl Default for FlowExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FlowExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Stop nodes in reverse execution order (sinks first).
fn stop_nodes(pipeline: &mut Pipeline, order: &[String], ctx: &mut NodeContext) {
    for id in order.iter().rev() {
        if let Some(node) = pipeline.node_mut(id) {
            node.stop(ctx);
        }
    }
}

/// State owned by a driver thread.
struct Driver {
    pipeline: SharedPipeline,
    order: Vec<String>,
    bus: Arc<Bus>,
    services: NodeServices,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    shutdown_rx: Receiver<()>,
    tick_rate_hz: u32,
}

impl Driver {
    fn run(self) {
        tracing::debug!("Driver thread started");
        let start_time = Instant::now();
        let mut last_tick: Option<Instant> = None;
        let mut tick: u64 = 0;

        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            let dt = last_tick
                .map(|t| now.duration_since(t))
                .unwrap_or(Duration::ZERO);
            last_tick = Some(now);

            {
                let mut pipeline = self.pipeline.lock();
                let mut ctx = NodeContext {
                    bus: &self.bus,
                    services: &self.services,
                    timestamp: now.duration_since(start_time),
                    dt,
                    tick,
                };
                for id in &self.order {
                    if let Some(node) = pipeline.node_mut(id) {
                        node.process(&mut ctx);
                    }
                }
            }

            tick += 1;
            self.ticks.store(tick, Ordering::Release);

            if !self.rate_limit(now) {
                break;
            }
        }
        tracing::debug!("Driver thread exiting after {} ticks", tick);
    }

    /// Wait out the rest of the tick. Returns false when shutdown was requested.
    fn rate_limit(&self, tick_start: Instant) -> bool {
        let remaining = if self.tick_rate_hz == 0 {
            Duration::ZERO
        } else {
            let target_interval = Duration::from_nanos(1_000_000_000 / self.tick_rate_hz as u64);
            target_interval.saturating_sub(tick_start.elapsed())
        };

        if remaining.is_zero() {
            return match self.shutdown_rx.try_recv() {
                Ok(()) => false,
                Err(crossbeam_channel::TryRecvError::Empty) => true,
                Err(crossbeam_channel::TryRecvError::Disconnected) => false,
            };
        }

        match self.shutdown_rx.recv_timeout(remaining) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
            Err(RecvTimeoutError::Timeout) => true,
        }
    }
}
