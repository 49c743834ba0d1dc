//! The pipeline graph: nodes keyed by id plus the set of pad links.
//!
//! Structural mutation (`add_node`, `link`, `unlink`) takes `&mut self`, so
//! the caller serializes it. Every failing call leaves the graph unchanged.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::id::PadRef;
use crate::pipeline::node::Node;
use crate::pipeline::pad::PadDirection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

/// Coarse pipeline lifecycle. Pure bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PipelineState {
    #[default]
    Null,
    Ready,
    Playing,
    Paused,
}

/// Descriptive metadata for a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub pipeline_id: String,
    pub name: String,
    pub description: String,
}

/// A directed connection from a source pad to a sink pad.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Link {
    pub src: PadRef,
    pub dst: PadRef,
}

impl Link {
    pub fn new(src: PadRef, dst: PadRef) -> Self {
        Self { src, dst }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A graph of nodes and links.
pub struct Pipeline {
    config: PipelineConfig,
    nodes: HashMap<String, Box<dyn Node>>,
    links: BTreeSet<Link>,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            nodes: HashMap::new(),
            links: BTreeSet::new(),
            state: PipelineState::Null,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ── Nodes ──

    /// Register a node. Fails if a node with the same id already exists.
    pub fn add_node(&mut self, node: Box<dyn Node>) -> PipelineResult<()> {
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            return Err(PipelineError::DuplicateNode(id));
        }
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Remove a node and every link touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<Box<dyn Node>> {
        let touching: Vec<Link> = self
            .links
            .iter()
            .filter(|l| l.src.node == id || l.dst.node == id)
            .cloned()
            .collect();
        for link in touching {
            self.detach(&link);
            self.links.remove(&link);
        }
        self.nodes.remove(id)
    }

    pub fn node(&self, id: &str) -> Option<&dyn Node> {
        self.nodes.get(id).map(|n| n.as_ref())
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut (dyn Node + 'static)> {
        self.nodes.get_mut(id).map(|n| n.as_mut())
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Node ids in sorted order.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ── Links ──

    /// Connect `src_node.src_pad` to `dst_node.dst_pad`.
    pub fn link(
        &mut self,
        src_node: &str,
        src_pad: &str,
        dst_node: &str,
        dst_pad: &str,
    ) -> PipelineResult<()> {
        let src = self
            .nodes
            .get(src_node)
            .ok_or_else(|| PipelineError::UnknownNode(src_node.to_string()))?;
        let dst = self
            .nodes
            .get(dst_node)
            .ok_or_else(|| PipelineError::UnknownNode(dst_node.to_string()))?;

        let out_pad = src.pad(src_pad).ok_or_else(|| PipelineError::UnknownPad {
            node: src_node.to_string(),
            pad: src_pad.to_string(),
        })?;
        let in_pad = dst.pad(dst_pad).ok_or_else(|| PipelineError::UnknownPad {
            node: dst_node.to_string(),
            pad: dst_pad.to_string(),
        })?;

        if out_pad.direction() != PadDirection::Source {
            return Err(PipelineError::DirectionMismatch {
                node: src_node.to_string(),
                pad: src_pad.to_string(),
                expected: PadDirection::Source.as_str(),
            });
        }
        if in_pad.direction() != PadDirection::Sink {
            return Err(PipelineError::DirectionMismatch {
                node: dst_node.to_string(),
                pad: dst_pad.to_string(),
                expected: PadDirection::Sink.as_str(),
            });
        }
        if in_pad.has_upstream() {
            return Err(PipelineError::SinkAlreadyLinked {
                node: dst_node.to_string(),
                pad: dst_pad.to_string(),
            });
        }
        if !in_pad.caps().accepts(out_pad.caps()) {
            return Err(PipelineError::CapsMismatch(format!(
                "{}.{} [{}] -> {}.{} [{}]",
                src_node,
                src_pad,
                out_pad.caps(),
                dst_node,
                dst_pad,
                in_pad.caps()
            )));
        }

        let src_ref = PadRef::new(src_node, src_pad);
        let dst_ref = PadRef::new(dst_node, dst_pad);
        out_pad.attach_downstream(dst_ref.clone(), in_pad);
        in_pad.set_upstream(Some(src_ref.clone()));
        tracing::debug!("Linked {} -> {}", src_ref, dst_ref);
        self.links.insert(Link::new(src_ref, dst_ref));
        Ok(())
    }

    /// Remove a link. Fails with `LinkNotFound` if it does not exist.
    pub fn unlink(
        &mut self,
        src_node: &str,
        src_pad: &str,
        dst_node: &str,
        dst_pad: &str,
    ) -> PipelineResult<()> {
        let link = Link::new(PadRef::new(src_node, src_pad), PadRef::new(dst_node, dst_pad));
        if !self.links.remove(&link) {
            return Err(PipelineError::LinkNotFound(link.to_string()));
        }
        self.detach(&link);
        Ok(())
    }

    fn detach(&self, link: &Link) {
        if let Some(pad) = self.nodes.get(&link.src.node).and_then(|n| n.pad(&link.src.pad)) {
            pad.detach_downstream(&link.dst);
        }
        if let Some(pad) = self.nodes.get(&link.dst.node).and_then(|n| n.pad(&link.dst.pad)) {
            pad.set_upstream(None);
        }
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn has_link(&self, src_node: &str, src_pad: &str, dst_node: &str, dst_pad: &str) -> bool {
        self.links.contains(&Link::new(
            PadRef::new(src_node, src_pad),
            PadRef::new(dst_node, dst_pad),
        ))
    }

    // ── State ──

    pub fn set_state(&mut self, state: PipelineState) {
        if self.state != state {
            tracing::debug!(
                "Pipeline '{}' state {:?} -> {:?}",
                self.config.pipeline_id,
                self.state,
                state
            );
        }
        self.state = state;
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    // ── Topological sort (Kahn's algorithm) ──

    /// Node ids ordered so every node comes after the nodes feeding it.
    ///
    /// Nodes caught in a cycle are appended in id order after the acyclic part.
    pub fn execution_order(&self) -> Vec<String> {
        let mut in_degree: BTreeMap<&str, u32> =
            self.nodes.keys().map(|id| (id.as_str(), 0)).collect();
        let mut adj: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for link in &self.links {
            let (from, to) = (link.src.node.as_str(), link.dst.node.as_str());
            if in_degree.contains_key(from) && from != to {
                if let Some(d) = in_degree.get_mut(to) {
                    *d += 1;
                    adj.entry(from).or_default().push(to);
                }
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|&(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order: Vec<String> = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            if let Some(next) = adj.get(node) {
                for &to in next {
                    if let Some(d) = in_degree.get_mut(to) {
                        *d -= 1;
                        if *d == 0 {
                            queue.push_back(to);
                        }
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            tracing::warn!(
                "Pipeline graph has a cycle! Only {} of {} nodes ordered.",
                order.len(),
                self.nodes.len()
            );
            for (id, d) in &in_degree {
                if *d > 0 {
                    order.push(id.to_string());
                }
            }
        }

        order
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("nodes", &self.node_ids())
            .field("links", &self.links)
            .field("state", &self.state)
            .finish()
    }
}
