//! Helpers for driving a single node in unit tests.

use crate::pipeline::bus::Bus;
use crate::pipeline::caps::Caps;
use crate::pipeline::id::PadRef;
use crate::pipeline::node::{Node, NodeContext, NodeServices};
use crate::pipeline::pad::Pad;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

pub struct Harness {
    pub bus: Bus,
    pub services: NodeServices,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            bus: Bus::new(),
            services: NodeServices::default(),
        }
    }

    pub fn with_services(services: NodeServices) -> Self {
        Self {
            bus: Bus::new(),
            services,
        }
    }

    pub fn ctx(&self) -> NodeContext<'_> {
        NodeContext::new(&self.bus, &self.services)
    }

    /// Record every bus message as `"category: text"`.
    pub fn record_bus(&self) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        self.bus
            .subscribe(move |m| sink.lock().push(format!("{}: {}", m.category, m.text)));
        seen
    }
}

/// Payloads received on a test sink pad.
pub struct Captured {
    _pad: Arc<Pad>,
    data: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Captured {
    pub fn lock(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.data.lock()
    }
}

/// Attach a recording sink to the node's source pad `pad`.
pub fn capture<N: Node + ?Sized>(node: &N, pad: &str) -> Captured {
    let data = Arc::new(Mutex::new(Vec::new()));
    let sink = Pad::sink("capture", Caps::any());
    let store = Arc::clone(&data);
    sink.set_data_callback(move |bytes| store.lock().push(bytes.to_vec()));

    if let Some(src) = node.pad(pad) {
        src.attach_downstream(PadRef::new("test", "capture"), &sink);
    }
    Captured { _pad: sink, data }
}

/// A source pad wired into the node's sink pad `pad`.
pub struct Feeder {
    src: Arc<Pad>,
}

impl Feeder {
    pub fn push(&self, bytes: &[u8]) -> usize {
        self.src.push_to_connections(bytes)
    }
}

pub fn feed<N: Node + ?Sized>(node: &N, pad: &str) -> Feeder {
    let src = Pad::source("feed", Caps::any());
    if let Some(sink) = node.pad(pad) {
        src.attach_downstream(PadRef::new(node.id(), pad), sink);
    }
    Feeder { src }
}
