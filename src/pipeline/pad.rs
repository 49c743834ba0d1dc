//! Pads: named, directional connection points owned by a node.
//!
//! A `Source` pad fans out to any number of sink pads. A `Sink` pad accepts
//! at most one upstream connection and holds at most one data callback.
//! `push_to_connections` runs every connected sink callback synchronously on
//! the caller's thread; there is no queue, so a slow sink stalls its producer.

use crate::pipeline::caps::Caps;
use crate::pipeline::id::PadRef;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Callback invoked with the raw bytes pushed into a sink pad.
pub type DataCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Whether a pad produces or consumes data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadDirection {
    Source,
    Sink,
}

impl PadDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            PadDirection::Source => "Source",
            PadDirection::Sink => "Sink",
        }
    }
}

struct Connection {
    peer: PadRef,
    pad: Weak<Pad>,
}

/// A typed connection point on a node.
pub struct Pad {
    name: String,
    direction: PadDirection,
    caps: Caps,
    callback: Mutex<Option<DataCallback>>,
    downstream: Mutex<Vec<Connection>>,
    upstream: Mutex<Option<PadRef>>,
}

impl Pad {
    pub fn new(name: impl Into<String>, direction: PadDirection, caps: Caps) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            direction,
            caps,
            callback: Mutex::new(None),
            downstream: Mutex::new(Vec::new()),
            upstream: Mutex::new(None),
        })
    }

    /// Create a source (output) pad.
    pub fn source(name: impl Into<String>, caps: Caps) -> Arc<Self> {
        Self::new(name, PadDirection::Source, caps)
    }

    /// Create a sink (input) pad.
    pub fn sink(name: impl Into<String>, caps: Caps) -> Arc<Self> {
        Self::new(name, PadDirection::Sink, caps)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    pub fn caps(&self) -> &Caps {
        &self.caps
    }

    pub fn is_source(&self) -> bool {
        self.direction == PadDirection::Source
    }

    pub fn is_sink(&self) -> bool {
        self.direction == PadDirection::Sink
    }

    /// Register the data callback, replacing any previous one.
    pub fn set_data_callback<F>(&self, callback: F)
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        *self.callback.lock() = Some(Box::new(callback));
    }

    pub fn clear_data_callback(&self) {
        *self.callback.lock() = None;
    }

    pub fn has_data_callback(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Whether a sink pad already has an upstream link.
    pub fn has_upstream(&self) -> bool {
        self.upstream.lock().is_some()
    }

    /// The upstream pad feeding this sink, if linked.
    pub fn upstream(&self) -> Option<PadRef> {
        self.upstream.lock().clone()
    }

    /// Addresses of every downstream sink this source feeds.
    pub fn downstream(&self) -> Vec<PadRef> {
        self.downstream
            .lock()
            .iter()
            .map(|c| c.peer.clone())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        match self.direction {
            PadDirection::Source => self.downstream.lock().len(),
            PadDirection::Sink => usize::from(self.has_upstream()),
        }
    }

    pub(crate) fn attach_downstream(&self, peer: PadRef, pad: &Arc<Pad>) {
        self.downstream.lock().push(Connection {
            peer,
            pad: Arc::downgrade(pad),
        });
    }

    pub(crate) fn detach_downstream(&self, peer: &PadRef) -> bool {
        let mut downstream = self.downstream.lock();
        let before = downstream.len();
        downstream.retain(|c| &c.peer != peer);
        downstream.len() != before
    }

    pub(crate) fn set_upstream(&self, peer: Option<PadRef>) {
        *self.upstream.lock() = peer;
    }

    /// Deliver `data` to every connected sink callback, in link order.
    ///
    /// Returns the number of sinks that had a callback to receive it.
    pub fn push_to_connections(&self, data: &[u8]) -> usize {
        let targets: Vec<Arc<Pad>> = self
            .downstream
            .lock()
            .iter()
            .filter_map(|c| c.pad.upgrade())
            .collect();

        let mut delivered = 0;
        for target in targets {
            if target.deliver(data) {
                delivered += 1;
            }
        }
        delivered
    }

    fn deliver(&self, data: &[u8]) -> bool {
        let mut callback = self.callback.lock();
        match callback.as_mut() {
            Some(cb) => {
                cb(data);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pad")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("caps", &self.caps)
            .field("connections", &self.connection_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(src: &Arc<Pad>, sink: &Arc<Pad>) {
        src.attach_downstream(PadRef::new("b", sink.name()), sink);
        sink.set_upstream(Some(PadRef::new("a", src.name())));
    }

    #[test]
    fn test_push_reaches_sink_callback_unmodified() {
        let src = Pad::source("out", Caps::any());
        let sink = Pad::sink("in", Caps::any());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_buf = received.clone();
        sink.set_data_callback(move |data| sink_buf.lock().extend_from_slice(data));
        connect(&src, &sink);

        assert_eq!(src.push_to_connections(b"hello"), 1);
        assert_eq!(received.lock().as_slice(), b"hello");
    }

    #[test]
    fn test_push_without_callback_is_dropped() {
        let src = Pad::source("out", Caps::any());
        let sink = Pad::sink("in", Caps::any());
        connect(&src, &sink);
        assert_eq!(src.push_to_connections(&[1, 2, 3]), 0);
    }

    #[test]
    fn test_fan_out_to_multiple_sinks() {
        let src = Pad::source("out", Caps::any());
        let counter = Arc::new(Mutex::new(0usize));
        let sinks: Vec<_> = (0..3)
            .map(|i| {
                let sink = Pad::sink(format!("in{}", i), Caps::any());
                let c = counter.clone();
                sink.set_data_callback(move |data| *c.lock() += data.len());
                connect(&src, &sink);
                sink
            })
            .collect();

        assert_eq!(src.push_to_connections(&[0u8; 4]), 3);
        assert_eq!(*counter.lock(), 12);
        assert_eq!(src.connection_count(), 3);
        assert!(sinks.iter().all(|s| s.has_upstream()));
    }

    #[test]
    fn test_dropped_sink_is_skipped() {
        let src = Pad::source("out", Caps::any());
        {
            let sink = Pad::sink("in", Caps::any());
            sink.set_data_callback(|_| {});
            connect(&src, &sink);
        }
        assert_eq!(src.push_to_connections(b"x"), 0);
    }

    #[test]
    fn test_detach_downstream() {
        let src = Pad::source("out", Caps::any());
        let sink = Pad::sink("in", Caps::any());
        connect(&src, &sink);
        assert!(src.detach_downstream(&PadRef::new("b", "in")));
        assert!(!src.detach_downstream(&PadRef::new("b", "in")));
        assert_eq!(src.connection_count(), 0);
    }
}
