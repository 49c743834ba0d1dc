//! # falconflow: embedded perception dataflow runtime
//!
//! Perception applications are described as JSON flows: a set of nodes
//! (camera, detector, tracker, mission planning, reporting) and the links
//! between their pads. The runtime builds the graph, drives it from a
//! dedicated thread, and can hot-swap a running flow for a new one.
//!
//! ## Architecture
//!
//! - **Pipeline**: pads, nodes, links and the synchronous push transport
//! - **Flow executor**: JSON flow loading, start/stop, hot update, diagnostics bus
//! - **Perception**: detector backends behind one YOLO codec, the plugin
//!   manager that hands them out by key, and the Simple and SORT trackers
//! - **Config**: TOML runtime configuration and detector catalog
//!
//! ## Example
//!
//! ```no_run
//! use falconflow::pipeline::FlowExecutor;
//!
//! let mut executor = FlowExecutor::new();
//! executor.load_flow(r#"{
//!     "flow_id": "demo",
//!     "nodes": [
//!         {"node_id": "cam", "template_id": "camera_source"},
//!         {"node_id": "det", "template_id": "detection_transform"}
//!     ],
//!     "edges": [
//!         {"from_node_id": "cam", "from_port": "video_out",
//!          "to_node_id": "det", "to_port": "video_in"}
//!     ]
//! }"#)?;
//! executor.start()?;
//! executor.stop();
//! # Ok::<(), falconflow::pipeline::FlowError>(())
//! ```

pub mod config;
pub mod error;
pub mod perception;
pub mod pipeline;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use error::{FalconError, Result, ResultExt};
pub use perception::{PerceptionError, PerceptionPluginManager};
pub use pipeline::{Bus, FlowExecutor, NodeFactory, Pipeline};
