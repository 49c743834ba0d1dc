//! Push-based dataflow graph and the flow runtime built on it.
//!
//! Nodes own typed pads; a [`Pipeline`] links source pads to sink pads and
//! every push is delivered synchronously through the sink's callback.
//! [`FlowExecutor`] turns a JSON flow definition into a running pipeline
//! driven by one thread.
//!
//! # Architecture
//!
//! ```text
//! [camera_source] ──► [detection_transform] ──► [tracking_transform] ──► [event_reporter]
//!        └──────────► [low_light_adaptation]
//! ```
//!
//! # Design
//!
//! - **Callbacks only**: pads do not queue; nodes that consume on their own
//!   tick buffer through [`PadInbox`].
//! - **Typed parameters**: each template id maps to one [`NodeParams`] variant.
//! - **Dedicated thread**: the executor's driver calls `process()` in link
//!   order and is joined before `stop()` returns.

pub mod bus;
pub mod caps;
pub mod error;
pub mod executor;
pub mod factory;
pub mod flow;
pub mod graph;
pub mod id;
pub mod node;
pub mod nodes;
pub mod packet;
pub mod pad;
pub mod params;

pub use bus::{Bus, BusMessage};
pub use caps::Caps;
pub use error::{FlowError, FlowResult, PipelineError, PipelineResult};
pub use executor::{FlowExecutor, SharedPipeline, DEFAULT_TICK_RATE_HZ};
pub use factory::{templates, NodeFactory};
pub use flow::{EdgeDefinition, FlowDefinition, NodeDefinition};
pub use graph::{Link, Pipeline, PipelineConfig, PipelineState};
pub use id::PadRef;
pub use node::{Node, NodeContext, NodeCore, NodeServices, NodeState, PadInbox};
pub use packet::WirePacket;
pub use pad::{Pad, PadDirection};
pub use params::{NodeParams, ParamError};
