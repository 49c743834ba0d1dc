//! Inference runtimes that plug into [`YoloDetector`](crate::perception::YoloDetector).

pub mod replay;
pub mod unavailable;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use replay::ReplayRuntime;
pub use unavailable::UnavailableRuntime;

#[cfg(feature = "backend-tract")]
pub use tract::TractRuntime;
