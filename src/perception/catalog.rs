//! Detector catalogs: TOML files listing detector descriptors.
//!
//! ```toml
//! [[detectors]]
//! detector_id = "yolov8n"
//! model_path = "models/yolov8n.onnx"
//! label_path = "models/coco.names"
//! backend = "GenericCPU"
//! input_width = 640
//! input_height = 640
//! ```

use crate::perception::error::{PerceptionError, PerceptionResult};
use crate::perception::plugin::PerceptionPluginManager;
use crate::perception::types::DetectorDescriptor;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorCatalog {
    #[serde(default)]
    pub detectors: Vec<DetectorDescriptor>,
}

impl DetectorCatalog {
    pub fn parse(text: &str) -> PerceptionResult<Self> {
        toml::from_str(text).map_err(|e| PerceptionError::Catalog(e.to_string()))
    }

    /// Load a catalog file. Relative model and label paths are resolved
    /// against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> PerceptionResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut catalog = Self::parse(&text)?;

        if let Some(base) = path.parent() {
            for desc in &mut catalog.detectors {
                if desc.model_path.is_relative() {
                    desc.model_path = base.join(&desc.model_path);
                }
                if let Some(labels) = desc.label_path.as_mut() {
                    if labels.is_relative() {
                        *labels = base.join(&*labels);
                    }
                }
            }
        }
        Ok(catalog)
    }

    /// Register every descriptor. Duplicates are skipped with a warning;
    /// returns how many were added.
    pub fn register_into(&self, manager: &PerceptionPluginManager) -> usize {
        let mut added = 0;
        for desc in &self.detectors {
            match manager.register_detector_descriptor(desc.clone()) {
                Ok(()) => added += 1,
                Err(e) => tracing::warn!("Skipping catalog entry: {}", e),
            }
        }
        added
    }
}
