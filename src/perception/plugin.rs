//! Runtime registry of detector and tracker implementations.

use crate::perception::backend::{DetectorBackend, YoloDetector};
use crate::perception::error::{PerceptionError, PerceptionResult};
use crate::perception::runtimes::UnavailableRuntime;
use crate::perception::tracking::{SimpleTracker, SortTracker, TrackerBackend, TrackerConfig};
use crate::perception::types::{BackendType, DetectorDescriptor};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds an unloaded detector for a descriptor.
pub type DetectorFactory =
    Arc<dyn Fn(&DetectorDescriptor) -> anyhow::Result<Box<dyn DetectorBackend>> + Send + Sync>;

/// Builds an unloaded tracker.
pub type TrackerFactory = Arc<dyn Fn(&TrackerConfig) -> Box<dyn TrackerBackend> + Send + Sync>;

#[derive(Clone)]
struct DetectorRegistration {
    backend_type: BackendType,
    factory: DetectorFactory,
}

/// Maps backend keys to factories and detector ids to descriptors.
///
/// All methods take `&self`; the manager is shared between the executor and
/// the nodes it creates.
pub struct PerceptionPluginManager {
    detector_backends: Mutex<BTreeMap<String, DetectorRegistration>>,
    descriptors: Mutex<BTreeMap<String, DetectorDescriptor>>,
    tracker_backends: Mutex<BTreeMap<String, TrackerFactory>>,
}

impl PerceptionPluginManager {
    /// An empty manager with nothing registered.
    pub fn new() -> Self {
        Self {
            detector_backends: Mutex::new(BTreeMap::new()),
            descriptors: Mutex::new(BTreeMap::new()),
            tracker_backends: Mutex::new(BTreeMap::new()),
        }
    }

    /// A manager with the built-in backend families and trackers.
    ///
    /// `GenericCPU` runs ONNX models through tract when the `backend-tract`
    /// feature is enabled. `NPU` and `GenericGPU` need vendor runtimes that
    /// are not part of this build and fail to load.
    pub fn with_builtin_backends() -> Self {
        let manager = Self::new();

        for backend_type in [BackendType::Npu, BackendType::GenericGpu] {
            manager.register_detector_backend(
                backend_type.key(),
                backend_type,
                Arc::new(
                    move |desc: &DetectorDescriptor| -> anyhow::Result<Box<dyn DetectorBackend>> {
                        Ok(Box::new(YoloDetector::new(
                            desc.clone(),
                            UnavailableRuntime::new(backend_type),
                        )))
                    },
                ),
            );
        }
        manager.register_detector_backend(
            BackendType::GenericCpu.key(),
            BackendType::GenericCpu,
            Arc::new(cpu_detector),
        );

        manager.register_tracker_backend(
            "simple",
            Arc::new(|cfg: &TrackerConfig| Box::new(SimpleTracker::new(*cfg)) as Box<dyn TrackerBackend>),
        );
        manager.register_tracker_backend(
            "sort",
            Arc::new(|cfg: &TrackerConfig| Box::new(SortTracker::new(*cfg)) as Box<dyn TrackerBackend>),
        );
        manager
    }

    // ── Detectors ──

    /// Register (or replace) the factory for a backend key.
    pub fn register_detector_backend(
        &self,
        key: impl Into<String>,
        backend_type: BackendType,
        factory: DetectorFactory,
    ) {
        let key = key.into();
        tracing::debug!("Registered detector backend '{}' ({})", key, backend_type);
        self.detector_backends.lock().insert(
            key,
            DetectorRegistration {
                backend_type,
                factory,
            },
        );
    }

    /// Add a detector descriptor. Ids must be unique.
    pub fn register_detector_descriptor(&self, descriptor: DetectorDescriptor) -> PerceptionResult<()> {
        let mut descriptors = self.descriptors.lock();
        if descriptors.contains_key(&descriptor.detector_id) {
            return Err(PerceptionError::DuplicateDetector(descriptor.detector_id));
        }
        tracing::info!(
            "Registered detector '{}' ({}, {})",
            descriptor.detector_id,
            descriptor.backend_type,
            descriptor.model_path.display()
        );
        descriptors.insert(descriptor.detector_id.clone(), descriptor);
        Ok(())
    }

    pub fn unregister_detector(&self, detector_id: &str) -> bool {
        self.descriptors.lock().remove(detector_id).is_some()
    }

    pub fn detector_descriptor(&self, detector_id: &str) -> Option<DetectorDescriptor> {
        self.descriptors.lock().get(detector_id).cloned()
    }

    /// All registered descriptors, ordered by id.
    pub fn list_detectors(&self) -> Vec<DetectorDescriptor> {
        self.descriptors.lock().values().cloned().collect()
    }

    pub fn detector_backend_keys(&self) -> Vec<String> {
        self.detector_backends.lock().keys().cloned().collect()
    }

    /// Build and load the detector registered under `detector_id`.
    ///
    /// Returns `None` on any failure; the cause is logged.
    pub fn create_detector(&self, detector_id: &str) -> Option<Box<dyn DetectorBackend>> {
        match self.try_create_detector(detector_id) {
            Ok(detector) => Some(detector),
            Err(e) => {
                tracing::warn!("Cannot create detector '{}': {}", detector_id, e);
                None
            }
        }
    }

    /// Like [`create_detector`](Self::create_detector) but reports why it failed.
    pub fn try_create_detector(&self, detector_id: &str) -> PerceptionResult<Box<dyn DetectorBackend>> {
        let descriptor = self
            .detector_descriptor(detector_id)
            .ok_or_else(|| PerceptionError::UnknownDetector(detector_id.to_string()))?;
        let factory = self.factory_for(descriptor.backend_type)?;

        let mut detector = factory(&descriptor)
            .map_err(|e| PerceptionError::Inference(format!("{:#}", e)))?;
        detector.load()?;
        Ok(detector)
    }

    /// Registration whose key names the backend family, else any with that family.
    fn factory_for(&self, backend_type: BackendType) -> PerceptionResult<DetectorFactory> {
        let backends = self.detector_backends.lock();
        backends
            .get(backend_type.key())
            .filter(|r| r.backend_type == backend_type)
            .or_else(|| backends.values().find(|r| r.backend_type == backend_type))
            .map(|r| Arc::clone(&r.factory))
            .ok_or_else(|| PerceptionError::UnknownBackend(backend_type.key().to_string()))
    }

    // ── Trackers ──

    pub fn register_tracker_backend(&self, key: impl Into<String>, factory: TrackerFactory) {
        let key = key.into();
        tracing::debug!("Registered tracker '{}'", key);
        self.tracker_backends.lock().insert(key, factory);
    }

    pub fn tracker_keys(&self) -> Vec<String> {
        self.tracker_backends.lock().keys().cloned().collect()
    }

    /// Build and load a tracker. `None` when the key is unknown or loading fails.
    pub fn create_tracker(&self, key: &str, config: &TrackerConfig) -> Option<Box<dyn TrackerBackend>> {
        let factory = self.tracker_backends.lock().get(key).cloned();
        let Some(factory) = factory else {
            tracing::warn!("Unknown tracker '{}'", key);
            return None;
        };

        let mut tracker = factory(config);
        match tracker.load() {
            Ok(()) => Some(tracker),
            Err(e) => {
                tracing::warn!("Tracker '{}' failed to load: {}", key, e);
                None
            }
        }
    }
}

#[cfg(feature = "backend-tract")]
fn cpu_detector(desc: &DetectorDescriptor) -> anyhow::Result<Box<dyn DetectorBackend>> {
    use crate::perception::runtimes::TractRuntime;
    Ok(Box::new(YoloDetector::new(desc.clone(), TractRuntime::new())))
}

#[cfg(not(feature = "backend-tract"))]
fn cpu_detector(desc: &DetectorDescriptor) -> anyhow::Result<Box<dyn DetectorBackend>> {
    Ok(Box::new(YoloDetector::new(
        desc.clone(),
        UnavailableRuntime::new(BackendType::GenericCpu),
    )))
}

impl Default for PerceptionPluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PerceptionPluginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerceptionPluginManager")
            .field("detector_backends", &self.detector_backend_keys())
            .field(
                "detectors",
                &self.descriptors.lock().keys().cloned().collect::<Vec<_>>(),
            )
            .field("trackers", &self.tracker_keys())
            .finish()
    }
}
