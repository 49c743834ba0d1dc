//! Mission event reporting.
//!
//! Two ways in: payloads arriving on the `events` pad (any media type) are
//! summarised, and application code queues structured [`SearchEvent`]s and
//! [`SearchProgress`] through an [`EventReporterHandle`]. Both are posted on
//! the bus under the `event` category on the next tick, prefixed with the
//! vehicle and mission ids.

use crate::pipeline::bus::category;
use crate::pipeline::caps::Caps;
use crate::pipeline::error::PipelineResult;
use crate::pipeline::factory::templates;
use crate::pipeline::node::{Node, NodeContext, NodeCore, PadInbox};
use crate::pipeline::packet;
use crate::pipeline::pad::Pad;
use crate::pipeline::params::{EventReporterParams, GeoPoint, NodeParams, ParamError};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

pub const EVENTS_IN: &str = "events";

/// Payloads buffered on the `events` pad between ticks.
const INBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchEventType {
    TargetDetected,
    InterestPoint,
    Anomaly,
    WaypointReached,
    SearchComplete,
}

impl SearchEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchEventType::TargetDetected => "TARGET_DETECTED",
            SearchEventType::InterestPoint => "INTEREST_POINT",
            SearchEventType::Anomaly => "ANOMALY",
            SearchEventType::WaypointReached => "WAYPOINT_REACHED",
            SearchEventType::SearchComplete => "SEARCH_COMPLETE",
        }
    }
}

impl fmt::Display for SearchEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something worth telling the ground station about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEvent {
    pub event_type: SearchEventType,
    pub description: String,
    pub position: GeoPoint,
    /// Wall clock, nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
    /// JSON object text with event specific fields.
    pub metadata: String,
}

impl SearchEvent {
    /// A `TARGET_DETECTED` event stamped with the current time.
    pub fn detection(target_class: &str, confidence: f64, position: GeoPoint) -> Self {
        let metadata = serde_json::json!({
            "class": target_class,
            "confidence": confidence,
        });
        Self {
            event_type: SearchEventType::TargetDetected,
            description: format!(
                "Target detected: {} (confidence: {:.3})",
                target_class, confidence
            ),
            position,
            timestamp_ns: now_ns(),
            metadata: metadata.to_string(),
        }
    }
}

impl fmt::Display for SearchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at ({:.6}, {:.6}) - {}",
            self.event_type, self.position.lat, self.position.lon, self.description
        )
    }
}

/// Coverage of the planned route so far.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchProgress {
    /// Fraction in `[0, 1]`.
    pub coverage_percent: f64,
    pub waypoint_index: u32,
    pub total_waypoints: u32,
    pub current_position: GeoPoint,
}

impl fmt::Display for SearchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "progress {:.1}% ({}/{} waypoints)",
            self.coverage_percent * 100.0,
            self.waypoint_index,
            self.total_waypoints
        )
    }
}

fn now_ns() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or_default()
}

/// Clonable sender for reports; usable after the node moved into a pipeline.
#[derive(Clone, Default)]
pub struct EventReporterHandle {
    pending: Arc<Mutex<VecDeque<String>>>,
}

impl EventReporterHandle {
    pub fn report_search_event(&self, event: &SearchEvent) {
        tracing::info!("Search event: {}", event);
        self.pending.lock().push_back(event.to_string());
    }

    pub fn report_search_progress(&self, progress: &SearchProgress) {
        tracing::debug!("Search {}", progress);
        self.pending.lock().push_back(progress.to_string());
    }

    pub fn report_detection(&self, target_class: &str, confidence: f64, lat: f64, lon: f64, alt: f64) {
        let event = SearchEvent::detection(target_class, confidence, GeoPoint::new(lat, lon, alt));
        self.report_search_event(&event);
    }

    fn take_pending(&self) -> Vec<String> {
        self.pending.lock().drain(..).collect()
    }
}

pub struct EventReporterNode {
    core: NodeCore,
    inbox: PadInbox,
    params: EventReporterParams,
    handle: EventReporterHandle,
    posted: u64,
}

impl EventReporterNode {
    pub fn new(id: impl Into<String>) -> Self {
        let events = Pad::sink(EVENTS_IN, Caps::any());
        let inbox = PadInbox::attach(&events, INBOX_CAPACITY);
        Self {
            core: NodeCore::new(id, templates::EVENT_REPORTER).with_pad(events),
            inbox,
            params: EventReporterParams::default(),
            handle: EventReporterHandle::default(),
            posted: 0,
        }
    }

    pub fn params(&self) -> &EventReporterParams {
        &self.params
    }

    pub fn handle(&self) -> EventReporterHandle {
        self.handle.clone()
    }

    pub fn report_search_event(&self, event: &SearchEvent) {
        self.handle.report_search_event(event);
    }

    pub fn report_search_progress(&self, progress: &SearchProgress) {
        self.handle.report_search_progress(progress);
    }

    pub fn report_detection(&self, target_class: &str, confidence: f64, lat: f64, lon: f64, alt: f64) {
        self.handle
            .report_detection(target_class, confidence, lat, lon, alt);
    }

    /// Bus messages posted since start.
    pub fn events_posted(&self) -> u64 {
        self.posted
    }
}

impl Node for EventReporterNode {
    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn on_configure(&mut self, params: &NodeParams) -> Result<(), ParamError> {
        match params {
            NodeParams::EventReporter(p) => {
                self.params = p.clone();
                Ok(())
            }
            NodeParams::None => Ok(()),
            _ => Err(ParamError::Mismatch {
                expected: "event_reporter",
            }),
        }
    }

    fn on_start(&mut self, _ctx: &mut NodeContext) -> PipelineResult<()> {
        self.posted = 0;
        Ok(())
    }

    fn on_process(&mut self, ctx: &mut NodeContext) {
        let summaries = self
            .handle
            .take_pending()
            .into_iter()
            .chain(self.inbox.drain().into_iter().map(|b| packet::describe(&b)));
        for text in summaries {
            ctx.post(
                category::EVENT,
                format!("{}/{}: {}", self.params.uav_id, self.params.mission_id, text),
            );
            self.posted += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::{BoundingBox, Detection, DetectionResult};
    use crate::pipeline::nodes::test_support::{feed, Harness};
    use crate::pipeline::packet::WirePacket;
    use serde_json::json;

    #[test]
    fn test_detection_event_metadata() {
        let event = SearchEvent::detection("person", 0.875, GeoPoint::new(31.0, 121.0, 50.0));
        assert_eq!(event.event_type, SearchEventType::TargetDetected);
        assert!(event.timestamp_ns > 0);
        let meta: serde_json::Value = serde_json::from_str(&event.metadata).unwrap();
        assert_eq!(meta["class"], "person");
        assert_eq!(meta["confidence"], 0.875);
        assert!(event.to_string().starts_with("TARGET_DETECTED at (31.000000, 121.000000)"));
    }

    #[test]
    fn test_reports_and_payloads_posted_with_ids() {
        let harness = Harness::new();
        let seen = harness.record_bus();
        let mut node = EventReporterNode::new("events");
        let params = NodeParams::from_json(templates::EVENT_REPORTER, &json!({"uav_id": "uav_7"}))
            .unwrap();
        node.configure(&params).unwrap();
        let input = feed(&node, EVENTS_IN);
        let mut ctx = harness.ctx();
        node.start(&mut ctx).unwrap();

        let handle = node.handle();
        handle.report_detection("car", 0.5, 31.0, 121.0, 40.0);
        handle.report_search_progress(&SearchProgress {
            coverage_percent: 0.5,
            waypoint_index: 3,
            total_waypoints: 6,
            current_position: GeoPoint::default(),
        });
        let mut d = DetectionResult::new("cam", 4, 0);
        d.detections
            .push(Detection::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.9, 0));
        input.push(&d.encode());
        input.push(b"raw");
        node.process(&mut ctx);

        let seen = seen.lock();
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|m| m.starts_with("event: uav_7/mission_unknown: ")));
        assert!(seen[0].contains("TARGET_DETECTED"));
        assert!(seen[1].contains("progress 50.0% (3/6 waypoints)"));
        assert!(seen[2].ends_with("detections frame=4 count=1"));
        assert!(seen[3].ends_with("3 bytes"));
        assert_eq!(node.events_posted(), 4);
    }

    #[test]
    fn test_nothing_posted_when_idle() {
        let harness = Harness::new();
        let seen = harness.record_bus();
        let mut node = EventReporterNode::new("events");
        let mut ctx = harness.ctx();
        node.start(&mut ctx).unwrap();
        node.process(&mut ctx);
        assert!(seen.lock().is_empty());
    }
}
