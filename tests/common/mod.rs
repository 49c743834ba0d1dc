//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use falconflow::pipeline::{Bus, BusMessage};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Poll `condition` until it holds or the test timeout elapses
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Messages seen on a bus, in posting order
#[derive(Clone, Default)]
pub struct BusRecorder {
    messages: Arc<Mutex<Vec<BusMessage>>>,
}

impl BusRecorder {
    pub fn attach(bus: &Bus) -> Self {
        let recorder = Self::default();
        let sink = recorder.messages.clone();
        bus.subscribe(move |m| sink.lock().push(m.clone()));
        recorder
    }

    pub fn messages(&self) -> Vec<BusMessage> {
        self.messages.lock().clone()
    }

    pub fn in_category(&self, category: &str) -> Vec<String> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.category == category)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn contains(&self, category: &str, needle: &str) -> bool {
        self.in_category(category).iter().any(|t| t.contains(needle))
    }
}
