//! Pad capability descriptors.
//!
//! A `Caps` value is a small set of key/value tags (`media`, `format`,
//! `width`, ...) attached to every pad. Linking checks the source caps
//! against the sink caps: a sink declaring `Caps::Any` accepts every source,
//! otherwise the tag sets must be identical.

use std::collections::BTreeMap;
use std::fmt;

/// Well-known media tags used by the built-in nodes.
pub mod media {
    pub const VIDEO_RAW: &str = "video/x-raw";
    pub const DETECTIONS: &str = "perception/detections";
    pub const TRACKS: &str = "perception/tracks";
    pub const ENVIRONMENT: &str = "perception/environment";
    pub const POSE: &str = "perception/pose";
    pub const POINT_CLOUD: &str = "sensor/pointcloud";
    pub const CLUSTER_STATE: &str = "cluster/state";
    pub const WAYPOINTS: &str = "mission/waypoints";
}

/// Capability descriptor for a pad.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Caps {
    /// Wildcard: as a sink, accepts anything.
    #[default]
    Any,
    /// Concrete key/value tags.
    Fixed(BTreeMap<String, String>),
}

impl Caps {
    /// Wildcard caps.
    pub fn any() -> Self {
        Caps::Any
    }

    /// Caps with a single `media` tag.
    pub fn media(kind: &str) -> Self {
        Caps::Fixed(BTreeMap::new()).with("media", kind)
    }

    /// Add or replace a tag. Turns `Any` into a fixed descriptor.
    pub fn with(self, key: impl Into<String>, value: impl ToString) -> Self {
        let mut props = match self {
            Caps::Any => BTreeMap::new(),
            Caps::Fixed(props) => props,
        };
        props.insert(key.into(), value.to_string());
        Caps::Fixed(props)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Caps::Any)
    }

    /// Look up a tag value.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            Caps::Any => None,
            Caps::Fixed(props) => props.get(key).map(String::as_str),
        }
    }

    /// Whether a sink with these caps accepts data described by `source`.
    pub fn accepts(&self, source: &Caps) -> bool {
        match self {
            Caps::Any => true,
            Caps::Fixed(_) => self == source,
        }
    }
}

impl fmt::Debug for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caps::Any => write!(f, "ANY"),
            Caps::Fixed(props) => {
                let mut first = true;
                for (k, v) in props {
                    if !first {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}={}", k, v)?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}
