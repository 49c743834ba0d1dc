//! Identity types for the pipeline system.
//!
//! Node and pad identities are plain strings chosen by the flow author; the
//! types here cover the handles the runtime allocates itself.

use std::fmt;

/// Handle returned by `Bus::subscribe`. Allocated sequentially from 1.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    pub const INVALID: SubscriptionId = SubscriptionId(0);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "SubscriptionId(INVALID)")
        } else {
            write!(f, "SubscriptionId({})", self.0)
        }
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Fully qualified pad address: `node_id.pad_name`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadRef {
    pub node: String,
    pub pad: String,
}

impl PadRef {
    pub fn new(node: impl Into<String>, pad: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            pad: pad.into(),
        }
    }
}

impl fmt::Debug for PadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.pad)
    }
}

impl fmt::Display for PadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
