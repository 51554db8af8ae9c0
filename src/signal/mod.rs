mod osc;

pub use osc::OscSink;

use crate::gesture::Gesture;
use anyhow::Result;

/// Trait for gesture destinations
pub trait SignalSink {
    /// Emit one gesture; delivery is not guaranteed
    fn send(&mut self, gesture: Gesture) -> Result<()>;
}
