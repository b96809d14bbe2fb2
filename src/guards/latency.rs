//! Power-latency hint guard

use super::{Facility, ResourceGuard};
use crate::error::{RealtimeError, Result};
use crate::system::{LatencyHandle, Platform};

/// Holds a PM QoS latency request open. A session treats failure to acquire
/// it as non-fatal and carries on without a hint.
pub struct LatencyHint<'a> {
    platform: &'a dyn Platform,
    handle: Option<LatencyHandle>,
}

impl<'a> LatencyHint<'a> {
    /// Create a guard holding no request
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self {
            platform,
            handle: None,
        }
    }

    /// Request a maximum wake-up latency of `target_us` (0 = lowest)
    pub fn acquire(&mut self, target_us: i32) -> Result<()> {
        let handle = self
            .platform
            .open_latency_hint(target_us)
            .map_err(|e| RealtimeError::acquire(Facility::LatencyHint, e))?;
        self.handle = Some(handle);
        tracing::info!("Power-latency hint of {}us held", target_us);
        Ok(())
    }
}

impl ResourceGuard for LatencyHint<'_> {
    fn facility(&self) -> Facility {
        Facility::LatencyHint
    }

    fn is_acquired(&self) -> bool {
        self.handle.is_some()
    }

    fn release(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self
                .platform
                .close_latency_hint(handle)
                .map_err(|e| RealtimeError::release(Facility::LatencyHint, e)),
            None => Ok(()),
        }
    }
}
