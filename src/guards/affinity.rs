//! CPU affinity guard

use super::{Facility, ResourceGuard};
use crate::error::{RealtimeError, Result};
use crate::system::{topology, Platform};

/// Pins the calling process to a single core.
///
/// Release only clears the bookkeeping: the mask is left as is and goes away
/// with the process or is superseded when the shield is removed.
pub struct CpuAffinity<'a> {
    platform: &'a dyn Platform,
    core: Option<usize>,
}

impl<'a> CpuAffinity<'a> {
    /// Create an unpinned guard
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self {
            platform,
            core: None,
        }
    }

    /// Pin to `core`. When `core_count` is `None` it is probed from the platform.
    pub fn acquire(&mut self, core: usize, core_count: Option<usize>) -> Result<()> {
        let count = match core_count {
            Some(count) if count > 0 => count,
            _ => topology::core_count(self.platform)?,
        };
        topology::check_core(core, count)?;

        self.platform
            .set_affinity(core, count)
            .map_err(|e| RealtimeError::acquire(Facility::CpuAffinity, e))?;
        self.core = Some(core);
        tracing::info!("Process pinned to core {}", core);
        Ok(())
    }

    /// Core the process is pinned to
    pub fn core(&self) -> Option<usize> {
        self.core
    }
}

impl ResourceGuard for CpuAffinity<'_> {
    fn facility(&self) -> Facility {
        Facility::CpuAffinity
    }

    fn is_acquired(&self) -> bool {
        self.core.is_some()
    }

    fn release(&mut self) -> Result<()> {
        self.core = None;
        Ok(())
    }
}
