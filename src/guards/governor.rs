//! Frequency governor guard
//!
//! Disabling frequency scaling takes three ordered steps on the target core:
//! save the current governor, install one that accepts direct frequency
//! writes, then pin the clock to the rated maximum. Release re-installs the
//! saved governor.

use super::{Facility, ResourceGuard};
use crate::error::{RealtimeError, Result};
use crate::system::Platform;

/// Saves, overrides and restores the cpufreq governor of one core
pub struct FrequencyGovernor<'a> {
    platform: &'a dyn Platform,
    core: usize,
    saved: Option<String>,
    overridden: bool,
}

impl<'a> FrequencyGovernor<'a> {
    /// Create a guard for `core`
    pub fn new(platform: &'a dyn Platform, core: usize) -> Self {
        Self {
            platform,
            core,
            saved: None,
            overridden: false,
        }
    }

    /// Read and remember the current governor
    pub fn save(&mut self) -> Result<&str> {
        let governor = self
            .platform
            .read_governor(self.core)
            .map_err(|e| RealtimeError::acquire(Facility::Governor, e))?;
        tracing::debug!("cpu{} governor is '{}'", self.core, governor);
        Ok(self.saved.insert(governor).as_str())
    }

    /// Install `name`. Requires a saved governor so the change can be undone.
    pub fn apply(&mut self, name: &str) -> Result<()> {
        if self.saved.is_none() {
            return Err(RealtimeError::acquire(
                Facility::Governor,
                "current governor must be saved before overriding it",
            ));
        }
        self.platform
            .write_governor(self.core, name)
            .map_err(|e| RealtimeError::acquire(Facility::Governor, e))?;
        self.overridden = true;
        tracing::debug!("cpu{} governor set to '{}'", self.core, name);
        Ok(())
    }

    /// Clock the core at its rated maximum; returns the frequency in kHz
    pub fn pin_to_max_frequency(&mut self) -> Result<u64> {
        let khz = self
            .platform
            .pin_max_frequency(self.core)
            .map_err(|e| RealtimeError::acquire(Facility::Governor, e))?;
        tracing::info!("CPU frequency scaling disabled on cpu{} ({} kHz)", self.core, khz);
        Ok(khz)
    }

    /// Governor captured by [`FrequencyGovernor::save`]
    pub fn saved(&self) -> Option<&str> {
        self.saved.as_deref()
    }
}

impl ResourceGuard for FrequencyGovernor<'_> {
    fn facility(&self) -> Facility {
        Facility::Governor
    }

    fn is_acquired(&self) -> bool {
        self.overridden
    }

    fn release(&mut self) -> Result<()> {
        if !self.overridden {
            return Ok(());
        }
        self.overridden = false;

        let Some(saved) = self.saved.as_deref() else {
            return Ok(());
        };
        self.platform
            .write_governor(self.core, saved)
            .map_err(|e| RealtimeError::release(Facility::Governor, e))?;
        tracing::debug!("cpu{} governor restored to '{}'", self.core, saved);
        Ok(())
    }
}
