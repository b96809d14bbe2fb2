//! Resource guards, one per real-time facility
//!
//! Each guard records whether its acquisition succeeded and keeps whatever
//! it needs to undo it (a saved governor, an open descriptor). Releasing a
//! guard that holds nothing is a no-op, so teardown can call `release` on
//! every guard unconditionally.

mod affinity;
mod governor;
mod latency;
mod memory;
mod scheduling;
mod shield;

pub use affinity::CpuAffinity;
pub use governor::FrequencyGovernor;
pub use latency::LatencyHint;
pub use memory::MemoryLock;
pub use scheduling::SchedulingPolicy;
pub use shield::{detect_cset, CoreShield, CsetTool, IsolationTool};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Real-time facility guarded by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facility {
    /// mlockall / munlockall
    MemoryLock,
    /// cset shield around the target core
    CoreShield,
    /// sched_setaffinity mask
    CpuAffinity,
    /// Real-time scheduling class and priority
    Scheduling,
    /// cpufreq governor and pinned frequency
    Governor,
    /// PM QoS latency request
    LatencyHint,
}

impl Facility {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::MemoryLock => "memory lock",
            Self::CoreShield => "core shield",
            Self::CpuAffinity => "CPU affinity",
            Self::Scheduling => "scheduling policy",
            Self::Governor => "frequency governor",
            Self::LatencyHint => "power-latency hint",
        }
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Common release side of every guard
pub trait ResourceGuard {
    /// Facility this guard controls
    fn facility(&self) -> Facility;

    /// Whether an acquisition is currently recorded
    fn is_acquired(&self) -> bool;

    /// Undo the acquisition. Does nothing when nothing is held; a second call
    /// after a successful release does nothing either.
    fn release(&mut self) -> Result<()>;
}
