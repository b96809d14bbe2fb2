//! CPU topology probe
//!
//! Only the number of online processors matters here; everything else about
//! the machine's layout is left to the isolation tool.

use super::Platform;
use crate::error::{RealtimeError, Result};

/// Number of online processors, failing unless the platform reports a positive count
pub fn core_count(platform: &dyn Platform) -> Result<usize> {
    let online = platform.online_cpus();
    if online <= 0 {
        tracing::error!("Online processor count unavailable (got {})", online);
        return Err(RealtimeError::TopologyUnavailable(format!(
            "platform reported {} online processors",
            online
        )));
    }
    Ok(online as usize)
}

/// Core isolated by a full session when none is configured: the middle core
pub fn default_target_core(core_count: usize) -> usize {
    core_count / 2
}

/// Core shielded alongside `core`: the next one up, or the one below on the last core
pub fn shield_neighbor(core: usize, core_count: usize) -> usize {
    if core + 1 < core_count {
        core + 1
    } else {
        core.saturating_sub(1)
    }
}

/// Validate `core` against the online count
pub fn check_core(core: usize, core_count: usize) -> Result<()> {
    if core >= core_count {
        return Err(RealtimeError::InvalidCore {
            core,
            count: core_count,
        });
    }
    Ok(())
}

/// CPU the calling thread is executing on right now
#[cfg(target_os = "linux")]
pub fn current_cpu() -> Option<usize> {
    nix::sched::sched_getcpu().ok()
}

/// CPU the calling thread is executing on right now
#[cfg(not(target_os = "linux"))]
pub fn current_cpu() -> Option<usize> {
    None
}
