//! Real-time scheduling class guard

use super::{Facility, ResourceGuard};
use crate::config::SchedPolicy;
use crate::error::{RealtimeError, Result};
use crate::system::Platform;

/// Moves the process to a fixed-priority class at its maximum priority.
///
/// The previous policy is not restored on release.
pub struct SchedulingPolicy<'a> {
    platform: &'a dyn Platform,
    applied: Option<(SchedPolicy, i32)>,
}

impl<'a> SchedulingPolicy<'a> {
    /// Create a guard with nothing applied
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self {
            platform,
            applied: None,
        }
    }

    /// Apply `policy` at its maximum priority
    pub fn acquire(&mut self, policy: SchedPolicy) -> Result<()> {
        let priority = self
            .platform
            .set_scheduler(policy)
            .map_err(|e| RealtimeError::acquire(Facility::Scheduling, e))?;
        self.applied = Some((policy, priority));
        tracing::info!("Rescheduled to {} priority {}", policy.name(), priority);
        Ok(())
    }

    /// Policy and priority in effect
    pub fn applied(&self) -> Option<(SchedPolicy, i32)> {
        self.applied
    }
}

impl ResourceGuard for SchedulingPolicy<'_> {
    fn facility(&self) -> Facility {
        Facility::Scheduling
    }

    fn is_acquired(&self) -> bool {
        self.applied.is_some()
    }

    fn release(&mut self) -> Result<()> {
        self.applied = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::fake::{Call, Fail, FakeSystem, FAKE_MAX_PRIORITY};

    #[test]
    fn test_applies_max_priority() {
        let fake = FakeSystem::new(2);
        let mut guard = SchedulingPolicy::new(&fake);
        guard.acquire(SchedPolicy::Fifo).unwrap();
        assert_eq!(guard.applied(), Some((SchedPolicy::Fifo, FAKE_MAX_PRIORITY)));
        assert_eq!(fake.calls(), vec![Call::SetScheduler(SchedPolicy::Fifo)]);
    }

    #[test]
    fn test_refused_policy() {
        let fake = FakeSystem::new(2).failing(Fail::Scheduler);
        let mut guard = SchedulingPolicy::new(&fake);
        let err = guard.acquire(SchedPolicy::RoundRobin).unwrap_err();
        assert!(matches!(
            err,
            RealtimeError::ResourceAcquireFailed { facility: Facility::Scheduling, .. }
        ));
        assert!(!guard.is_acquired());
    }
}
