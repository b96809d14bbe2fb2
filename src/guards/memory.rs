//! Memory lock guard

use super::{Facility, ResourceGuard};
use crate::error::{RealtimeError, Result};
use crate::system::Platform;

/// Keeps current and future pages resident while acquired
pub struct MemoryLock<'a> {
    platform: &'a dyn Platform,
    locked: bool,
}

impl<'a> MemoryLock<'a> {
    /// Create an unlocked guard
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self {
            platform,
            locked: false,
        }
    }

    /// Lock all current and future pages
    pub fn acquire(&mut self) -> Result<()> {
        self.platform
            .lock_memory()
            .map_err(|e| RealtimeError::acquire(Facility::MemoryLock, e))?;
        self.locked = true;
        tracing::info!("Current and future memory locked");
        Ok(())
    }
}

impl ResourceGuard for MemoryLock<'_> {
    fn facility(&self) -> Facility {
        Facility::MemoryLock
    }

    fn is_acquired(&self) -> bool {
        self.locked
    }

    fn release(&mut self) -> Result<()> {
        if !self.locked {
            return Ok(());
        }
        self.locked = false;
        self.platform
            .unlock_memory()
            .map_err(|e| RealtimeError::release(Facility::MemoryLock, e))?;
        tracing::debug!("Memory unlocked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::fake::{Call, Fail, FakeSystem};

    #[test]
    fn test_release_without_acquire_is_noop() {
        let fake = FakeSystem::new(4);
        let mut guard = MemoryLock::new(&fake);
        assert!(guard.release().is_ok());
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn test_release_after_failed_acquire_is_noop() {
        let fake = FakeSystem::new(4).failing(Fail::LockMemory);
        let mut guard = MemoryLock::new(&fake);

        let err = guard.acquire().unwrap_err();
        assert_eq!(err.facility(), Some(Facility::MemoryLock));
        assert!(!guard.is_acquired());

        guard.release().unwrap();
        assert_eq!(fake.calls(), vec![Call::LockMemory]);
    }

    #[test]
    fn test_release_once() {
        let fake = FakeSystem::new(4);
        let mut guard = MemoryLock::new(&fake);
        guard.acquire().unwrap();
        guard.release().unwrap();
        guard.release().unwrap();
        assert_eq!(fake.calls(), vec![Call::LockMemory, Call::UnlockMemory]);
    }
}
