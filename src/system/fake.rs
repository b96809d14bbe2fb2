//! Recording fake of the OS surface for unit tests

use super::{LatencyHandle, Platform};
use crate::config::SchedPolicy;
use crate::error::{RealtimeError, Result};
use crate::guards::IsolationTool;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::io;

/// Priority the fake reports as the policy maximum
pub const FAKE_MAX_PRIORITY: i32 = 99;

/// Rated maximum frequency reported for every core
pub const FAKE_MAX_KHZ: u64 = 3_000_000;

/// One recorded interaction, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    LockMemory,
    UnlockMemory,
    SetAffinity(usize, usize),
    SetScheduler(SchedPolicy),
    ReadGovernor(usize),
    WriteGovernor(usize, String),
    PinMaxFrequency(usize),
    OpenLatency(i32),
    CloseLatency,
    ShieldCreate(usize, usize),
    ShieldAssign(u32),
    ShieldRemove,
    Workload(Vec<String>),
}

/// Injectable failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fail {
    LockMemory,
    UnlockMemory,
    Affinity,
    Scheduler,
    ReadGovernor,
    /// Every governor write fails
    WriteGovernor,
    /// Only writes after the first successful one fail
    RestoreGovernor,
    PinFrequency,
    LatencyOpen,
    ShieldCreate,
    ShieldAssign,
    ShieldRemove,
}

/// Fake platform and isolation tool sharing one call log
pub struct FakeSystem {
    online: i64,
    privileged: bool,
    failures: HashSet<Fail>,
    initial_governor: String,
    governors: RefCell<HashMap<usize, String>>,
    governor_writes: Cell<usize>,
    calls: RefCell<Vec<Call>>,
}

impl FakeSystem {
    pub fn new(online: i64) -> Self {
        Self {
            online,
            privileged: true,
            failures: HashSet::new(),
            initial_governor: "schedutil".to_string(),
            governors: RefCell::new(HashMap::new()),
            governor_writes: Cell::new(0),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn unprivileged(mut self) -> Self {
        self.privileged = false;
        self
    }

    pub fn failing(mut self, fail: Fail) -> Self {
        self.failures.insert(fail);
        self
    }

    pub fn with_governor(mut self, governor: &str) -> Self {
        self.initial_governor = governor.to_string();
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Record an entry from outside the platform, e.g. the workload itself
    pub fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    pub fn governor(&self, core: usize) -> String {
        self.governors
            .borrow()
            .get(&core)
            .cloned()
            .unwrap_or_else(|| self.initial_governor.clone())
    }

    /// Position of the first call matching `pred`
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.borrow().iter().position(pred)
    }

    fn fails(&self, fail: Fail) -> bool {
        self.failures.contains(&fail)
    }

    fn injected(what: &str) -> io::Error {
        io::Error::new(io::ErrorKind::Other, format!("injected {} failure", what))
    }
}

impl Platform for FakeSystem {
    fn is_privileged(&self) -> bool {
        self.privileged
    }

    fn online_cpus(&self) -> i64 {
        self.online
    }

    fn lock_memory(&self) -> io::Result<()> {
        self.record(Call::LockMemory);
        if self.fails(Fail::LockMemory) {
            return Err(Self::injected("mlockall"));
        }
        Ok(())
    }

    fn unlock_memory(&self) -> io::Result<()> {
        self.record(Call::UnlockMemory);
        if self.fails(Fail::UnlockMemory) {
            return Err(Self::injected("munlockall"));
        }
        Ok(())
    }

    fn set_affinity(&self, core: usize, core_count: usize) -> io::Result<()> {
        self.record(Call::SetAffinity(core, core_count));
        if self.fails(Fail::Affinity) {
            return Err(Self::injected("sched_setaffinity"));
        }
        Ok(())
    }

    fn set_scheduler(&self, policy: SchedPolicy) -> io::Result<i32> {
        self.record(Call::SetScheduler(policy));
        if self.fails(Fail::Scheduler) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected EPERM"));
        }
        Ok(FAKE_MAX_PRIORITY)
    }

    fn read_governor(&self, core: usize) -> io::Result<String> {
        self.record(Call::ReadGovernor(core));
        if self.fails(Fail::ReadGovernor) {
            return Err(Self::injected("governor read"));
        }
        Ok(self.governor(core))
    }

    fn write_governor(&self, core: usize, name: &str) -> io::Result<()> {
        self.record(Call::WriteGovernor(core, name.to_string()));
        let writes = self.governor_writes.get();
        if self.fails(Fail::WriteGovernor) || (self.fails(Fail::RestoreGovernor) && writes > 0) {
            return Err(Self::injected("governor write"));
        }
        self.governor_writes.set(writes + 1);
        self.governors.borrow_mut().insert(core, name.to_string());
        Ok(())
    }

    fn max_frequency(&self, _core: usize) -> io::Result<u64> {
        Ok(FAKE_MAX_KHZ)
    }

    fn pin_max_frequency(&self, core: usize) -> io::Result<u64> {
        self.record(Call::PinMaxFrequency(core));
        if self.fails(Fail::PinFrequency) {
            return Err(Self::injected("scaling_setspeed"));
        }
        Ok(FAKE_MAX_KHZ)
    }

    fn open_latency_hint(&self, target_us: i32) -> io::Result<LatencyHandle> {
        self.record(Call::OpenLatency(target_us));
        if self.fails(Fail::LatencyOpen) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no cpu_dma_latency"));
        }
        Ok(LatencyHandle::new(None, target_us))
    }

    fn close_latency_hint(&self, handle: LatencyHandle) -> io::Result<()> {
        self.record(Call::CloseLatency);
        handle.close()
    }
}

impl IsolationTool for FakeSystem {
    fn create(&self, core_a: usize, core_b: usize) -> Result<()> {
        self.record(Call::ShieldCreate(core_a, core_b));
        if self.fails(Fail::ShieldCreate) {
            return Err(RealtimeError::collaborator("cset shield -c", "exit status: 1"));
        }
        Ok(())
    }

    fn assign(&self, pid: u32) -> Result<()> {
        self.record(Call::ShieldAssign(pid));
        if self.fails(Fail::ShieldAssign) {
            return Err(RealtimeError::collaborator("cset shield --shield", "exit status: 1"));
        }
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        self.record(Call::ShieldRemove);
        if self.fails(Fail::ShieldRemove) {
            return Err(RealtimeError::collaborator("cset shield -r", "exit status: 1"));
        }
        Ok(())
    }
}
