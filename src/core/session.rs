//! Session state and report
//!
//! A [`Session`] owns one guard per facility for the duration of a single
//! orchestration call. It is never shared: the orchestrator creates it,
//! drives it forward, unwinds it and turns it into a [`SessionReport`].

use crate::config::SchedPolicy;
use crate::error::{fold_errors, RealtimeError, Result};
use crate::guards::{
    CoreShield, CpuAffinity, Facility, FrequencyGovernor, IsolationTool, LatencyHint, MemoryLock,
    ResourceGuard, SchedulingPolicy,
};
use crate::system::Platform;
use serde::Serialize;
use std::time::Duration;

/// Exit code when setup failed and the workload never ran
pub const SETUP_FAILURE_EXIT: i32 = 2;

/// Exit code when the workload ran but teardown failed
pub const TEARDOWN_FAILURE_EXIT: i32 = 3;

/// Exit code for failed preconditions (privilege, topology, configuration)
pub const PRECONDITION_FAILURE_EXIT: i32 = 1;

/// Position of a session in its linear lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing acquired
    Idle,
    /// Memory locked
    MemoryLocked,
    /// Target core shielded and the process moved in
    Shielded,
    /// Process pinned to the target core
    Affinitized,
    /// Real-time scheduling class applied
    Scheduled,
    /// Previous governor captured
    GovernorSaved,
    /// Override governor installed
    GovernorOverridden,
    /// Clock pinned at its rated maximum
    FrequencyPinned,
    /// Latency hint held (or skipped)
    LatencyHinted,
    /// Workload executing
    Running,
    /// Releasing resources
    Unwinding,
    /// Finished
    Done,
}

/// Overall result class of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Setup failed; the workload never ran
    SetupFailed,
    /// The workload ran but at least one teardown step failed
    TeardownFailed,
    /// Setup, workload and teardown all completed
    Completed,
}

/// One orchestration run
pub struct Session<'a> {
    state: SessionState,
    target_core: Option<usize>,
    acquired: Vec<Facility>,
    platform: &'a dyn Platform,
    memory: MemoryLock<'a>,
    shield: CoreShield<'a>,
    affinity: CpuAffinity<'a>,
    scheduling: SchedulingPolicy<'a>,
    governor: Option<FrequencyGovernor<'a>>,
    latency: LatencyHint<'a>,
}

impl<'a> Session<'a> {
    /// Create an idle session
    pub fn new(platform: &'a dyn Platform, isolation: &'a dyn IsolationTool) -> Self {
        Self {
            state: SessionState::Idle,
            target_core: None,
            acquired: Vec::new(),
            platform,
            memory: MemoryLock::new(platform),
            shield: CoreShield::new(isolation),
            affinity: CpuAffinity::new(platform),
            scheduling: SchedulingPolicy::new(platform),
            governor: None,
            latency: LatencyHint::new(platform),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Facilities acquired so far, in order
    pub fn acquired(&self) -> &[Facility] {
        &self.acquired
    }

    pub(crate) fn advance(&mut self, next: SessionState) {
        transition(&mut self.state, next);
    }

    fn mark(&mut self, facility: Facility, next: SessionState) {
        self.acquired.push(facility);
        self.advance(next);
    }

    /// Lock memory
    pub fn lock_memory(&mut self) -> Result<()> {
        self.memory.acquire()?;
        self.mark(Facility::MemoryLock, SessionState::MemoryLocked);
        Ok(())
    }

    /// Shield `core` with `neighbor` and move `pid` into the shield
    pub fn shield(&mut self, core: usize, neighbor: usize, pid: u32) -> Result<()> {
        self.target_core = Some(core);
        self.shield.acquire(core, neighbor, pid)?;
        self.mark(Facility::CoreShield, SessionState::Shielded);
        Ok(())
    }

    /// Pin the process to `core`
    pub fn pin(&mut self, core: usize, core_count: usize) -> Result<()> {
        self.affinity.acquire(core, Some(core_count))?;
        self.mark(Facility::CpuAffinity, SessionState::Affinitized);
        Ok(())
    }

    /// Apply a real-time scheduling class
    pub fn schedule(&mut self, policy: SchedPolicy) -> Result<()> {
        self.scheduling.acquire(policy)?;
        self.mark(Facility::Scheduling, SessionState::Scheduled);
        Ok(())
    }

    /// Save the governor of `core`, install `name` and pin the maximum frequency
    pub fn disable_frequency_scaling(&mut self, core: usize, name: &str) -> Result<()> {
        let governor = self
            .governor
            .insert(FrequencyGovernor::new(self.platform, core));

        governor.save()?;
        transition(&mut self.state, SessionState::GovernorSaved);

        governor.apply(name)?;
        self.acquired.push(Facility::Governor);
        transition(&mut self.state, SessionState::GovernorOverridden);

        governor.pin_to_max_frequency()?;
        transition(&mut self.state, SessionState::FrequencyPinned);
        Ok(())
    }

    /// Request a power-latency hint; failure leaves the session without one
    pub fn hint_latency(&mut self, target_us: i32) {
        match self.latency.acquire(target_us) {
            Ok(()) => self.mark(Facility::LatencyHint, SessionState::LatencyHinted),
            Err(e) => {
                tracing::warn!("Continuing without power-latency hint: {}", e);
                self.advance(SessionState::LatencyHinted);
            }
        }
    }

    /// Release every guard, attempting all steps regardless of earlier failures.
    ///
    /// Order: latency hint, memory lock, governor, then the bookkeeping-only
    /// affinity and scheduling guards, and the shield last.
    pub fn unwind(&mut self) -> Vec<RealtimeError> {
        self.advance(SessionState::Unwinding);

        let mut guards: Vec<&mut dyn ResourceGuard> = Vec::with_capacity(6);
        guards.push(&mut self.latency);
        guards.push(&mut self.memory);
        if let Some(governor) = self.governor.as_mut() {
            guards.push(governor);
        }
        guards.push(&mut self.affinity);
        guards.push(&mut self.scheduling);
        guards.push(&mut self.shield);

        let mut errors = Vec::new();
        for guard in guards {
            if let Err(e) = guard.release() {
                tracing::error!("Teardown of {} failed: {}", guard.facility(), e);
                errors.push(e);
            }
        }
        errors
    }

    /// Close the session into its report
    pub fn finish(
        mut self,
        setup_error: Option<RealtimeError>,
        workload: Option<(i32, Duration)>,
        teardown_errors: Vec<RealtimeError>,
    ) -> SessionReport {
        self.advance(SessionState::Done);
        SessionReport {
            target_core: self.target_core,
            acquired: self.acquired,
            saved_governor: self.governor.as_ref().and_then(|g| g.saved().map(str::to_string)),
            workload_status: workload.map(|(status, _)| status),
            workload_duration: workload.map(|(_, elapsed)| elapsed),
            setup_error,
            teardown_errors,
        }
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    tracing::debug!("Session {:?} -> {:?}", state, next);
    *state = next;
}

/// What a session did and how it ended
#[derive(Debug)]
pub struct SessionReport {
    /// Core selected for isolation
    pub target_core: Option<usize>,
    /// Facilities successfully acquired, in order
    pub acquired: Vec<Facility>,
    /// Governor captured before the override
    pub saved_governor: Option<String>,
    /// Workload status, if it ran
    pub workload_status: Option<i32>,
    /// Wall time spent in the workload
    pub workload_duration: Option<Duration>,
    /// Setup step that failed
    pub setup_error: Option<RealtimeError>,
    /// Every teardown step that failed
    pub teardown_errors: Vec<RealtimeError>,
}

impl SessionReport {
    /// Classify the session
    pub fn outcome(&self) -> Outcome {
        if self.setup_error.is_some() || self.workload_status.is_none() {
            Outcome::SetupFailed
        } else if !self.teardown_errors.is_empty() {
            Outcome::TeardownFailed
        } else {
            Outcome::Completed
        }
    }

    /// Whether a latency hint was held while the workload ran
    pub fn latency_hint_held(&self) -> bool {
        self.acquired.contains(&Facility::LatencyHint)
    }

    /// Process exit code for this session
    pub fn exit_code(&self) -> i32 {
        match self.outcome() {
            Outcome::Completed => self.workload_status.unwrap_or(0),
            Outcome::TeardownFailed => TEARDOWN_FAILURE_EXIT,
            Outcome::SetupFailed => match &self.setup_error {
                Some(
                    RealtimeError::PermissionDenied
                    | RealtimeError::TopologyUnavailable(_)
                    | RealtimeError::InvalidCore { .. }
                    | RealtimeError::ConfigError(_),
                ) => PRECONDITION_FAILURE_EXIT,
                _ => SETUP_FAILURE_EXIT,
            },
        }
    }

    /// The workload status if setup and teardown both succeeded, else the failure
    pub fn into_result(self) -> Result<i32> {
        if let Some(err) = self.setup_error {
            return Err(err);
        }
        if let Some(err) = fold_errors(self.teardown_errors) {
            return Err(err);
        }
        self.workload_status
            .ok_or_else(|| RealtimeError::config("workload did not run"))
    }

    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Real-Time Session ===");
        match self.target_core {
            Some(core) => println!("Target core:     {}", core),
            None => println!("Target core:     none"),
        }
        let acquired: Vec<&str> = self.acquired.iter().map(Facility::name).collect();
        println!("Acquired:        {}", acquired.join(", "));
        if let Some(governor) = &self.saved_governor {
            println!("Saved governor:  {}", governor);
        }
        println!(
            "Latency hint:    {}",
            if self.latency_hint_held() { "held" } else { "not held" }
        );

        if let Some(err) = &self.setup_error {
            println!("\nSetup failed:    {}", err);
        }
        if let (Some(status), Some(elapsed)) = (self.workload_status, self.workload_duration) {
            println!("Workload status: {}", status);
            println!(
                "Duration:        {}",
                humantime::format_duration(Duration::from_millis(elapsed.as_millis() as u64))
            );
        }

        if !self.teardown_errors.is_empty() {
            println!("\nTeardown failures: {}", self.teardown_errors.len());
            for err in &self.teardown_errors {
                println!("  {}", err);
            }
        }
    }
}
