//! Real-time orchestrator
//!
//! Full mode acquires, in order: memory lock, core shield, CPU affinity,
//! scheduling class, frequency governor override and the power-latency
//! hint; runs the workload once on the calling thread; then releases the
//! latency hint, memory lock, governor and shield, attempting every step.
//!
//! A setup failure stops the sequence without running the workload. By
//! default whatever was already acquired stays in place (a shielded core is
//! left shielded); [`SetupFailurePolicy::Rollback`] releases it instead.
//!
//! All of this is machine-wide state. Two sessions running at once, in this
//! process or another, will undo each other's setup; callers must serialize
//! them.

use super::session::{Session, SessionReport, SessionState};
use crate::config::{RealtimeConfig, SetupFailurePolicy};
use crate::error::{RealtimeError, Result};
use crate::guards::{CpuAffinity, CsetTool, IsolationTool, MemoryLock, SchedulingPolicy};
use crate::system::{topology, LinuxPlatform, Platform};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// Drives sessions against a platform and an isolation tool
pub struct Orchestrator<'a> {
    platform: &'a dyn Platform,
    isolation: &'a dyn IsolationTool,
    config: RealtimeConfig,
}

impl<'a> Orchestrator<'a> {
    /// Create an orchestrator
    pub fn new(
        platform: &'a dyn Platform,
        isolation: &'a dyn IsolationTool,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            platform,
            isolation,
            config,
        }
    }

    /// Session configuration
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    fn require_privilege(&self) -> Result<()> {
        if !self.platform.is_privileged() {
            tracing::error!("You need to be root");
            return Err(RealtimeError::PermissionDenied);
        }
        Ok(())
    }

    fn target_core(&self, core_count: usize) -> Result<usize> {
        match self.config.target_core {
            Some(core) => {
                topology::check_core(core, core_count)?;
                Ok(core)
            }
            None => Ok(topology::default_target_core(core_count)),
        }
    }

    fn setup(&self, session: &mut Session<'_>) -> Result<()> {
        self.require_privilege()?;

        session.lock_memory()?;

        let core_count = topology::core_count(self.platform)?;
        let core = self.target_core(core_count)?;
        let neighbor = topology::shield_neighbor(core, core_count);

        session.shield(core, neighbor, std::process::id())?;
        session.pin(core, core_count)?;
        session.schedule(self.config.policy)?;
        session.disable_frequency_scaling(core, &self.config.override_governor)?;
        session.hint_latency(self.config.latency_target_us);
        Ok(())
    }

    /// Run `workload` with `args` under full real-time isolation and report
    /// everything that happened.
    ///
    /// The workload is invoked at most once, only if every setup step
    /// succeeded, and its status never influences teardown. A panicking
    /// workload is unwound through teardown and the panic then resumed.
    pub fn run<F>(&self, workload: F, args: &[String]) -> SessionReport
    where
        F: FnOnce(&[String]) -> i32,
    {
        let mut session = Session::new(self.platform, self.isolation);

        if let Err(err) = self.setup(&mut session) {
            tracing::error!("Setup failed at {:?}: {}", session.state(), err);

            let rollback = self.config.on_setup_failure == SetupFailurePolicy::Rollback
                && !session.acquired().is_empty();
            let teardown_errors = if rollback {
                tracing::warn!("Rolling back {} acquired resources", session.acquired().len());
                session.unwind()
            } else {
                Vec::new()
            };
            return session.finish(Some(err), None, teardown_errors);
        }

        session.advance(SessionState::Running);
        tracing::info!("Running workload with {} arguments", args.len());
        let started = Instant::now();
        let status = match panic::catch_unwind(AssertUnwindSafe(|| workload(args))) {
            Ok(status) => status,
            Err(payload) => {
                tracing::error!("Workload panicked after {:?}, releasing resources", started.elapsed());
                for err in session.unwind() {
                    tracing::error!("{}", err);
                }
                panic::resume_unwind(payload);
            }
        };
        let elapsed = started.elapsed();
        tracing::info!("Workload returned {} after {:?}", status, elapsed);

        let teardown_errors = session.unwind();
        if teardown_errors.is_empty() {
            tracing::info!("Real-time resources released");
        }
        session.finish(None, Some((status, elapsed)), teardown_errors)
    }

    /// Run `workload` under full isolation, returning its status only when
    /// setup and teardown both succeeded
    pub fn realtimeify<F>(&self, workload: F, args: &[String]) -> Result<i32>
    where
        F: FnOnce(&[String]) -> i32,
    {
        self.run(workload, args).into_result()
    }

    /// Lock memory, pin to the soft-mode core and apply the real-time
    /// scheduling class. Nothing is undone afterward; the caller keeps
    /// running under the new configuration.
    pub fn soft_realtimeify(&self) -> Result<()> {
        self.require_privilege()?;

        MemoryLock::new(self.platform).acquire()?;
        CpuAffinity::new(self.platform).acquire(self.config.soft_core, None)?;
        SchedulingPolicy::new(self.platform).acquire(self.config.policy)?;

        tracing::info!("Soft real-time mode active on core {}", self.config.soft_core);
        Ok(())
    }
}

/// Run `workload` under full isolation on this machine with default settings
pub fn realtimeify<F>(workload: F, args: &[String]) -> Result<i32>
where
    F: FnOnce(&[String]) -> i32,
{
    let config = RealtimeConfig::default();
    let platform = LinuxPlatform::new(&config);
    let cset = CsetTool::new(config.cset_program.clone());
    Orchestrator::new(&platform, &cset, config).realtimeify(workload, args)
}

/// Enter soft real-time mode on this machine with default settings
pub fn soft_realtimeify() -> Result<()> {
    let config = RealtimeConfig::default();
    let platform = LinuxPlatform::new(&config);
    let cset = CsetTool::new(config.cset_program.clone());
    Orchestrator::new(&platform, &cset, config).soft_realtimeify()
}
