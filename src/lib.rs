//! # realtimeify - Best-effort real-time execution on Linux
//!
//! Runs a workload with as much real-time isolation as the machine allows,
//! then puts the machine back the way it was.
//!
//! ## What a full session does
//!
//! - **Memory lock**: all current and future pages pinned in RAM
//! - **Core shield**: the target core and a neighbor carved out with `cset`
//! - **CPU affinity**: the process pinned to the target core
//! - **Scheduling**: `SCHED_FIFO` (or `SCHED_RR`) at the maximum priority
//! - **Frequency governor**: saved, overridden and the clock pinned at max
//! - **Power-latency hint**: `/dev/cpu_dma_latency` held open at 0 µs
//!
//! After the workload returns, the latency hint, memory lock, governor and
//! shield are released in that order. Every release is attempted even when
//! an earlier one fails.
//!
//! ## Quick Start
//!
//! ```no_run
//! use realtimeify::realtimeify;
//!
//! let args = vec!["--iterations".to_string(), "1000".to_string()];
//! let status = realtimeify(|args| {
//!     println!("running with {:?}", args);
//!     0
//! }, &args).unwrap();
//! ```
//!
//! ## Custom configuration
//!
//! ```no_run
//! use realtimeify::config::{RealtimeConfig, SchedPolicy, SetupFailurePolicy};
//! use realtimeify::core::Orchestrator;
//! use realtimeify::guards::CsetTool;
//! use realtimeify::system::LinuxPlatform;
//!
//! let config = RealtimeConfig {
//!     target_core: Some(3),
//!     policy: SchedPolicy::RoundRobin,
//!     on_setup_failure: SetupFailurePolicy::Rollback,
//!     ..Default::default()
//! };
//! let platform = LinuxPlatform::new(&config);
//! let cset = CsetTool::new(config.cset_program.clone());
//!
//! let report = Orchestrator::new(&platform, &cset, config).run(|_| 0, &[]);
//! report.print_summary();
//! std::process::exit(report.exit_code());
//! ```
//!
//! ## Soft mode
//!
//! ```no_run
//! // Lock memory, pin to core 0 and switch to SCHED_FIFO; nothing is undone
//! realtimeify::soft_realtimeify().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod guards;
pub mod system;

// Re-export commonly used types
pub use crate::config::{RealtimeConfig, SchedPolicy, SetupFailurePolicy};
pub use crate::core::{realtimeify, soft_realtimeify, Orchestrator, Outcome, SessionReport};
pub use crate::error::{RealtimeError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use realtimeify::prelude::*;
    //! ```

    pub use crate::config::{RealtimeConfig, SchedPolicy, SetupFailurePolicy};
    pub use crate::core::{realtimeify, soft_realtimeify, Orchestrator, Outcome, SessionReport};
    pub use crate::error::{RealtimeError, Result};
    pub use crate::guards::{CsetTool, Facility, IsolationTool, ResourceGuard};
    pub use crate::system::{LinuxPlatform, Platform, SystemStatus};
}
