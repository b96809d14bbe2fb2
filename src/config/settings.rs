//! Configuration settings for realtimeify
//!
//! Defines all configuration options, CLI arguments, and defaults
//! for a real-time session.

use crate::error::{IoResultExt, RealtimeError, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default sysfs directory holding the per-core `cpuN/cpufreq` trees
pub const DEFAULT_SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

/// Default PM QoS device used for the power-latency hint
pub const DEFAULT_LATENCY_DEVICE: &str = "/dev/cpu_dma_latency";

/// Governor that allows writing `scaling_setspeed` directly
pub const DEFAULT_OVERRIDE_GOVERNOR: &str = "userspace";

/// realtimeify - run a program under best-effort real-time conditions
#[derive(Parser, Debug, Clone)]
#[command(name = "realtimeify")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a program on a shielded, pinned, SCHED_FIFO core")]
#[command(long_about = r#"
realtimeify reconfigures the process environment to approximate hard
real-time behavior on a stock Linux kernel, runs a program, and restores
the machine afterward.

Full mode (run):
  - locks current and future memory of realtimeify itself (mlockall)
  - shields the target core and its neighbor with cset
  - pins the process to the target core
  - switches to SCHED_FIFO at maximum priority
  - disables frequency scaling on the target core
  - requests the lowest power-management latency

PROGRAM runs as a child process. It inherits the shield, affinity and
scheduling class, but not the memory lock: mlockall does not survive
fork or exec. Programs that need locked memory must call mlockall
themselves.

Examples:
  sudo realtimeify run -- ./control-loop --rate 1000
  sudo realtimeify run --core 3 --policy rr -- jackd -d alsa
  sudo realtimeify soft -- ./audio-engine
  realtimeify status --json

Only one session may run per machine at a time: shield removal and
governor restoration are machine-wide.
"#)]
pub struct CliArgs {
    /// JSON configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Session overrides
    #[command(flatten)]
    pub session: SessionArgs,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress the session summary)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags that override fields of [`RealtimeConfig`]
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Target core (default: online cores / 2)
    #[arg(long, global = true, value_name = "CORE")]
    pub core: Option<usize>,

    /// Real-time scheduling policy
    #[arg(long, global = true, value_enum, value_name = "POLICY")]
    pub policy: Option<SchedPolicy>,

    /// Governor installed while the session runs
    #[arg(long, global = true, value_name = "NAME")]
    pub governor: Option<String>,

    /// Requested power-management latency in microseconds (0 = lowest)
    #[arg(long, global = true, value_name = "USECS")]
    pub latency_us: Option<i32>,

    /// Path or name of the cset binary
    #[arg(long, global = true, value_name = "PATH")]
    pub cset: Option<PathBuf>,

    /// Release already-acquired resources when a setup step fails
    #[arg(long, global = true)]
    pub rollback: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a program under full real-time isolation and restore afterward
    #[command(name = "run")]
    Run {
        /// Program and its arguments
        #[arg(trailing_var_arg = true, required = true, value_name = "PROGRAM")]
        program: Vec<String>,
    },

    /// Pin to core 0 and raise priority, then run a program (memory lock covers realtimeify only)
    #[command(name = "soft")]
    Soft {
        /// Program and its arguments
        #[arg(trailing_var_arg = true, required = true, value_name = "PROGRAM")]
        program: Vec<String>,
    },

    /// Show privilege, topology and per-core frequency state
    #[command(name = "status")]
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Real-time scheduling class
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// First-in first-out fixed priority
    #[default]
    #[value(name = "fifo")]
    Fifo,
    /// Round-robin fixed priority
    #[value(name = "rr")]
    #[serde(rename = "rr")]
    RoundRobin,
}

impl SchedPolicy {
    /// Raw policy constant for the scheduler syscalls
    pub fn as_raw(&self) -> libc::c_int {
        match self {
            Self::Fifo => libc::SCHED_FIFO,
            Self::RoundRobin => libc::SCHED_RR,
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fifo => "SCHED_FIFO",
            Self::RoundRobin => "SCHED_RR",
        }
    }
}

/// What to do with already-acquired resources when a setup step fails
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SetupFailurePolicy {
    /// Stop immediately and leave acquired resources in place
    #[default]
    Abort,
    /// Stop and release whatever was acquired, best effort
    Rollback,
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Directory containing `cpuN/cpufreq`
    pub sysfs_cpu_root: PathBuf,
    /// PM QoS latency device
    pub latency_device: PathBuf,
    /// Latency requested while the workload runs (microseconds)
    pub latency_target_us: i32,
    /// Governor installed on the target core
    pub override_governor: String,
    /// Scheduling class applied to the process
    pub policy: SchedPolicy,
    /// Explicit target core; `None` selects online cores / 2
    pub target_core: Option<usize>,
    /// Core used by soft mode
    pub soft_core: usize,
    /// cset binary
    pub cset_program: PathBuf,
    /// Behavior on setup failure
    pub on_setup_failure: SetupFailurePolicy,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            sysfs_cpu_root: PathBuf::from(DEFAULT_SYSFS_CPU_ROOT),
            latency_device: PathBuf::from(DEFAULT_LATENCY_DEVICE),
            latency_target_us: 0,
            override_governor: DEFAULT_OVERRIDE_GOVERNOR.to_string(),
            policy: SchedPolicy::Fifo,
            target_core: None,
            soft_core: 0,
            cset_program: PathBuf::from("cset"),
            on_setup_failure: SetupFailurePolicy::Abort,
        }
    }
}

impl RealtimeConfig {
    /// Load a configuration file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Create config from CLI arguments, layered over `--config` if given
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let session = &args.session;
        if let Some(core) = session.core {
            config.target_core = Some(core);
        }
        if let Some(policy) = session.policy {
            config.policy = policy;
        }
        if let Some(governor) = &session.governor {
            config.override_governor = governor.clone();
        }
        if let Some(latency) = session.latency_us {
            config.latency_target_us = latency;
        }
        if let Some(cset) = &session.cset {
            config.cset_program = cset.clone();
        }
        if session.rollback {
            config.on_setup_failure = SetupFailurePolicy::Rollback;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values no session could run with
    pub fn validate(&self) -> Result<()> {
        if self.override_governor.trim().is_empty() {
            return Err(RealtimeError::config("override governor must not be empty"));
        }
        if self.cset_program.as_os_str().is_empty() {
            return Err(RealtimeError::config("cset program must not be empty"));
        }
        if self.latency_target_us < 0 {
            return Err(RealtimeError::config(format!(
                "latency target must be non-negative, got {}",
                self.latency_target_us
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RealtimeConfig::default();
        assert_eq!(config.override_governor, "userspace");
        assert_eq!(config.policy, SchedPolicy::Fifo);
        assert_eq!(config.soft_core, 0);
        assert_eq!(config.on_setup_failure, SetupFailurePolicy::Abort);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let args = CliArgs::parse_from([
            "realtimeify",
            "run",
            "--core",
            "3",
            "--policy",
            "rr",
            "--rollback",
            "--",
            "./loop",
            "--rate",
            "1000",
        ]);
        let config = RealtimeConfig::from_cli(&args).unwrap();
        assert_eq!(config.target_core, Some(3));
        assert_eq!(config.policy, SchedPolicy::RoundRobin);
        assert_eq!(config.on_setup_failure, SetupFailurePolicy::Rollback);

        match args.command {
            Commands::Run { program } => assert_eq!(program, vec!["./loop", "--rate", "1000"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rt.json");
        std::fs::write(&path, r#"{ "policy": "rr", "latency_target_us": 10 }"#).unwrap();

        let config = RealtimeConfig::from_file(&path).unwrap();
        assert_eq!(config.policy, SchedPolicy::RoundRobin);
        assert_eq!(config.latency_target_us, 10);
        assert_eq!(config.sysfs_cpu_root, PathBuf::from(DEFAULT_SYSFS_CPU_ROOT));
    }

    #[test]
    fn test_validation() {
        let config = RealtimeConfig {
            override_governor: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RealtimeError::ConfigError(_))));

        let config = RealtimeConfig {
            latency_target_us: -1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_raw() {
        assert_eq!(SchedPolicy::Fifo.as_raw(), libc::SCHED_FIFO);
        assert_eq!(SchedPolicy::RoundRobin.name(), "SCHED_RR");
    }
}
