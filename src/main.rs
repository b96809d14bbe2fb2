//! realtimeify CLI
//!
//! Runs a program with real-time isolation on this machine.

use clap::Parser;
use realtimeify::config::{CliArgs, Commands, RealtimeConfig};
use realtimeify::core::{Orchestrator, PRECONDITION_FAILURE_EXIT, SETUP_FAILURE_EXIT};
use realtimeify::error::{RealtimeError, Result};
use realtimeify::guards::CsetTool;
use realtimeify::system::{LinuxPlatform, SystemStatus};
use std::os::unix::process::ExitStatusExt;
use std::process::Command;
use tracing_subscriber::EnvFilter;

/// Status reported when the workload program cannot be started
const SPAWN_FAILURE_EXIT: i32 = 127;

fn main() {
    let args = CliArgs::parse();
    init_logging(&args);

    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(failure_exit_code(&e));
        }
    }
}

fn init_logging(args: &CliArgs) {
    let level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if args.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn failure_exit_code(err: &RealtimeError) -> i32 {
    match err {
        RealtimeError::PermissionDenied
        | RealtimeError::TopologyUnavailable(_)
        | RealtimeError::InvalidCore { .. }
        | RealtimeError::ConfigError(_) => PRECONDITION_FAILURE_EXIT,
        _ => SETUP_FAILURE_EXIT,
    }
}

fn run(args: CliArgs) -> Result<i32> {
    let config = RealtimeConfig::from_cli(&args)?;

    if args.verbose > 0 {
        print_config(&config);
    }

    match &args.command {
        Commands::Run { program } => cmd_run(config, program, args.quiet),
        Commands::Soft { program } => cmd_soft(config, program),
        Commands::Status { json } => cmd_status(&config, *json),
    }
}

fn cmd_run(config: RealtimeConfig, program: &[String], quiet: bool) -> Result<i32> {
    let platform = LinuxPlatform::new(&config);
    let cset = CsetTool::new(config.cset_program.clone());
    let orchestrator = Orchestrator::new(&platform, &cset, config);

    let report = orchestrator.run(spawn_workload, program);
    if !quiet {
        report.print_summary();
    }
    Ok(report.exit_code())
}

fn cmd_soft(config: RealtimeConfig, program: &[String]) -> Result<i32> {
    let platform = LinuxPlatform::new(&config);
    let cset = CsetTool::new(config.cset_program.clone());

    // Affinity and scheduling class carry over to the child; the memory lock
    // covers this process only
    Orchestrator::new(&platform, &cset, config).soft_realtimeify()?;
    Ok(spawn_workload(program))
}

fn cmd_status(config: &RealtimeConfig, json: bool) -> Result<i32> {
    let platform = LinuxPlatform::new(config);
    let status = SystemStatus::collect(&platform, config);

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        status.print_summary();
    }
    Ok(if status.ready() { 0 } else { PRECONDITION_FAILURE_EXIT })
}

/// Run `program[0]` with the remaining arguments and wait for it.
///
/// A child killed by a signal reports `128 + signal`, as shells do. The
/// child inherits CPU affinity, scheduling class and cpuset membership but
/// not the memory lock, which neither fork nor exec carries over.
fn spawn_workload(program: &[String]) -> i32 {
    let Some((name, rest)) = program.split_first() else {
        tracing::error!("No program given");
        return SPAWN_FAILURE_EXIT;
    };

    tracing::warn!("Memory lock applies to realtimeify only; '{}' runs unlocked", name);

    match Command::new(name).args(rest).status() {
        Ok(status) => status
            .code()
            .or_else(|| status.signal().map(|signal| 128 + signal))
            .unwrap_or(1),
        Err(e) => {
            tracing::error!("Failed to start '{}': {}", name, e);
            SPAWN_FAILURE_EXIT
        }
    }
}

fn print_config(config: &RealtimeConfig) {
    eprintln!("=== Configuration ===");
    match config.target_core {
        Some(core) => eprintln!("Target core:      {}", core),
        None => eprintln!("Target core:      auto (online / 2)"),
    }
    eprintln!("Soft-mode core:   {}", config.soft_core);
    eprintln!("Policy:           {}", config.policy.name());
    eprintln!("Governor:         {}", config.override_governor);
    eprintln!("Latency target:   {} µs", config.latency_target_us);
    eprintln!("cset:             {}", config.cset_program.display());
    eprintln!("sysfs cpu root:   {}", config.sysfs_cpu_root.display());
    eprintln!("Latency device:   {}", config.latency_device.display());
    eprintln!("On setup failure: {:?}", config.on_setup_failure);
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_workload_status_passed_through() {
        assert_eq!(spawn_workload(&program(&["true"])), 0);
        assert_eq!(spawn_workload(&program(&["false"])), 1);
        assert_eq!(spawn_workload(&program(&["sh", "-c", "exit 42"])), 42);
    }

    #[test]
    fn test_missing_program() {
        assert_eq!(spawn_workload(&program(&["/nonexistent/bin"])), SPAWN_FAILURE_EXIT);
        assert_eq!(spawn_workload(&[]), SPAWN_FAILURE_EXIT);
    }

    #[test]
    fn test_killed_by_signal() {
        assert_eq!(spawn_workload(&program(&["sh", "-c", "kill -9 $$"])), 128 + 9);
    }

    #[test]
    fn test_precondition_exit_codes() {
        assert_eq!(failure_exit_code(&RealtimeError::PermissionDenied), PRECONDITION_FAILURE_EXIT);
        assert_eq!(
            failure_exit_code(&RealtimeError::collaborator("cset shield -r", "exit status: 1")),
            SETUP_FAILURE_EXIT
        );
    }
}
