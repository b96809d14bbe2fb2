//! Machine status snapshot
//!
//! Reports what a session would touch: privilege, online cores, the default
//! target core, per-core cpufreq state and whether cset is installed.

use super::{topology, Platform};
use crate::config::RealtimeConfig;
use crate::guards::detect_cset;
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Per-core cpufreq state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreStatus {
    /// Core index
    pub index: usize,
    /// Current governor (if readable)
    pub governor: Option<String>,
    /// Rated maximum frequency in kHz (if readable)
    pub max_frequency_khz: Option<u64>,
}

/// Complete status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Running as root
    pub privileged: bool,
    /// Online processors (`None` when the platform cannot tell)
    pub online_cores: Option<usize>,
    /// Physical cores
    pub physical_cores: usize,
    /// Core a full session would isolate
    pub target_core: Option<usize>,
    /// CPU model name
    pub cpu_model: String,
    /// Total physical memory in bytes
    pub memory_total: u64,
    /// Swap total in bytes
    pub swap_total: u64,
    /// Whether the isolation tool answered
    pub isolation_tool: bool,
    /// Per-core frequency state
    pub cores: Vec<CoreStatus>,
}

impl SystemStatus {
    /// Collect a snapshot through `platform`
    pub fn collect(platform: &dyn Platform, config: &RealtimeConfig) -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let cpu_model = sys
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "Unknown".to_string());

        let online_cores = topology::core_count(platform).ok();
        let target_core = online_cores.map(|count| {
            config
                .target_core
                .filter(|&core| core < count)
                .unwrap_or_else(|| topology::default_target_core(count))
        });

        let cores = (0..online_cores.unwrap_or(0))
            .map(|index| CoreStatus {
                index,
                governor: platform.read_governor(index).ok(),
                max_frequency_khz: platform.max_frequency(index).ok(),
            })
            .collect();

        Self {
            privileged: platform.is_privileged(),
            online_cores,
            physical_cores: num_cpus::get_physical(),
            target_core,
            cpu_model,
            memory_total: sys.total_memory(),
            swap_total: sys.total_swap(),
            isolation_tool: detect_cset(&config.cset_program),
            cores,
        }
    }

    /// Whether a full session could start at all
    pub fn ready(&self) -> bool {
        self.privileged && self.online_cores.is_some() && self.isolation_tool
    }

    /// Print status summary to console
    pub fn print_summary(&self) {
        println!("=== Real-Time Readiness ===\n");

        println!("Privileged:      {}", if self.privileged { "yes" } else { "no (run as root)" });
        println!("CPU:             {}", self.cpu_model);
        match self.online_cores {
            Some(count) => println!("Online cores:    {} ({} physical)", count, self.physical_cores),
            None => println!("Online cores:    unknown"),
        }
        if let Some(target) = self.target_core {
            println!("Target core:     {}", target);
        }
        println!("Memory:          {}", humansize::format_size(self.memory_total, humansize::BINARY));
        println!("Swap:            {}", humansize::format_size(self.swap_total, humansize::BINARY));
        println!("cset installed:  {}", if self.isolation_tool { "yes" } else { "no" });

        if !self.cores.is_empty() {
            println!("\nFrequency scaling:");
            for core in &self.cores {
                let marker = if Some(core.index) == self.target_core { " *" } else { "" };
                println!(
                    "  cpu{:<4} governor: {:<12} max: {}{}",
                    core.index,
                    core.governor.as_deref().unwrap_or("n/a"),
                    core.max_frequency_khz
                        .map(|khz| format!("{} MHz", khz / 1000))
                        .unwrap_or_else(|| "n/a".to_string()),
                    marker
                );
            }
        }

        println!("\nReady for full session: {}", if self.ready() { "yes" } else { "no" });
    }
}
