//! Core shield guard and the cset integration behind it
//!
//! cset (cpuset) carves a set of cores out of the general scheduling domain,
//! moves kernel threads off them and lets a chosen pid run there alone.
//! Removal is global: `cset shield -r` tears down every shield on the
//! machine, not just the one this process created.

use super::{Facility, ResourceGuard};
use crate::error::{RealtimeError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// External core-isolation collaborator
pub trait IsolationTool {
    /// Shield `core_a` and `core_b`, moving kernel threads off them
    fn create(&self, core_a: usize, core_b: usize) -> Result<()>;

    /// Move `pid` into the shield
    fn assign(&self, pid: u32) -> Result<()>;

    /// Remove all shielding
    fn remove(&self) -> Result<()>;
}

/// Check whether `program` runs and answers `--version`
pub fn detect_cset(program: &Path) -> bool {
    Command::new(program)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// [`IsolationTool`] driving the `cset` command line
#[derive(Debug, Clone)]
pub struct CsetTool {
    program: PathBuf,
}

impl Default for CsetTool {
    fn default() -> Self {
        Self::new("cset")
    }
}

impl CsetTool {
    /// Create a tool invoking `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn shield(&self, args: &[String]) -> Result<()> {
        let command_line = format!("{} shield {}", self.program.display(), args.join(" "));
        tracing::debug!("Running '{}'", command_line);

        let output = Command::new(&self.program)
            .arg("shield")
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| RealtimeError::collaborator(&command_line, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RealtimeError::collaborator(
                command_line,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

impl IsolationTool for CsetTool {
    fn create(&self, core_a: usize, core_b: usize) -> Result<()> {
        self.shield(&[
            "-c".to_string(),
            format!("{},{}", core_a, core_b),
            "-k".to_string(),
            "on".to_string(),
        ])
    }

    fn assign(&self, pid: u32) -> Result<()> {
        self.shield(&["--shield".to_string(), "--pid".to_string(), pid.to_string()])
    }

    fn remove(&self) -> Result<()> {
        self.shield(&["-r".to_string()])
    }
}

/// Shields the target core and its neighbor for the calling process
pub struct CoreShield<'a> {
    tool: &'a dyn IsolationTool,
    created: bool,
    assigned: bool,
}

impl<'a> CoreShield<'a> {
    /// Create a guard with no shield
    pub fn new(tool: &'a dyn IsolationTool) -> Self {
        Self {
            tool,
            created: false,
            assigned: false,
        }
    }

    /// Shield `core` and `neighbor`, then move `pid` into the shield
    pub fn acquire(&mut self, core: usize, neighbor: usize, pid: u32) -> Result<()> {
        self.tool
            .create(core, neighbor)
            .map_err(|e| RealtimeError::acquire(Facility::CoreShield, e))?;
        self.created = true;

        self.tool
            .assign(pid)
            .map_err(|e| RealtimeError::acquire(Facility::CoreShield, e))?;
        self.assigned = true;

        tracing::info!("Target core {} shielded (with core {})", core, neighbor);
        Ok(())
    }
}

impl ResourceGuard for CoreShield<'_> {
    fn facility(&self) -> Facility {
        Facility::CoreShield
    }

    fn is_acquired(&self) -> bool {
        self.assigned
    }

    /// Removes the shield if it was created, even when the pid never moved in
    fn release(&mut self) -> Result<()> {
        if !self.created {
            return Ok(());
        }
        self.created = false;
        self.assigned = false;
        self.tool
            .remove()
            .map_err(|e| RealtimeError::release(Facility::CoreShield, e))?;
        tracing::debug!("Core shield removed");
        Ok(())
    }
}
