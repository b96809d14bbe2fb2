//! System access module
//!
//! Provides the OS primitives the resource guards are built on, the
//! topology probe, and a readiness snapshot of the machine.

mod platform;
mod status;
pub mod topology;

#[cfg(test)]
pub(crate) mod fake;

pub use platform::{LatencyHandle, LinuxPlatform, Platform};
pub use status::{CoreStatus, SystemStatus};
pub use topology::core_count;
