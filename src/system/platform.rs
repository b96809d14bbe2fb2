//! Operating-system surface used by the resource guards
//!
//! Every real-time facility boils down to one syscall or one sysfs write.
//! [`Platform`] collects those primitives behind a trait so the guards and
//! the orchestrator can run against a recording fake in tests.

use crate::config::{RealtimeConfig, SchedPolicy};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Open power-latency hint. Dropping or closing it cancels the request.
#[derive(Debug)]
pub struct LatencyHandle {
    file: Option<File>,
    target_us: i32,
}

impl LatencyHandle {
    /// Wrap an open latency device (or `None` for platforms that keep no descriptor)
    pub fn new(file: Option<File>, target_us: i32) -> Self {
        Self { file, target_us }
    }

    /// Requested latency in microseconds
    pub fn target_us(&self) -> i32 {
        self.target_us
    }

    /// Close the underlying descriptor
    pub fn close(mut self) -> io::Result<()> {
        use std::os::fd::IntoRawFd;

        // File's Drop swallows close(2) errors
        if let Some(file) = self.file.take() {
            nix::unistd::close(file.into_raw_fd())
                .map_err(|e| io::Error::new(io::Error::from(e).kind(), format!("close failed: {}", e)))?;
        }
        Ok(())
    }
}

/// Process-wide real-time primitives
pub trait Platform {
    /// Whether the calling process runs with root privilege
    fn is_privileged(&self) -> bool;

    /// Raw count of online processors as reported by the OS (may be <= 0)
    fn online_cpus(&self) -> i64;

    /// Lock current and future pages in memory
    fn lock_memory(&self) -> io::Result<()>;

    /// Undo [`Platform::lock_memory`]
    fn unlock_memory(&self) -> io::Result<()>;

    /// Restrict the calling process to `core`
    fn set_affinity(&self, core: usize, core_count: usize) -> io::Result<()>;

    /// Switch to `policy` at its maximum priority; returns the priority applied
    fn set_scheduler(&self, policy: SchedPolicy) -> io::Result<i32>;

    /// Current frequency governor name of `core`
    fn read_governor(&self, core: usize) -> io::Result<String>;

    /// Install `name` as the frequency governor of `core`
    fn write_governor(&self, core: usize, name: &str) -> io::Result<()>;

    /// Maximum rated frequency of `core` in kHz
    fn max_frequency(&self, core: usize) -> io::Result<u64>;

    /// Set `core` to its maximum frequency; returns the frequency in kHz
    fn pin_max_frequency(&self, core: usize) -> io::Result<u64>;

    /// Open the latency device and request `target_us`
    fn open_latency_hint(&self, target_us: i32) -> io::Result<LatencyHandle>;

    /// Cancel a latency request
    fn close_latency_hint(&self, handle: LatencyHandle) -> io::Result<()>;
}

/// Linux implementation backed by libc/nix syscalls and cpufreq sysfs files
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    sysfs_cpu_root: PathBuf,
    latency_device: PathBuf,
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new(&RealtimeConfig::default())
    }
}

impl LinuxPlatform {
    /// Create a platform reading the paths configured in `config`
    pub fn new(config: &RealtimeConfig) -> Self {
        Self {
            sysfs_cpu_root: config.sysfs_cpu_root.clone(),
            latency_device: config.latency_device.clone(),
        }
    }

    fn cpufreq_file(&self, core: usize, name: &str) -> PathBuf {
        self.sysfs_cpu_root
            .join(format!("cpu{}", core))
            .join("cpufreq")
            .join(name)
    }

    fn read_value(path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| annotate(path, e))
    }

    fn write_value(path: &Path, value: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| annotate(path, e))?;
        file.write_all(value.as_bytes()).map_err(|e| annotate(path, e))
    }
}

fn annotate(path: &Path, err: io::Error) -> io::Error {
    io::Error::new(err.kind(), format!("{}: {}", path.display(), err))
}

fn syscall_error(name: &str) -> io::Error {
    let err = io::Error::last_os_error();
    io::Error::new(err.kind(), format!("{} failed: {}", name, err))
}

impl Platform for LinuxPlatform {
    fn is_privileged(&self) -> bool {
        nix::unistd::getuid().is_root()
    }

    fn online_cpus(&self) -> i64 {
        unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) as i64 }
    }

    fn lock_memory(&self) -> io::Result<()> {
        use nix::sys::mman::{mlockall, MlockAllFlags};

        mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE)
            .map_err(|e| io::Error::new(io::Error::from(e).kind(), format!("mlockall failed: {}", e)))
    }

    fn unlock_memory(&self) -> io::Result<()> {
        nix::sys::mman::munlockall()
            .map_err(|e| io::Error::new(io::Error::from(e).kind(), format!("munlockall failed: {}", e)))
    }

    fn set_affinity(&self, core: usize, core_count: usize) -> io::Result<()> {
        use nix::sched::{sched_setaffinity, CpuSet};
        use nix::unistd::Pid;

        if core >= core_count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("core {} out of range ({} online)", core, core_count),
            ));
        }

        let mut cpu_set = CpuSet::new();
        cpu_set
            .set(core)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("CpuSet::set failed: {}", e)))?;

        sched_setaffinity(Pid::from_raw(0), &cpu_set)
            .map_err(|e| io::Error::new(io::Error::from(e).kind(), format!("sched_setaffinity failed: {}", e)))
    }

    fn set_scheduler(&self, policy: SchedPolicy) -> io::Result<i32> {
        let mut param = libc::sched_param { sched_priority: 0 };

        if unsafe { libc::sched_getparam(0, &mut param) } != 0 {
            return Err(syscall_error("sched_getparam"));
        }

        let max = unsafe { libc::sched_get_priority_max(policy.as_raw()) };
        if max < 0 {
            return Err(syscall_error("sched_get_priority_max"));
        }
        param.sched_priority = max;

        if unsafe { libc::sched_setscheduler(0, policy.as_raw(), &param) } != 0 {
            return Err(syscall_error("sched_setscheduler"));
        }

        Ok(max)
    }

    fn read_governor(&self, core: usize) -> io::Result<String> {
        let governor = Self::read_value(&self.cpufreq_file(core, "scaling_governor"))?;
        if governor.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("cpu{} reports an empty scaling governor", core),
            ));
        }
        Ok(governor)
    }

    fn write_governor(&self, core: usize, name: &str) -> io::Result<()> {
        Self::write_value(&self.cpufreq_file(core, "scaling_governor"), name)
    }

    fn max_frequency(&self, core: usize) -> io::Result<u64> {
        let path = self.cpufreq_file(core, "cpuinfo_max_freq");
        let raw = Self::read_value(&path)?;
        raw.parse::<u64>().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: invalid frequency '{}': {}", path.display(), raw, e),
            )
        })
    }

    fn pin_max_frequency(&self, core: usize) -> io::Result<u64> {
        let max = self.max_frequency(core)?;
        Self::write_value(&self.cpufreq_file(core, "scaling_setspeed"), &max.to_string())?;
        Ok(max)
    }

    fn open_latency_hint(&self, target_us: i32) -> io::Result<LatencyHandle> {
        let path = &self.latency_device;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| annotate(path, e))?;

        // The device takes a raw native-endian s32; the request holds while the fd is open
        file.write_all(&target_us.to_ne_bytes())
            .map_err(|e| annotate(path, e))?;

        Ok(LatencyHandle::new(Some(file), target_us))
    }

    fn close_latency_hint(&self, handle: LatencyHandle) -> io::Result<()> {
        handle.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Build a fake `cpuN/cpufreq` tree under a temp dir
    fn fake_sysfs(cores: usize, governor: &str, max_khz: u64) -> (TempDir, LinuxPlatform) {
        let dir = TempDir::new().unwrap();
        for core in 0..cores {
            let cpufreq = dir.path().join(format!("cpu{}", core)).join("cpufreq");
            std::fs::create_dir_all(&cpufreq).unwrap();
            std::fs::write(cpufreq.join("scaling_governor"), format!("{}\n", governor)).unwrap();
            std::fs::write(cpufreq.join("cpuinfo_max_freq"), format!("{}\n", max_khz)).unwrap();
            std::fs::write(cpufreq.join("scaling_setspeed"), "<unsupported>\n").unwrap();
        }

        let config = RealtimeConfig {
            sysfs_cpu_root: dir.path().to_path_buf(),
            latency_device: dir.path().join("cpu_dma_latency"),
            ..Default::default()
        };
        let platform = LinuxPlatform::new(&config);
        (dir, platform)
    }

    #[test]
    fn test_governor_save_restore_round_trip() {
        let (_dir, platform) = fake_sysfs(4, "schedutil", 3_600_000);

        let saved = platform.read_governor(2).unwrap();
        assert_eq!(saved, "schedutil");

        platform.write_governor(2, "userspace").unwrap();
        assert_eq!(platform.read_governor(2).unwrap(), "userspace");

        platform.write_governor(2, &saved).unwrap();
        assert_eq!(platform.read_governor(2).unwrap(), "schedutil");
        assert_eq!(platform.read_governor(1).unwrap(), "schedutil");
    }

    #[test]
    fn test_pin_max_frequency_copies_rated_max() {
        let (dir, platform) = fake_sysfs(2, "userspace", 2_400_000);

        let khz = platform.pin_max_frequency(1).unwrap();
        assert_eq!(khz, 2_400_000);

        let written =
            std::fs::read_to_string(dir.path().join("cpu1/cpufreq/scaling_setspeed")).unwrap();
        assert_eq!(written, "2400000");
    }

    #[test]
    fn test_missing_cpufreq_reports_path() {
        let (_dir, platform) = fake_sysfs(1, "performance", 1_000_000);

        let err = platform.read_governor(7).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("cpu7"));
    }

    #[test]
    fn test_invalid_max_frequency() {
        let (dir, platform) = fake_sysfs(1, "performance", 0);
        std::fs::write(dir.path().join("cpu0/cpufreq/cpuinfo_max_freq"), "fast\n").unwrap();

        let err = platform.pin_max_frequency(0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_latency_hint_writes_native_s32() {
        let (dir, platform) = fake_sysfs(1, "performance", 1_000_000);
        let device = dir.path().join("cpu_dma_latency");
        std::fs::write(&device, b"").unwrap();

        let handle = platform.open_latency_hint(0).unwrap();
        assert_eq!(handle.target_us(), 0);
        platform.close_latency_hint(handle).unwrap();

        let bytes = std::fs::read(&device).unwrap();
        assert_eq!(bytes, 0i32.to_ne_bytes());
    }

    #[test]
    fn test_latency_hint_missing_device() {
        let (_dir, platform) = fake_sysfs(1, "performance", 1_000_000);
        assert!(platform.open_latency_hint(0).is_err());
    }

    #[test]
    fn test_online_cpus_positive() {
        assert!(LinuxPlatform::default().online_cpus() > 0);
    }

    #[test]
    fn test_affinity_rejects_out_of_range() {
        let platform = LinuxPlatform::default();
        let err = platform.set_affinity(4, 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
