//! Resource governor.
//!
//! Reads live CPU, memory and disk state to size the segment worker pool,
//! to hold back a batch while the machine is saturated, and to refuse a run
//! that cannot fit on disk.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::{CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, info, warn};

const GIB: u64 = 1024 * 1024 * 1024;

/// Below this much available memory the pool runs at its minimum size.
const LOW_MEMORY_BYTES: u64 = 4 * GIB;
/// At or above this much available memory the pool may use every CPU.
const HIGH_MEMORY_BYTES: u64 = 8 * GIB;

/// Worker count for the given available memory and CPU count.
///
/// Under 4 GiB: `min`. 4 to 8 GiB: `min(cpus / 2, max)`. 8 GiB or more:
/// `min(cpus, max)`. Never below `min`.
pub fn workers_for(available_memory: u64, cpu_count: usize, min: usize, max: usize) -> usize {
    let workers = if available_memory < LOW_MEMORY_BYTES {
        min
    } else if available_memory < HIGH_MEMORY_BYTES {
        (cpu_count / 2).min(max)
    } else {
        cpu_count.min(max)
    };
    workers.max(min)
}

/// Thresholds for the throttle wait loop.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Percent of total CPU.
    pub cpu_threshold: f32,
    /// Percent of total memory in use.
    pub memory_threshold: f32,
    pub poll_interval: Duration,
    /// Give up waiting and proceed after this long.
    pub max_wait: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: 90.0,
            memory_threshold: 85.0,
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(300),
        }
    }
}

/// One reading of CPU and memory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSample {
    pub cpu_count: usize,
    pub cpu_percent: f32,
    pub total_memory: u64,
    pub available_memory: u64,
    pub memory_percent: f32,
}

impl ResourceSample {
    pub fn exceeds(&self, config: &ThrottleConfig) -> bool {
        self.cpu_percent > config.cpu_threshold || self.memory_percent > config.memory_threshold
    }
}

/// Result of a disk space check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskSpaceStatus {
    Ok {
        available_bytes: u64,
    },
    InsufficientSpace {
        available_bytes: u64,
        required_bytes: u64,
    },
    /// No mounted disk could be matched to the path.
    Unknown,
}

impl DiskSpaceStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, DiskSpaceStatus::Ok { .. })
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, DiskSpaceStatus::InsufficientSpace { .. })
    }
}

/// Machine state logged at pipeline start.
#[derive(Debug, Clone, Serialize)]
pub struct SystemSnapshot {
    #[serde(flatten)]
    pub resources: ResourceSample,
    pub output_path: PathBuf,
    pub disk_available_bytes: Option<u64>,
}

pub struct ResourceGovernor {
    system: Mutex<System>,
    config: ThrottleConfig,
}

impl ResourceGovernor {
    pub fn new(config: ThrottleConfig) -> Self {
        let mut system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        // CPU usage is a delta between refreshes; take the baseline now.
        system.refresh_cpu_all();
        Self {
            system: Mutex::new(system),
            config,
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    pub fn sample(&self) -> ResourceSample {
        let mut system = self.system.lock();
        system.refresh_cpu_all();
        system.refresh_memory();

        let cpu_count = match system.cpus().len() {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };
        let total_memory = system.total_memory();
        let used_memory = system.used_memory();
        let memory_percent = if total_memory > 0 {
            (used_memory as f64 / total_memory as f64 * 100.0) as f32
        } else {
            0.0
        };

        ResourceSample {
            cpu_count,
            cpu_percent: system.global_cpu_usage(),
            total_memory,
            available_memory: system.available_memory(),
            memory_percent,
        }
    }

    /// Worker pool size for a batch, from current available memory and CPUs.
    pub fn optimal_workers(&self, min: usize, max: usize) -> usize {
        let sample = self.sample();
        let workers = workers_for(sample.available_memory, sample.cpu_count, min, max);
        info!(
            workers,
            available_gib = sample.available_memory as f64 / GIB as f64,
            cpus = sample.cpu_count,
            "Sized worker pool"
        );
        workers
    }

    pub fn should_throttle(&self) -> bool {
        let sample = self.sample();
        let throttle = sample.exceeds(&self.config);
        if throttle {
            debug!(
                cpu = sample.cpu_percent,
                memory = sample.memory_percent,
                "System under load"
            );
        }
        throttle
    }

    /// Poll until load drops below the thresholds or `max_wait` passes.
    ///
    /// Returns `false` when it gave up; the caller proceeds either way.
    pub async fn wait_for_resources(&self) -> bool {
        let started = Instant::now();
        loop {
            if !self.should_throttle() {
                return true;
            }
            let waited = started.elapsed();
            if waited >= self.config.max_wait {
                warn!(
                    "Resources still constrained after {:?}, proceeding anyway",
                    waited
                );
                return false;
            }
            let remaining = self.config.max_wait - waited;
            tokio::time::sleep(self.config.poll_interval.min(remaining)).await;
        }
    }

    /// Check free space on the disk holding `path`.
    pub fn check_disk_space(&self, path: &Path, required_bytes: u64) -> DiskSpaceStatus {
        match available_space_for_path(path) {
            Some(available_bytes) if available_bytes >= required_bytes => {
                debug!(
                    "Disk space OK: {} bytes available, {} bytes required",
                    available_bytes, required_bytes
                );
                DiskSpaceStatus::Ok { available_bytes }
            }
            Some(available_bytes) => {
                warn!(
                    "Insufficient disk space: {} bytes available, {} bytes required",
                    available_bytes, required_bytes
                );
                DiskSpaceStatus::InsufficientSpace {
                    available_bytes,
                    required_bytes,
                }
            }
            None => {
                warn!("Could not determine disk space for path: {}", path.display());
                DiskSpaceStatus::Unknown
            }
        }
    }

    /// Best-effort check; an undeterminable disk counts as enough.
    pub fn has_disk_space(&self, path: &Path, required_gb: f64) -> bool {
        !self
            .check_disk_space(path, gb_to_bytes(required_gb))
            .is_insufficient()
    }

    pub fn snapshot(&self, output_path: &Path) -> SystemSnapshot {
        SystemSnapshot {
            resources: self.sample(),
            output_path: output_path.to_path_buf(),
            disk_available_bytes: available_space_for_path(output_path),
        }
    }
}

impl Default for ResourceGovernor {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

pub fn gb_to_bytes(gb: f64) -> u64 {
    if gb <= 0.0 {
        0
    } else {
        (gb * GIB as f64) as u64
    }
}

/// Nearest existing ancestor of `path`, canonicalized.
fn resolve_existing(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    absolute
        .ancestors()
        .find(|p| p.exists())
        .and_then(|p| p.canonicalize().ok())
}

/// Available bytes on the disk with the longest mount point containing `path`.
fn available_space_for_path(path: &Path) -> Option<u64> {
    let resolved = resolve_existing(path)?;
    let disks = Disks::new_with_refreshed_list();

    let mut best_match: Option<(&sysinfo::Disk, usize)> = None;
    for disk in disks.list() {
        let mount_point = disk.mount_point();
        if resolved.starts_with(mount_point) {
            let mount_len = mount_point.as_os_str().len();
            if best_match.is_none_or(|(_, len)| mount_len > len) {
                best_match = Some((disk, mount_len));
            }
        }
    }

    best_match.map(|(disk, _)| disk.available_space())
}
