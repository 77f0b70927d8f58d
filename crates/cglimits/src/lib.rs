//! # cglimits
//!
//! Discover the resource limits a process runs under and watch for memory
//! pressure, from inside the process.
//!
//! ## Features
//!
//! - **CPU quota**: `cpu.max` (v2) or `cpu.cfs_quota_us`/`cpu.cfs_period_us` (v1)
//! - **Memory limits**: `memory.high`/`memory.max` (v2) or the v1 soft/hard limits
//! - **Memory pressure**: a kernel PSI trigger when it can be armed, polling otherwise
//!
//! ## Usage
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use cglimits::pressure::Threshold;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> cglimits_common::LimitsResult<()> {
//! let cpu = cglimits::cpu_quota()?;
//! if let Some(cores) = cpu.cores() {
//!     println!("limited to {cores:.2} CPUs");
//! }
//!
//! let cancel = CancellationToken::new();
//! let threshold = Threshold::new(Duration::from_millis(150))?;
//! let mut events = cglimits::watch_memory_pressure(cancel.clone(), threshold)?;
//! while events.recv().await.is_some() {
//!     // shed load
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod controller;
pub mod hierarchy;
pub mod mount;
pub mod pressure;

use cglimits_common::{LimitsResult, SysPaths};
use tokio_util::sync::CancellationToken;

pub use controller::{CpuQuota, MemoryLimits, Setting};
pub use hierarchy::{CgroupLocator, CgroupRecord, Hierarchy};
pub use mount::MountContext;
pub use pressure::{PressureEvents, PressureMonitor, Strategy, Threshold};

/// Limit lookups against one filesystem root.
#[derive(Debug, Clone)]
pub struct Limits {
    paths: SysPaths,
    mount: MountContext,
}

impl Limits {
    /// Lookups for this process, using the process-wide mount context.
    #[must_use]
    pub fn process() -> Self {
        Self {
            paths: SysPaths::default(),
            mount: MountContext::process().clone(),
        }
    }

    /// Lookups under `paths` with an explicit mount context.
    #[must_use]
    pub const fn new(paths: SysPaths, mount: MountContext) -> Self {
        Self { paths, mount }
    }

    /// Lookups under `paths`, detecting the mount context from the same root.
    #[must_use]
    pub fn detect(paths: SysPaths) -> Self {
        let mount = MountContext::detect(&paths);
        Self { paths, mount }
    }

    /// The mount context in use.
    #[must_use]
    pub const fn mount(&self) -> &MountContext {
        &self.mount
    }

    fn locator(&self) -> CgroupLocator<'_> {
        CgroupLocator::new(&self.paths, &self.mount)
    }

    /// CPU quota and period; [`CpuQuota::UNLIMITED`] when none is configured.
    ///
    /// # Errors
    ///
    /// Missing or malformed controller files, or no hierarchy for `cpu`.
    pub fn cpu_quota(&self) -> LimitsResult<CpuQuota> {
        self.locator()
            .lookup::<controller::Cpu>()
            .map(CpuQuota::from)
    }

    /// Memory high and max; [`MemoryLimits::UNLIMITED`] when neither is set.
    ///
    /// # Errors
    ///
    /// Missing or malformed controller files, or no hierarchy for `memory`.
    pub fn memory_limits(&self) -> LimitsResult<MemoryLimits> {
        self.locator()
            .lookup::<controller::Memory>()
            .map(MemoryLimits::from)
    }

    /// A pressure monitor for the cgroup this context points at.
    #[must_use]
    pub fn pressure_monitor(&self, threshold: Threshold) -> PressureMonitor {
        PressureMonitor::new(self.paths.clone(), self.mount.clone(), threshold)
    }
}

/// The CPU quota this process runs under.
///
/// # Errors
///
/// See [`Limits::cpu_quota`].
#[cfg(target_os = "linux")]
pub fn cpu_quota() -> LimitsResult<CpuQuota> {
    Limits::process().cpu_quota()
}

/// Always [`CpuQuota::UNLIMITED`] off Linux.
///
/// # Errors
///
/// Never fails.
#[cfg(not(target_os = "linux"))]
pub fn cpu_quota() -> LimitsResult<CpuQuota> {
    Ok(CpuQuota::UNLIMITED)
}

/// The memory limits this process runs under.
///
/// # Errors
///
/// See [`Limits::memory_limits`].
#[cfg(target_os = "linux")]
pub fn memory_limits() -> LimitsResult<MemoryLimits> {
    Limits::process().memory_limits()
}

/// Always [`MemoryLimits::UNLIMITED`] off Linux.
///
/// # Errors
///
/// Never fails.
#[cfg(not(target_os = "linux"))]
pub fn memory_limits() -> LimitsResult<MemoryLimits> {
    Ok(MemoryLimits::UNLIMITED)
}

/// Watch this process's cgroup for memory pressure.
///
/// # Errors
///
/// See [`PressureMonitor::watch`].
#[cfg(target_os = "linux")]
pub fn watch_memory_pressure(
    cancel: CancellationToken,
    threshold: Threshold,
) -> LimitsResult<PressureEvents> {
    PressureMonitor::for_process(threshold).watch(cancel)
}

/// Off Linux the stream is already closed.
///
/// # Errors
///
/// Never fails.
#[cfg(not(target_os = "linux"))]
pub fn watch_memory_pressure(
    _cancel: CancellationToken,
    _threshold: Threshold,
) -> LimitsResult<PressureEvents> {
    Ok(PressureEvents::closed())
}
