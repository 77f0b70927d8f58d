//! Memory soft/hard limit readers.

use std::path::Path;

use cglimits_common::LimitsResult;
use serde::Serialize;

use super::{Controller, Setting, read_bound};

/// Memory limits in bytes; `-1` marks an unset bound.
///
/// Either bound may be unset on its own. [`MemoryLimits::UNLIMITED`] is
/// returned when neither is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryLimits {
    /// Soft limit: reclaim starts above this.
    pub high: i64,
    /// Hard limit: the enforced ceiling.
    pub max: i64,
}

impl MemoryLimits {
    /// No memory limit configured, or not supported on this platform.
    pub const UNLIMITED: Self = Self { high: -1, max: -1 };

    /// Whether neither bound is set.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        *self == Self::UNLIMITED
    }

    /// The soft limit, if set.
    #[must_use]
    pub fn high(&self) -> Option<u64> {
        u64::try_from(self.high).ok()
    }

    /// The hard limit, if set.
    #[must_use]
    pub fn max(&self) -> Option<u64> {
        u64::try_from(self.max).ok()
    }

    fn from_bounds(high: i64, max: i64) -> Setting<Self> {
        let limits = Self { high, max };
        if limits.is_unlimited() {
            Setting::Unlimited
        } else {
            Setting::Limited(limits)
        }
    }
}

impl From<Setting<Self>> for MemoryLimits {
    fn from(setting: Setting<Self>) -> Self {
        setting.limited().unwrap_or(Self::UNLIMITED)
    }
}

/// The `memory` controller.
#[derive(Debug, Clone, Copy)]
pub struct Memory;

impl Controller for Memory {
    const NAME: &'static str = "memory";
    type Output = MemoryLimits;

    fn read_v1(dir: &Path) -> LimitsResult<Setting<MemoryLimits>> {
        let high = read_bound(&dir.join("memory.soft_limit_in_bytes"))?;
        let max = read_bound(&dir.join("memory.limit_in_bytes"))?;
        Ok(MemoryLimits::from_bounds(high, max))
    }

    fn read_v2(dir: &Path) -> LimitsResult<Setting<MemoryLimits>> {
        let high = read_bound(&dir.join("memory.high"))?;
        let max = read_bound(&dir.join("memory.max"))?;
        Ok(MemoryLimits::from_bounds(high, max))
    }
}
