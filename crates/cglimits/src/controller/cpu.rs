//! CPU bandwidth (quota/period) readers.

use std::path::Path;

use cglimits_common::{LimitsError, LimitsResult};
use serde::Serialize;

use super::{Controller, Setting, parse_i64, read_i64, read_trimmed};

/// CPU bandwidth: at most `quota` microseconds of CPU time per `period`.
///
/// [`CpuQuota::UNLIMITED`] (`-1, -1`) means no quota is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CpuQuota {
    /// Microseconds of CPU time per period.
    pub quota: i64,
    /// Period length in microseconds.
    pub period: i64,
}

impl CpuQuota {
    /// No quota configured, or not supported on this platform.
    pub const UNLIMITED: Self = Self {
        quota: -1,
        period: -1,
    };

    /// Whether this is the "no quota" sentinel.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        *self == Self::UNLIMITED
    }

    /// The quota expressed in CPUs (e.g. `2.5`).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cores(&self) -> Option<f64> {
        if self.is_unlimited() || self.quota < 0 || self.period <= 0 {
            return None;
        }
        Some(self.quota as f64 / self.period as f64)
    }
}

impl From<Setting<Self>> for CpuQuota {
    fn from(setting: Setting<Self>) -> Self {
        setting.limited().unwrap_or(Self::UNLIMITED)
    }
}

/// The `cpu` controller.
#[derive(Debug, Clone, Copy)]
pub struct Cpu;

impl Controller for Cpu {
    const NAME: &'static str = "cpu";
    type Output = CpuQuota;

    fn read_v1(dir: &Path) -> LimitsResult<Setting<CpuQuota>> {
        let quota = read_i64(&dir.join("cpu.cfs_quota_us"))?;
        if quota == -1 {
            return Ok(Setting::Unlimited);
        }
        let period = read_i64(&dir.join("cpu.cfs_period_us"))?;
        Ok(Setting::Limited(CpuQuota { quota, period }))
    }

    fn read_v2(dir: &Path) -> LimitsResult<Setting<CpuQuota>> {
        // "$MAX $PERIOD", where $MAX may be "max".
        let path = dir.join("cpu.max");
        let content = read_trimmed(&path)?;
        let mut fields = content.split_whitespace();
        let (Some(quota), Some(period)) = (fields.next(), fields.next()) else {
            return Err(LimitsError::parse(&path, content));
        };
        if quota == "max" {
            return Ok(Setting::Unlimited);
        }
        Ok(Setting::Limited(CpuQuota {
            quota: parse_i64(&path, quota)?,
            period: parse_i64(&path, period)?,
        }))
    }
}
