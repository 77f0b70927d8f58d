//! Controller file readers.
//!
//! Each controller knows how to read its settings from a cgroup directory
//! in either protocol version; the [`CgroupLocator`](crate::hierarchy::CgroupLocator)
//! decides which version applies and where the directory is.

pub mod cpu;
pub mod memory;

use std::fs;
use std::path::Path;

use cglimits_common::{LimitsError, LimitsResult};

pub use cpu::{Cpu, CpuQuota};
pub use memory::{Memory, MemoryLimits};

/// Outcome of reading a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting<T> {
    /// A limit is configured.
    Limited(T),
    /// No limit is configured.
    Unlimited,
}

impl<T> Setting<T> {
    /// The configured limit, if any.
    pub fn limited(self) -> Option<T> {
        match self {
            Self::Limited(value) => Some(value),
            Self::Unlimited => None,
        }
    }
}

/// A cgroup controller readable in both protocol versions.
pub trait Controller {
    /// Controller name as it appears in v1 controller lists.
    const NAME: &'static str;

    /// Value produced when a limit is configured.
    type Output;

    /// Read from a v1 hierarchy directory.
    fn read_v1(dir: &Path) -> LimitsResult<Setting<Self::Output>>;

    /// Read from a unified hierarchy directory.
    fn read_v2(dir: &Path) -> LimitsResult<Setting<Self::Output>>;
}

/// Read a pseudo-file, trimmed.
pub(crate) fn read_trimmed(path: &Path) -> LimitsResult<String> {
    let content = fs::read_to_string(path).map_err(|e| LimitsError::from_io(path, e))?;
    let value = content.trim().to_string();
    tracing::trace!(path = %path.display(), value = %value, "read controller file");
    Ok(value)
}

/// Parse a base-10 integer read from `path`.
pub(crate) fn parse_i64(path: &Path, value: &str) -> LimitsResult<i64> {
    value
        .parse()
        .map_err(|_| LimitsError::parse(path, value))
}

/// Read a one-line integer file.
pub(crate) fn read_i64(path: &Path) -> LimitsResult<i64> {
    let value = read_trimmed(path)?;
    parse_i64(path, &value)
}

/// Read a byte bound where `max` means unset (`-1`).
pub(crate) fn read_bound(path: &Path) -> LimitsResult<i64> {
    let value = read_trimmed(path)?;
    if value == "max" {
        return Ok(-1);
    }
    parse_i64(path, &value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_limited() {
        assert_eq!(Setting::Limited(3).limited(), Some(3));
        assert_eq!(Setting::<u8>::Unlimited.limited(), None);
    }

    #[test]
    fn bound_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("memory.max");

        fs::write(&file, "max\n").unwrap();
        assert_eq!(read_bound(&file).unwrap(), -1);

        fs::write(&file, "536870912\n").unwrap();
        assert_eq!(read_bound(&file).unwrap(), 536_870_912);

        fs::write(&file, "lots\n").unwrap();
        assert!(matches!(read_bound(&file), Err(LimitsError::Parse { .. })));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_i64(&dir.path().join("cpu.cfs_quota_us")).unwrap_err();
        assert!(matches!(err, LimitsError::NotFound { .. }));
    }
}
