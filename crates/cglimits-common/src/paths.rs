//! Filesystem layout of the pseudo-files read by cglimits.
//!
//! Every path is resolved under a configurable root so the whole layout can
//! be reproduced in a scratch directory.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

/// Default filesystem root (`CGLIMITS_ROOT`, or `/`).
pub static CGLIMITS_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("CGLIMITS_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
});

/// Conventional mount point of cgroup hierarchies.
pub const CGROUP_MOUNT: &str = "/sys/fs/cgroup";

/// Locations of the process and cgroup pseudo-files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysPaths {
    /// Root the absolute paths below are resolved under.
    pub root: PathBuf,
}

impl Default for SysPaths {
    fn default() -> Self {
        Self {
            root: CGLIMITS_ROOT.clone(),
        }
    }
}

impl SysPaths {
    /// Create paths with the default root.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an absolute path under the root.
    #[must_use]
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative(path.as_ref()))
    }

    /// The mount table.
    #[must_use]
    pub fn mounts(&self) -> PathBuf {
        self.resolve("/proc/mounts")
    }

    /// This process's cgroup descriptor.
    #[must_use]
    pub fn self_cgroup(&self) -> PathBuf {
        self.resolve("/proc/self/cgroup")
    }

    /// Root of a v1 hierarchy, named after its controller list (e.g. `cpu,cpuacct`).
    #[must_use]
    pub fn v1_hierarchy(&self, controllers: &str) -> PathBuf {
        self.resolve(CGROUP_MOUNT).join(controllers)
    }

    /// A cgroup directory inside a v1 hierarchy.
    #[must_use]
    pub fn v1_cgroup(&self, controllers: &str, path: &str) -> PathBuf {
        self.v1_hierarchy(controllers).join(relative(Path::new(path)))
    }
}

/// Strip the leading `/` so the path can be joined under another directory.
#[must_use]
pub fn relative(path: &Path) -> &Path {
    path.strip_prefix("/").unwrap_or(path)
}
