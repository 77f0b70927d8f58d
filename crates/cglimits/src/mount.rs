//! Unified (v2) hierarchy mount detection.
//!
//! The context is computed once per process from the mount table and the
//! process's own cgroup descriptor, then never re-detected.

use std::fs;
use std::path::{Path, PathBuf};

use cglimits_common::SysPaths;
use cglimits_common::paths::{CGROUP_MOUNT, relative};
use once_cell::sync::OnceCell;

use crate::hierarchy::CgroupRecord;

static PROCESS_CONTEXT: OnceCell<MountContext> = OnceCell::new();

/// Where the unified hierarchy lives and where this process sits in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountContext {
    /// Mount point of the cgroup2 filesystem.
    pub root: PathBuf,
    /// This process's cgroup, relative to `root`.
    pub relative_path: PathBuf,
    /// Whether a cgroup2 filesystem is mounted at all.
    pub v2_enabled: bool,
    /// Whether that mount is read-only.
    pub read_only: bool,
}

impl Default for MountContext {
    fn default() -> Self {
        Self {
            root: PathBuf::from(CGROUP_MOUNT),
            relative_path: PathBuf::from("/"),
            v2_enabled: false,
            read_only: false,
        }
    }
}

impl MountContext {
    /// The process-wide context, detected on first use under the default root.
    pub fn process() -> &'static Self {
        PROCESS_CONTEXT.get_or_init(|| Self::detect(&SysPaths::default()))
    }

    /// Detect the context from the files under `paths`.
    ///
    /// Unreadable files are treated as "no cgroup2 mount".
    pub fn detect(paths: &SysPaths) -> Self {
        let Ok(mounts) = fs::read_to_string(paths.mounts()) else {
            tracing::debug!(path = %paths.mounts().display(), "mount table unreadable");
            return Self::default();
        };
        let self_cgroup = fs::read_to_string(paths.self_cgroup()).unwrap_or_default();
        let context = Self::parse(&mounts, &self_cgroup);
        tracing::debug!(
            root = %context.root.display(),
            path = %context.relative_path.display(),
            v2 = context.v2_enabled,
            read_only = context.read_only,
            "resolved cgroup2 mount"
        );
        context
    }

    /// Build a context from mount table and cgroup descriptor contents.
    #[must_use]
    pub fn parse(mounts: &str, self_cgroup: &str) -> Self {
        let mut context = Self::default();
        let mut root: Option<PathBuf> = None;

        for line in mounts.lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [_, mount_point, fstype, options, ..] = fields.as_slice() else {
                continue;
            };
            if *fstype != "cgroup2" {
                continue;
            }
            context.v2_enabled = true;

            // When mounted more than once, the /sys/fs mount is canonical.
            if root.as_deref().is_some_and(|r| r.starts_with("/sys/fs")) {
                continue;
            }
            root = Some(PathBuf::from(mount_point));
            context.read_only = options.split(',').any(|o| o == "ro");
        }

        if !context.v2_enabled {
            return context;
        }
        if let Some(root) = root {
            context.root = root;
        }

        if let Some(record) = self_cgroup
            .lines()
            .filter_map(|line| CgroupRecord::parse(line).ok())
            .find(CgroupRecord::is_unified)
        {
            context.relative_path = PathBuf::from(&record.path);
        }
        context
    }

    /// Directory of this process's cgroup in the unified hierarchy.
    #[must_use]
    pub fn cgroup_dir(&self, paths: &SysPaths) -> PathBuf {
        self.unified_dir(paths, &self.relative_path)
    }

    /// Directory of an arbitrary cgroup path in the unified hierarchy.
    #[must_use]
    pub fn unified_dir(&self, paths: &SysPaths, path: &Path) -> PathBuf {
        paths.resolve(&self.root).join(relative(path))
    }
}
