//! Process cgroup descriptor parsing and hierarchy routing.
//!
//! Each line of `/proc/self/cgroup` names one mounted hierarchy:
//! `hierarchy-ID:controller-list:cgroup-path`. The unified hierarchy is
//! `0::<path>`; everything else is a v1 hierarchy.

use std::fs;
use std::path::{Path, PathBuf};

use cglimits_common::{LimitsError, LimitsResult, SysPaths};

use crate::controller::{Controller, Setting};
use crate::mount::MountContext;

/// One record of the process cgroup descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupRecord {
    /// Hierarchy ID (`0` for the unified hierarchy).
    pub hierarchy_id: String,
    /// Comma separated controller list, as written by the kernel.
    pub controllers: String,
    /// Cgroup path relative to the hierarchy root.
    pub path: String,
}

impl CgroupRecord {
    /// Parse a single descriptor line.
    pub fn parse(line: &str) -> LimitsResult<Self> {
        let mut fields = line.splitn(3, ':');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(id), Some(controllers), Some(path)) => Ok(Self {
                hierarchy_id: id.to_string(),
                controllers: controllers.to_string(),
                path: path.to_string(),
            }),
            _ => Err(LimitsError::parse("/proc/self/cgroup", line)),
        }
    }

    /// Whether this is the unified (v2) hierarchy record.
    #[must_use]
    pub fn is_unified(&self) -> bool {
        self.hierarchy_id == "0" && self.controllers.is_empty()
    }

    /// Iterate the named controllers of a v1 record.
    pub fn controller_names(&self) -> impl Iterator<Item = &str> {
        self.controllers.split(',').filter(|c| !c.is_empty())
    }

    /// Whether this v1 record covers `controller`.
    #[must_use]
    pub fn has_controller(&self, controller: &str) -> bool {
        self.controller_names().any(|c| c == controller)
    }

    /// How `controller` should be read through this record, if at all.
    #[must_use]
    pub fn route(&self, controller: &str) -> Option<Hierarchy<'_>> {
        if self.is_unified() {
            Some(Hierarchy::Unified { path: &self.path })
        } else if self.has_controller(controller) {
            Some(Hierarchy::Legacy {
                controllers: &self.controllers,
                path: &self.path,
            })
        } else {
            None
        }
    }
}

/// Reading protocol selected for a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hierarchy<'a> {
    /// Cgroups v2: one tree, every controller's files in the same directory.
    Unified {
        /// Cgroup path inside the unified mount.
        path: &'a str,
    },
    /// Cgroups v1: one tree per controller list.
    Legacy {
        /// Controller list naming the hierarchy directory (e.g. `cpu,cpuacct`).
        controllers: &'a str,
        /// Cgroup path inside that hierarchy.
        path: &'a str,
    },
}

/// Resolves controller settings for the current process.
#[derive(Debug, Clone)]
pub struct CgroupLocator<'a> {
    paths: &'a SysPaths,
    mount: &'a MountContext,
}

impl<'a> CgroupLocator<'a> {
    /// Create a locator over `paths`, using `mount` for the unified hierarchy.
    #[must_use]
    pub const fn new(paths: &'a SysPaths, mount: &'a MountContext) -> Self {
        Self { paths, mount }
    }

    /// Read the process descriptor and look up `C`.
    pub fn lookup<C: Controller>(&self) -> LimitsResult<Setting<C::Output>> {
        let path = self.paths.self_cgroup();
        let descriptor =
            fs::read_to_string(&path).map_err(|e| LimitsError::from_io(&path, e))?;
        self.lookup_in::<C>(&descriptor)
    }

    /// Look up `C` using an already-read descriptor.
    ///
    /// The first record that routes the controller decides the outcome.
    pub fn lookup_in<C: Controller>(&self, descriptor: &str) -> LimitsResult<Setting<C::Output>> {
        for line in descriptor.lines().filter(|l| !l.trim().is_empty()) {
            let record = CgroupRecord::parse(line)?;
            let Some(hierarchy) = record.route(C::NAME) else {
                continue;
            };
            let dir = self.directory(hierarchy);
            tracing::debug!(
                controller = C::NAME,
                hierarchy = ?hierarchy,
                dir = %dir.display(),
                "reading controller"
            );
            return match hierarchy {
                Hierarchy::Unified { .. } => C::read_v2(&dir),
                Hierarchy::Legacy { .. } => C::read_v1(&dir),
            };
        }

        Err(LimitsError::NoMatchingHierarchy {
            controller: C::NAME.to_string(),
        })
    }

    /// Directory holding the controller files for `hierarchy`.
    ///
    /// A v1 cgroup that is not visible (container remounts, or the process
    /// really is in the root cgroup) falls back to the hierarchy root.
    #[must_use]
    pub fn directory(&self, hierarchy: Hierarchy<'_>) -> PathBuf {
        match hierarchy {
            Hierarchy::Unified { path } => self.mount.unified_dir(self.paths, Path::new(path)),
            Hierarchy::Legacy { controllers, path } => {
                let dir = self.paths.v1_cgroup(controllers, path);
                match fs::metadata(&dir) {
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        let root = self.paths.v1_hierarchy(controllers);
                        tracing::debug!(
                            missing = %dir.display(),
                            root = %root.display(),
                            "cgroup not visible, using hierarchy root"
                        );
                        root
                    }
                    _ => dir,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_records() {
        let record = CgroupRecord::parse("4:cpu,cpuacct:/user.slice").unwrap();
        assert_eq!(record.hierarchy_id, "4");
        assert!(record.has_controller("cpu"));
        assert!(record.has_controller("cpuacct"));
        assert!(!record.has_controller("cpuset"));
        assert!(!record.is_unified());

        let record = CgroupRecord::parse("0::/").unwrap();
        assert!(record.is_unified());
        assert_eq!(record.path, "/");

        // Paths may legitimately contain ':'.
        let record = CgroupRecord::parse("0::/a:b").unwrap();
        assert_eq!(record.path, "/a:b");
    }

    #[test]
    fn malformed_record() {
        assert!(matches!(
            CgroupRecord::parse("garbage"),
            Err(LimitsError::Parse { .. })
        ));
    }

    #[test]
    fn routing() {
        let named = CgroupRecord::parse("1:name=systemd:/user.slice").unwrap();
        assert_eq!(named.route("cpu"), None);

        let memory = CgroupRecord::parse("2:memory:/app").unwrap();
        assert_eq!(
            memory.route("memory"),
            Some(Hierarchy::Legacy {
                controllers: "memory",
                path: "/app"
            })
        );

        let unified = CgroupRecord::parse("0::/app").unwrap();
        assert_eq!(unified.route("cpu"), Some(Hierarchy::Unified { path: "/app" }));
    }

    #[test]
    fn legacy_root_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SysPaths::with_root(dir.path());
        let mount = MountContext::default();
        let locator = CgroupLocator::new(&paths, &mount);
        let hierarchy = Hierarchy::Legacy {
            controllers: "memory",
            path: "/missing",
        };
        assert_eq!(locator.directory(hierarchy), paths.v1_hierarchy("memory"));

        std::fs::create_dir_all(paths.v1_cgroup("memory", "/present")).unwrap();
        let hierarchy = Hierarchy::Legacy {
            controllers: "memory",
            path: "/present",
        };
        assert_eq!(
            locator.directory(hierarchy),
            paths.v1_cgroup("memory", "/present")
        );
    }
}
