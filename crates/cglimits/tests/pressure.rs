//! End-to-end pressure watches over a synthetic cgroup2 tree.

use std::fs;
use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cglimits::pressure::WINDOW;
use cglimits::{Limits, MountContext, Strategy, Threshold};
use cglimits_common::{LimitsError, SysPaths};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

const TICK: Duration = Duration::from_millis(10);

fn pressure(avg10: &str) -> String {
    format!(
        "some avg10={avg10} avg60=0.00 avg300=0.00 total=1234\n\
         full avg10=0.00 avg60=0.00 avg300=0.00 total=0\n"
    )
}

/// A read-only cgroup2 mount with this process at `/app`.
fn read_only_tree(avg10: &str) -> (TempDir, Limits) {
    let dir = TempDir::new().unwrap();
    let cgroup = dir.path().join("sys/fs/cgroup/app");
    fs::create_dir_all(&cgroup).unwrap();
    fs::write(cgroup.join("memory.pressure"), pressure(avg10)).unwrap();

    let mount = MountContext {
        relative_path: "/app".into(),
        v2_enabled: true,
        read_only: true,
        ..MountContext::default()
    };
    let limits = Limits::new(SysPaths::with_root(dir.path()), mount);
    (dir, limits)
}

#[test_log::test(tokio::test)]
async fn read_only_mount_polls() {
    let (_dir, limits) = read_only_tree("12.50");
    let threshold = Threshold::new(Duration::from_millis(500)).unwrap();
    let cancel = CancellationToken::new();

    let mut events = limits
        .pressure_monitor(threshold)
        .with_poll_interval(TICK)
        .watch(cancel.clone())
        .unwrap();
    assert_eq!(events.strategy(), Some(Strategy::Polling));

    let got = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    assert_eq!(got, Some(()));

    cancel.cancel();
    // At most one buffered notification, then the stream ends.
    let mut rest = 0;
    while timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .is_some()
    {
        rest += 1;
    }
    assert!(rest <= 1);
}

#[test_log::test(tokio::test)]
async fn burst_is_coalesced() {
    let (dir, limits) = read_only_tree("40.00");
    let threshold = Threshold::new(Duration::from_millis(100)).unwrap();
    let cancel = CancellationToken::new();
    let mut events = limits
        .pressure_monitor(threshold)
        .with_poll_interval(TICK)
        .watch(cancel.clone())
        .unwrap();

    sleep(TICK * 10).await;
    fs::write(
        dir.path().join("sys/fs/cgroup/app/memory.pressure"),
        pressure("0.00"),
    )
    .unwrap();
    sleep(TICK * 10).await;

    assert_eq!(events.try_recv(), Ok(()));
    assert!(events.try_recv().is_err());
    cancel.cancel();
}

#[tokio::test]
async fn cancellation_closes_stream() {
    let (_dir, limits) = read_only_tree("0.00");
    let threshold = Threshold::new(Duration::from_millis(100)).unwrap();
    let cancel = CancellationToken::new();
    let events = limits
        .pressure_monitor(threshold)
        .with_poll_interval(TICK)
        .watch(cancel.clone())
        .unwrap();

    cancel.cancel();
    let mut stream = events.into_stream();
    let next = timeout(Duration::from_secs(1), stream.next()).await.unwrap();
    assert_eq!(next, None);
}

#[tokio::test]
async fn v1_only_is_unsupported() {
    let dir = TempDir::new().unwrap();
    let limits = Limits::new(SysPaths::with_root(dir.path()), MountContext::default());
    let err = limits
        .pressure_monitor(Threshold::new(WINDOW).unwrap())
        .watch(CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, LimitsError::Unsupported { .. }));
}

#[tokio::test]
async fn writable_mount_without_pressure_file_fails() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("sys/fs/cgroup")).unwrap();
    let mount = MountContext {
        v2_enabled: true,
        ..MountContext::default()
    };
    let limits = Limits::new(SysPaths::with_root(dir.path()), mount);
    let err = limits
        .pressure_monitor(Threshold::new(Duration::from_millis(100)).unwrap())
        .watch(CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, LimitsError::NotFound { .. }));
}

/// Clears the immutable flag so the tree can be removed.
struct Immutable(PathBuf);

impl Immutable {
    fn set(path: &Path) -> Option<Self> {
        let file = File::open(path).ok()?;
        let flags = rustix::fs::ioctl_getflags(&file).ok()?;
        rustix::fs::ioctl_setflags(&file, flags | rustix::fs::IFlags::IMMUTABLE).ok()?;
        Some(Self(path.to_path_buf()))
    }
}

impl Drop for Immutable {
    fn drop(&mut self) {
        if let Ok(file) = File::open(&self.0) {
            if let Ok(flags) = rustix::fs::ioctl_getflags(&file) {
                let _ = rustix::fs::ioctl_setflags(&file, flags - rustix::fs::IFlags::IMMUTABLE);
            }
        }
    }
}

#[test_log::test(tokio::test)]
async fn refused_trigger_falls_back_to_polling() {
    let dir = TempDir::new().unwrap();
    let cgroup = dir.path().join("sys/fs/cgroup/app");
    fs::create_dir_all(&cgroup).unwrap();
    let file = cgroup.join("memory.pressure");
    fs::write(&file, pressure("30.00")).unwrap();

    // Root ignores file modes, so refuse the write with the immutable flag.
    let _guard = if rustix::process::geteuid().is_root() {
        match Immutable::set(&file) {
            Some(guard) => Some(guard),
            None => {
                tracing::warn!("filesystem lacks the immutable flag, skipping");
                return;
            }
        }
    } else {
        fs::set_permissions(&file, fs::Permissions::from_mode(0o444)).unwrap();
        None
    };

    let mount = MountContext {
        relative_path: "/app".into(),
        v2_enabled: true,
        ..MountContext::default()
    };
    let limits = Limits::new(SysPaths::with_root(dir.path()), mount);
    let cancel = CancellationToken::new();
    let mut events = limits
        .pressure_monitor(Threshold::new(Duration::from_millis(100)).unwrap())
        .with_poll_interval(TICK)
        .watch(cancel.clone())
        .unwrap();
    assert_eq!(events.strategy(), Some(Strategy::Polling));

    let got = timeout(Duration::from_secs(1), events.recv()).await.unwrap();
    assert_eq!(got, Some(()));
    cancel.cancel();
}
