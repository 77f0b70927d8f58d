//! Memory pressure monitoring.
//!
//! A [`PressureMonitor`] picks one of two strategies on its first (and only)
//! [`watch`](PressureMonitor::watch):
//!
//! - **Trigger**: arm a kernel PSI trigger on `memory.pressure` and block on
//!   epoll in a dedicated thread.
//! - **Polling**: re-read `memory.pressure` every tick and compare the
//!   10-second average against the threshold. Used when the cgroup2 mount is
//!   read-only or a security policy refuses the trigger write.
//!
//! Both deliver into a single-slot channel with drop-on-full semantics, so a
//! burst of excursions between two reads is observed as one notification.

mod poll;
pub mod psi;
#[cfg(target_os = "linux")]
mod trigger;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use cglimits_common::{LimitsError, LimitsResult, SysPaths};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::mount::MountContext;

pub use psi::{PressureStall, StallAverages};

/// Observation window shared by both strategies.
pub const WINDOW: Duration = Duration::from_secs(10);

/// Default polling tick.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Stall time per [`WINDOW`] that counts as memory pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold(Duration);

impl Threshold {
    /// Create a threshold; it must be non-zero and no longer than [`WINDOW`].
    pub fn new(stall: Duration) -> LimitsResult<Self> {
        if stall.is_zero() || stall > WINDOW {
            return Err(LimitsError::InvalidThreshold {
                threshold: format!("{stall:?}"),
            });
        }
        Ok(Self(stall))
    }

    /// Stall time per window.
    #[must_use]
    pub const fn stall(&self) -> Duration {
        self.0
    }

    /// Kernel trigger command for the "some" stall class.
    #[must_use]
    pub fn trigger_command(&self) -> String {
        format!("some {} {}\0", self.0.as_micros(), WINDOW.as_micros())
    }

    /// The threshold as a share of the window, in percent, comparable to `avg10`.
    #[must_use]
    pub fn percent(&self) -> f64 {
        self.0.as_secs_f64() / WINDOW.as_secs_f64() * 100.0
    }

    /// Whether a pressure reading meets or exceeds the threshold.
    #[must_use]
    pub fn is_crossed_by(&self, stall: &PressureStall) -> bool {
        stall.some.avg10 >= self.percent()
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} per {:?}", self.0, WINDOW)
    }
}

/// How a running monitor learns about pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Kernel trigger, woken through epoll.
    Trigger,
    /// Fixed-interval reads of the rolling average.
    Polling,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trigger => write!(f, "trigger"),
            Self::Polling => write!(f, "polling"),
        }
    }
}

/// Watches one cgroup's memory pressure.
#[derive(Debug, Clone)]
pub struct PressureMonitor {
    paths: SysPaths,
    mount: MountContext,
    threshold: Threshold,
    poll_interval: Duration,
}

impl PressureMonitor {
    /// Create a monitor for the cgroup described by `mount`.
    #[must_use]
    pub fn new(paths: SysPaths, mount: MountContext, threshold: Threshold) -> Self {
        Self {
            paths,
            mount,
            threshold,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Create a monitor for this process's own cgroup.
    #[must_use]
    pub fn for_process(threshold: Threshold) -> Self {
        Self::new(SysPaths::default(), MountContext::process().clone(), threshold)
    }

    /// Override the polling tick (default [`POLL_INTERVAL`]).
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The pressure file this monitor reads or arms.
    #[must_use]
    pub fn pressure_file(&self) -> PathBuf {
        self.mount.cgroup_dir(&self.paths).join("memory.pressure")
    }

    /// Select a strategy and start the background worker.
    ///
    /// Must be called from within a Tokio runtime. The returned stream ends
    /// when `cancel` fires or the worker stops on its own.
    ///
    /// # Errors
    ///
    /// [`LimitsError::Unsupported`] without a cgroup2 mount or runtime; any
    /// failure arming the trigger other than a permission refusal.
    pub fn watch(self, cancel: CancellationToken) -> LimitsResult<PressureEvents> {
        let handle = Handle::try_current().map_err(|_| LimitsError::Unsupported {
            feature: "pressure watch outside a Tokio runtime".to_string(),
        })?;
        if !self.mount.v2_enabled {
            return Err(LimitsError::Unsupported {
                feature: "memory pressure without cgroup v2".to_string(),
            });
        }

        let path = self.pressure_file();
        let (tx, rx) = mpsc::channel(1);
        let strategy = self.start(&handle, path.clone(), tx, cancel)?;
        tracing::debug!(
            path = %path.display(),
            threshold = %self.threshold,
            strategy = %strategy,
            "watching memory pressure"
        );
        Ok(PressureEvents {
            rx,
            strategy: Some(strategy),
        })
    }

    #[cfg(target_os = "linux")]
    fn start(
        &self,
        handle: &Handle,
        path: PathBuf,
        tx: mpsc::Sender<()>,
        cancel: CancellationToken,
    ) -> LimitsResult<Strategy> {
        if self.mount.read_only {
            tracing::debug!("cgroup2 mounted read-only, cannot arm a trigger");
        } else {
            match trigger::arm(&path, &self.threshold) {
                Ok(source) => {
                    trigger::spawn(handle, source, tx, cancel)?;
                    return Ok(Strategy::Trigger);
                }
                Err(e) if e.is_permission_denied() => {
                    tracing::debug!(error = %e, "trigger write refused, falling back to polling");
                }
                Err(e) => return Err(e),
            }
        }
        poll::spawn(handle, path, self.threshold, self.poll_interval, tx, cancel);
        Ok(Strategy::Polling)
    }

    #[cfg(not(target_os = "linux"))]
    fn start(
        &self,
        handle: &Handle,
        path: PathBuf,
        tx: mpsc::Sender<()>,
        cancel: CancellationToken,
    ) -> LimitsResult<Strategy> {
        poll::spawn(handle, path, self.threshold, self.poll_interval, tx, cancel);
        Ok(Strategy::Polling)
    }
}

/// Coalesced pressure notifications.
///
/// Each received `()` means "pressure occurred at least once since the last
/// receive". The stream ends when the watch is cancelled or the worker stops.
#[derive(Debug)]
pub struct PressureEvents {
    rx: mpsc::Receiver<()>,
    strategy: Option<Strategy>,
}

impl PressureEvents {
    /// A stream that is already finished.
    #[must_use]
    pub fn closed() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self { rx, strategy: None }
    }

    /// The strategy feeding this stream, `None` for a closed stub.
    #[must_use]
    pub const fn strategy(&self) -> Option<Strategy> {
        self.strategy
    }

    /// Wait for the next notification; `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Take a pending notification without waiting.
    ///
    /// # Errors
    ///
    /// `Empty` when nothing is pending, `Disconnected` once the stream has ended.
    pub fn try_recv(&mut self) -> Result<(), mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Convert into a [`Stream`](tokio_stream::Stream).
    #[must_use]
    pub fn into_stream(self) -> ReceiverStream<()> {
        ReceiverStream::new(self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_bounds() {
        assert!(Threshold::new(Duration::ZERO).is_err());
        assert!(Threshold::new(Duration::from_secs(11)).is_err());
        assert!(Threshold::new(WINDOW).is_ok());
    }

    #[test]
    fn trigger_command_uses_fixed_window() {
        let threshold = Threshold::new(Duration::from_millis(150)).unwrap();
        assert_eq!(threshold.trigger_command(), "some 150000 10000000\0");
    }

    #[test]
    fn polling_normalization() {
        let threshold = Threshold::new(Duration::from_millis(100)).unwrap();
        assert!((threshold.percent() - 1.0).abs() < 1e-9);

        let mut stall = PressureStall::default();
        stall.some.avg10 = 0.99;
        assert!(!threshold.is_crossed_by(&stall));
        stall.some.avg10 = 1.0;
        assert!(threshold.is_crossed_by(&stall));
    }

    #[tokio::test]
    async fn closed_stub_ends_immediately() {
        let mut events = PressureEvents::closed();
        assert_eq!(events.strategy(), None);
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn requires_unified_hierarchy() {
        let threshold = Threshold::new(Duration::from_millis(100)).unwrap();
        let monitor = PressureMonitor::new(
            SysPaths::with_root("/nonexistent"),
            MountContext::default(),
            threshold,
        );
        let err = monitor.watch(CancellationToken::new()).unwrap_err();
        assert!(matches!(err, LimitsError::Unsupported { .. }));
    }

    #[test]
    fn requires_runtime() {
        let threshold = Threshold::new(Duration::from_millis(100)).unwrap();
        let mount = MountContext {
            v2_enabled: true,
            ..MountContext::default()
        };
        let monitor =
            PressureMonitor::new(SysPaths::with_root("/nonexistent"), mount, threshold);
        assert!(monitor.watch(CancellationToken::new()).is_err());
    }
}
