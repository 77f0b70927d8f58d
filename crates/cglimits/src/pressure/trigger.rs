//! Kernel PSI trigger strategy.
//!
//! Writing `some <stall_us> <window_us>` to a pressure file arms a trigger;
//! the kernel then signals `EPOLLPRI` on that descriptor whenever the stall
//! threshold is exceeded within the window. The worker blocks in
//! `epoll_wait` on its own OS thread. Cancellation is delivered through an
//! eventfd registered in the same epoll set.

use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use cglimits_common::{LimitsError, LimitsResult};
use rustix::buffer::spare_capacity;
use rustix::event::epoll::{self, CreateFlags, EventData, EventFlags};
use rustix::event::{EventfdFlags, eventfd};
use rustix::fs::{Mode, OFlags};
use rustix::io::Errno;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::Threshold;

const SOURCE: u64 = 0;
const WAKER: u64 = 1;

fn errno_error(path: &Path, errno: Errno) -> LimitsError {
    LimitsError::from_io(path, errno.into())
}

fn syscall_error(operation: &str) -> impl FnOnce(Errno) -> LimitsError + '_ {
    move |errno| LimitsError::Internal {
        message: format!("{operation} failed: {errno}"),
    }
}

/// Open `path` read-write and arm a trigger for `threshold`.
///
/// EACCES/EPERM surface as [`LimitsError::PermissionDenied`].
pub(super) fn arm(path: &Path, threshold: &Threshold) -> LimitsResult<OwnedFd> {
    let fd = rustix::fs::open(
        path,
        OFlags::RDWR | OFlags::NONBLOCK | OFlags::CLOEXEC,
        Mode::empty(),
    )
    .map_err(|e| errno_error(path, e))?;

    let command = threshold.trigger_command();
    rustix::io::write(&fd, command.as_bytes()).map_err(|e| errno_error(path, e))?;
    tracing::trace!(path = %path.display(), command = %command.trim_end_matches('\0'), "armed trigger");
    Ok(fd)
}

/// Register `source` for priority events and run the worker thread.
///
/// `source` may be any pollable descriptor; only `EPOLLPRI` counts as pressure.
pub(super) fn spawn(
    handle: &Handle,
    source: OwnedFd,
    tx: mpsc::Sender<()>,
    cancel: CancellationToken,
) -> LimitsResult<()> {
    let epoll = epoll::create(CreateFlags::CLOEXEC).map_err(syscall_error("epoll_create"))?;
    epoll::add(
        &epoll,
        &source,
        EventData::new_u64(SOURCE),
        EventFlags::PRI | EventFlags::ET,
    )
    .map_err(syscall_error("epoll_ctl"))?;

    let waker = Arc::new(
        eventfd(0, EventfdFlags::CLOEXEC | EventfdFlags::NONBLOCK)
            .map_err(syscall_error("eventfd"))?,
    );
    epoll::add(&epoll, &*waker, EventData::new_u64(WAKER), EventFlags::IN)
        .map_err(syscall_error("epoll_ctl"))?;

    let finished = CancellationToken::new();
    let receiver_gone = tx.clone();
    let worker = Worker {
        epoll,
        _source: source,
        _waker: Arc::clone(&waker),
        tx,
        cancel: cancel.clone(),
        finished: finished.clone(),
    };
    thread::Builder::new()
        .name("memory-psi".to_string())
        .spawn(move || worker.run())
        .map_err(|e| LimitsError::Internal {
            message: format!("failed to spawn pressure worker: {e}"),
        })?;

    handle.spawn(async move {
        tokio::select! {
            () = finished.cancelled() => return,
            () = cancel.cancelled() => {}
            () = receiver_gone.closed() => {}
        }
        if let Err(e) = rustix::io::write(&*waker, &1u64.to_ne_bytes()) {
            tracing::warn!(error = %e, "failed to wake pressure worker");
        }
    });
    Ok(())
}

struct Worker {
    epoll: OwnedFd,
    // Kept open for as long as they are registered.
    _source: OwnedFd,
    _waker: Arc<OwnedFd>,
    tx: mpsc::Sender<()>,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl Worker {
    fn run(self) {
        let _finished = self.finished.clone().drop_guard();
        let mut events = Vec::with_capacity(4);

        loop {
            match epoll::wait(&self.epoll, spare_capacity(&mut events), None) {
                Ok(_) => {}
                Err(Errno::INTR) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "epoll_wait failed, stopping pressure worker");
                    return;
                }
            }
            if self.cancel.is_cancelled() {
                tracing::debug!("pressure watch cancelled");
                return;
            }
            if self.tx.is_closed() {
                tracing::debug!("pressure receiver dropped");
                return;
            }

            let mut fired = false;
            let mut exit = false;
            for event in events.drain(..) {
                let (flags, data) = (event.flags, event.data);
                if data.u64() != SOURCE {
                    continue;
                }
                fired |= flags.contains(EventFlags::PRI);
                exit |= flags.contains(EventFlags::ERR);
            }

            if fired {
                match self.tx.try_send(()) {
                    // Full: the consumer has not seen the previous one yet.
                    Ok(()) | Err(TrySendError::Full(())) => {}
                    Err(TrySendError::Closed(())) => return,
                }
            } else if exit {
                tracing::warn!("pressure trigger reported an error, stopping");
                return;
            }
        }
    }
}
