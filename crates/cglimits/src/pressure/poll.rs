//! Polling strategy: compare the 10-second average against the threshold.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cglimits_common::{LimitsError, LimitsResult};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{PressureStall, Threshold};

fn read_stall(path: &Path) -> LimitsResult<PressureStall> {
    let content = fs::read_to_string(path).map_err(|e| LimitsError::from_io(path, e))?;
    PressureStall::parse(path, &content)
}

/// Start the polling task. It stops on cancellation or when the receiver is dropped.
pub(super) fn spawn(
    handle: &Handle,
    path: PathBuf,
    threshold: Threshold,
    interval: Duration,
    tx: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    handle.spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tx.closed() => break,
                _ = ticker.tick() => {}
            }

            let stall = match read_stall(&path) {
                Ok(stall) => stall,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "pressure read failed, retrying");
                    continue;
                }
            };
            tracing::trace!(avg10 = stall.some.avg10, "memory pressure");

            if threshold.is_crossed_by(&stall) {
                match tx.try_send(()) {
                    Ok(()) | Err(TrySendError::Full(())) => {}
                    Err(TrySendError::Closed(())) => break,
                }
            }
        }
        tracing::debug!(path = %path.display(), "pressure polling stopped");
    });
}
