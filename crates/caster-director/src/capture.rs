//! Capture worker.
//!
//! Owns the frame source, bounds every capture with a timeout, and
//! publishes the latest frame through a `watch` channel. The tick loop only
//! ever sees complete frames.

use std::sync::Arc;

use caster_models::Rect;
use caster_vision::Frame;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::metrics;
use crate::ports::FrameSource;
use crate::retry::FailureTracker;

/// Receiver side of the latest-frame channel.
pub type FrameReceiver = watch::Receiver<Option<Arc<Frame>>>;

/// Periodic capture task.
pub struct CaptureWorker {
    source: Arc<dyn FrameSource>,
    config: CaptureConfig,
    frames: watch::Sender<Option<Arc<Frame>>>,
    shutdown: watch::Receiver<bool>,
    failures: FailureTracker,
    seq: u64,
}

impl CaptureWorker {
    /// Spawn the worker; it stops when `shutdown` turns true.
    pub fn spawn(
        source: Arc<dyn FrameSource>,
        config: CaptureConfig,
        max_logged_failures: u32,
        shutdown: watch::Receiver<bool>,
    ) -> (FrameReceiver, JoinHandle<()>) {
        let (frames, rx) = watch::channel(None);
        let worker = Self {
            source,
            config,
            frames,
            shutdown,
            failures: FailureTracker::new(max_logged_failures),
            seq: 0,
        };
        (rx, tokio::spawn(worker.run()))
    }

    async fn run(mut self) {
        info!(
            "Capture worker started (every {}ms, timeout {}ms)",
            self.config.interval_ms, self.config.timeout_ms
        );
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => self.capture_once().await,
            }
        }
        info!("Capture worker stopped after {} frames", self.seq);
    }

    async fn capture_once(&mut self) {
        let region: Rect = self.config.region;
        let outcome = timeout(self.config.timeout(), self.source.capture(region)).await;

        let failure = match outcome {
            Ok(Ok(Some(frame))) => {
                self.seq += 1;
                debug!(
                    "Captured frame #{} ({}x{})",
                    self.seq,
                    frame.width(),
                    frame.height()
                );
                self.frames
                    .send_replace(Some(Arc::new(frame.with_seq(self.seq))));
                self.failures.record_success();
                return;
            }
            Ok(Ok(None)) => "no frame available".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}ms", self.config.timeout_ms),
        };

        metrics::record_capture_failure();
        if self.failures.record_failure() {
            warn!("Capture failed: {}", failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DirectorError, DirectorResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails every other call, sleeps forever on every fifth.
    struct Flaky {
        calls: AtomicU32,
    }

    #[async_trait]
    impl FrameSource for Flaky {
        async fn capture(&self, _region: Rect) -> DirectorResult<Option<Frame>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 5 == 4 {
                std::future::pending::<()>().await;
            }
            if n % 2 == 1 {
                return Err(DirectorError::capture_failure("flaky"));
            }
            Ok(Some(Frame::filled(4, 4, [0, 0, 0])))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_publishes_frames_despite_failures() {
        let (tx, rx) = watch::channel(false);
        let config = CaptureConfig {
            interval_ms: 100,
            timeout_ms: 50,
            ..Default::default()
        };
        let source = Arc::new(Flaky {
            calls: AtomicU32::new(0),
        });
        let (mut frames, handle) = CaptureWorker::spawn(source.clone(), config, 3, rx);

        frames.changed().await.unwrap();
        let first = frames.borrow_and_update().clone().unwrap();
        assert_eq!(first.seq(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let latest = frames.borrow().clone().unwrap();
        assert!(latest.seq() > 1);
        assert!(source.calls.load(Ordering::SeqCst) > 10);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
