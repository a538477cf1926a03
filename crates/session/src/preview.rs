//! Latest-wins live-view frame channel.
//!
//! Live-view consumers need "what is happening right now", not a complete
//! history -- freshness dominates completeness. [`PreviewChannel`] is a
//! capacity-1 queue built on `tokio::sync::watch`: publishing overwrites
//! any undelivered frame, so the producer never blocks and memory never
//! grows. A dedicated producer task captures frames at a fixed rate,
//! skipping frames identical to the last one captured.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use autopub_core::session::SessionHandle;

/// A captured frame. Shared, since several consumers may hold the same one.
pub type Frame = Arc<Vec<u8>>;

/// Capacity-1, latest-wins frame queue with an explicit stop signal.
pub struct PreviewChannel {
    tx: watch::Sender<Option<Frame>>,
    stop: CancellationToken,
}

impl PreviewChannel {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx,
            stop: CancellationToken::new(),
        }
    }

    /// Publish a frame, discarding any undelivered predecessor. Never
    /// blocks.
    pub fn publish(&self, frame: Vec<u8>) {
        let _ = self.tx.send(Some(Arc::new(frame)));
    }

    /// A pull handle for one consumer.
    pub fn subscribe(&self) -> PreviewReceiver {
        PreviewReceiver {
            rx: self.tx.subscribe(),
            stop: self.stop.clone(),
        }
    }

    /// Signal producer and consumers to tear down.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Token checked by the producer task and by consumers.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }
}

impl Default for PreviewChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of a [`PreviewChannel`].
pub struct PreviewReceiver {
    rx: watch::Receiver<Option<Frame>>,
    stop: CancellationToken,
}

impl PreviewReceiver {
    /// Wait up to `timeout` for a frame newer than the last one returned.
    ///
    /// Returns `None` on timeout or once the channel is stopped. Skipped
    /// intermediates are gone for good -- only the most recent frame is
    /// observable.
    pub async fn next_frame(&mut self, timeout: Duration) -> Option<Frame> {
        tokio::select! {
            _ = self.stop.cancelled() => None,
            changed = tokio::time::timeout(timeout, self.rx.changed()) => match changed {
                Ok(Ok(())) => self.rx.borrow_and_update().clone(),
                // Producer side dropped, or nothing new within the timeout.
                Ok(Err(_)) | Err(_) => None,
            },
        }
    }
}

/// Spawn the fixed-rate frame producer for one job's session.
///
/// The task captures a frame every `interval`, drops empty (failed)
/// captures, deduplicates identical consecutive frames, and exits when the
/// channel's stop token fires.
pub fn spawn_producer(
    session: Arc<dyn SessionHandle>,
    channel: Arc<PreviewChannel>,
    interval: Duration,
) -> JoinHandle<()> {
    let stop = channel.stop_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last: Option<Vec<u8>> = None;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let frame = session.capture_frame().await;
                    if frame.is_empty() {
                        continue;
                    }
                    if last.as_deref() == Some(frame.as_slice()) {
                        continue;
                    }
                    last = Some(frame.clone());
                    channel.publish(frame);
                }
            }
        }
        tracing::debug!(resource_id = %session.resource_id(), "Preview producer stopped");
    })
}

/// Stop a producer task, waiting at most `join_timeout` for a clean exit
/// before aborting it.
pub async fn stop_producer(
    channel: &PreviewChannel,
    handle: JoinHandle<()>,
    join_timeout: Duration,
) {
    channel.stop();
    let abort = handle.abort_handle();
    if tokio::time::timeout(join_timeout, handle).await.is_err() {
        tracing::warn!("Preview producer did not stop in time, aborting");
        abort.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use autopub_core::action::Action;
    use autopub_core::session::{SessionError, Stoppable};

    use super::*;

    #[tokio::test]
    async fn publish_never_blocks_and_consumer_sees_latest() {
        let channel = PreviewChannel::new();
        let mut rx = channel.subscribe();

        // Push many frames faster than anyone consumes them.
        for n in 0..100u8 {
            channel.publish(vec![n]);
        }

        let frame = rx.next_frame(Duration::from_millis(100)).await.unwrap();
        assert_eq!(frame.as_slice(), &[99]);

        // Intermediates are gone: no second frame is pending.
        assert!(rx.next_frame(Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn next_frame_times_out_when_idle() {
        let channel = PreviewChannel::new();
        let mut rx = channel.subscribe();
        assert!(rx.next_frame(Duration::from_millis(30)).await.is_none());
    }

    #[tokio::test]
    async fn stop_unblocks_consumers() {
        let channel = Arc::new(PreviewChannel::new());
        let mut rx = channel.subscribe();

        let channel2 = Arc::clone(&channel);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            channel2.stop();
        });

        let started = std::time::Instant::now();
        let frame = rx.next_frame(Duration::from_secs(5)).await;
        assert!(frame.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    /// Session stub whose frame changes every `change_every` captures.
    struct FrameSession {
        captures: AtomicUsize,
        change_every: usize,
    }

    #[async_trait]
    impl Stoppable for FrameSession {
        async fn stop(&self) {}
    }

    #[async_trait]
    impl SessionHandle for FrameSession {
        fn resource_id(&self) -> &str {
            "p1"
        }

        async fn capture_frame(&self) -> Vec<u8> {
            let n = self.captures.fetch_add(1, Ordering::SeqCst);
            vec![(n / self.change_every) as u8]
        }

        async fn capture_state(&self) -> String {
            String::new()
        }

        async fn perform(&self, _action: &Action) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn producer_dedups_identical_frames() {
        let session = Arc::new(FrameSession {
            captures: AtomicUsize::new(0),
            change_every: 5,
        });
        let channel = Arc::new(PreviewChannel::new());
        let mut rx = channel.subscribe();

        let handle = spawn_producer(
            Arc::clone(&session) as Arc<dyn SessionHandle>,
            Arc::clone(&channel),
            Duration::from_millis(5),
        );

        // Collect delivered frames for a while; with dedup, far fewer
        // frames arrive than captures happen.
        let mut delivered = Vec::new();
        while delivered.len() < 3 {
            if let Some(frame) = rx.next_frame(Duration::from_millis(200)).await {
                delivered.push(frame[0]);
            }
        }
        stop_producer(&channel, handle, Duration::from_secs(1)).await;

        // Strictly increasing frame ids: duplicates were skipped.
        assert!(delivered.windows(2).all(|w| w[0] < w[1]), "{delivered:?}");
    }

    #[tokio::test]
    async fn stop_producer_joins_the_task() {
        let session = Arc::new(FrameSession {
            captures: AtomicUsize::new(0),
            change_every: 1,
        });
        let channel = Arc::new(PreviewChannel::new());
        let handle = spawn_producer(
            session as Arc<dyn SessionHandle>,
            Arc::clone(&channel),
            Duration::from_millis(5),
        );

        stop_producer(&channel, handle, Duration::from_secs(1)).await;
        // Reaching this point within the timeout is the assertion.
    }
}
