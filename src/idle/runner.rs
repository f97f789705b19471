//! Background task driving [`IdleBehavior`] on its own timers.

use super::{IdleBehavior, IdleState};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runs an [`IdleBehavior`] until cancelled, publishing each new snapshot.
///
/// Snapshot timestamps are measured from `epoch`; the render loop must use
/// the same epoch for the frame time it hands to the mixer.
pub struct IdleRunner {
    behavior: IdleBehavior,
    epoch: Instant,
    cancel: CancellationToken,
    tx: watch::Sender<IdleState>,
}

impl IdleRunner {
    /// Create a runner and the receiver the mixer side reads from.
    pub fn new(
        behavior: IdleBehavior,
        epoch: Instant,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<IdleState>) {
        let (tx, rx) = watch::channel(behavior.state());
        (
            Self {
                behavior,
                epoch,
                cancel,
                tx,
            },
            rx,
        )
    }

    /// Run until the token is cancelled or every receiver is dropped.
    ///
    /// ```rust,ignore
    /// let (runner, idle_rx) = IdleRunner::new(behavior, epoch, cancel.child_token());
    /// tokio::spawn(runner.run());
    /// ```
    pub async fn run(mut self) {
        info!("idle behavior started");
        loop {
            let now = self.epoch.elapsed();
            let state = self.behavior.advance(now);
            self.tx.send_if_modified(|current| {
                if *current == state {
                    false
                } else {
                    *current = state;
                    true
                }
            });
            if self.tx.is_closed() {
                debug!("idle behavior has no readers, stopping");
                break;
            }

            let Some(deadline) = self.behavior.next_deadline() else {
                // Nothing scheduled: wait for shutdown.
                self.cancel.cancelled().await;
                break;
            };
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep_until(self.epoch + deadline) => {}
            }
        }
        info!("idle behavior stopped");
    }
}
