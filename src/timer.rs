//! Cancellable one-shot timers that post into the session queue
//!
//! A timer is a spawned task that sleeps and then sends a single message.
//! Dropping the handle aborts the task, so replacing an `Option<TimerHandle>`
//! is enough to cancel the previous timer.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Handle to a pending timer
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Arm a timer that delivers `message` on `tx` after `delay`
    pub fn schedule<T>(delay: Duration, tx: mpsc::Sender<T>, message: T) -> Self
    where
        T: Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(message).await.is_err() {
                trace!("timer fired after session queue closed");
            }
        });

        Self { task }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_delivers_after_delay() {
        let (tx, mut rx) = mpsc::channel(4);
        let _timer = TimerHandle::schedule(Duration::from_millis(500), tx, 7u32);

        tokio::time::advance(Duration::from_millis(499)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(rx.try_recv().unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel(4);
        let timer = TimerHandle::schedule(Duration::from_millis(100), tx, ());
        drop(timer);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }
}
