//! Cleanup for harness resources when a run is cut short

use futures::future::BoxFuture;
use std::future::Future;
use tokio::runtime::Handle;
use tracing::warn;

/// Holds a pending close and runs it exactly once.
///
/// `close` awaits it in place. If the guard is dropped first (the owning
/// future was cancelled), the close is spawned onto the current runtime.
pub(crate) struct CloseGuard {
    pending: Option<BoxFuture<'static, ()>>,
}

impl CloseGuard {
    pub(crate) fn new(close: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            pending: Some(Box::pin(close)),
        }
    }

    pub(crate) async fn close(mut self) {
        if let Some(close) = self.pending.take() {
            close.await;
        }
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        let Some(close) = self.pending.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(close);
            }
            Err(_) => warn!("No runtime to release harness resource on drop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn counting_guard(count: &Arc<AtomicUsize>) -> CloseGuard {
        let count = count.clone();
        CloseGuard::new(async move {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_close_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        counting_guard(&count).close().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_spawns_close() {
        let count = Arc::new(AtomicUsize::new(0));
        drop(counting_guard(&count));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
