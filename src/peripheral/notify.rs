//! Supervised pool for notification tasks
//!
//! Notify handlers are fire-and-forget: each subscription spawns a task
//! that pushes the current value and finishes. The pool keeps count of
//! those tasks and can cancel every outstanding one at once, which the
//! peripheral does on disconnect, power-off and shutdown.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::runtime::Handle;
use tokio::sync::broadcast;

/// Decrements the in-flight count when a task ends, however it ends.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct NotifyPool {
    cancel_tx: broadcast::Sender<()>,
    in_flight: Arc<AtomicUsize>,
    runtime: OnceLock<Handle>,
}

impl NotifyPool {
    /// Binds to the current tokio runtime, if there is one.
    pub fn new() -> Arc<Self> {
        let (cancel_tx, _) = broadcast::channel(1);
        let runtime = OnceLock::new();
        if let Ok(handle) = Handle::try_current() {
            let _ = runtime.set(handle);
        }
        Arc::new(Self {
            cancel_tx,
            in_flight: Arc::new(AtomicUsize::new(0)),
            runtime,
        })
    }

    /// Run tasks on `handle`. Only the first runtime bound is kept.
    pub fn bind_runtime(&self, handle: Handle) {
        let _ = self.runtime.set(handle);
    }

    fn runtime(&self) -> Option<Handle> {
        if let Some(handle) = self.runtime.get() {
            return Some(handle.clone());
        }
        let handle = Handle::try_current().ok()?;
        let _ = self.runtime.set(handle.clone());
        Some(handle)
    }

    /// Run `task` in the background until it completes or the pool cancels it.
    ///
    /// Safe to call from threads outside the runtime, such as a transport's
    /// reader thread. With no runtime bound the task is dropped.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(runtime) = self.runtime() else {
            log::warn!("No tokio runtime bound, dropping notification task");
            return;
        };
        let mut cancel = self.cancel_tx.subscribe();
        let guard = InFlight::enter(&self.in_flight);
        runtime.spawn(async move {
            let _guard = guard;
            tokio::select! {
                _ = task => {}
                _ = cancel.recv() => {
                    log::debug!("Notification task cancelled");
                }
            }
        });
    }

    /// Cancel every task spawned so far. Returns how many were running.
    pub fn cancel_all(&self) -> usize {
        let running = self.in_flight();
        if running > 0 {
            let _ = self.cancel_tx.send(());
        }
        running
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn wait_idle(pool: &NotifyPool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while pool.in_flight() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("pool did not drain");
    }

    #[tokio::test]
    async fn test_completed_tasks_leave_the_pool() {
        let pool = NotifyPool::new();
        let (tx, rx) = oneshot::channel();
        pool.spawn(async move {
            let _ = tx.send(42);
        });
        assert_eq!(rx.await.unwrap(), 42);
        wait_idle(&pool).await;
        assert_eq!(pool.cancel_all(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all_stops_stuck_tasks() {
        let pool = NotifyPool::new();
        for _ in 0..3 {
            pool.spawn(std::future::pending());
        }
        assert_eq!(pool.in_flight(), 3);

        assert_eq!(pool.cancel_all(), 3);
        wait_idle(&pool).await;
    }

    #[tokio::test]
    async fn test_spawn_from_non_runtime_thread() {
        let pool = NotifyPool::new();
        let (tx, rx) = oneshot::channel();

        let worker_pool = Arc::clone(&pool);
        std::thread::spawn(move || {
            worker_pool.spawn(async move {
                let _ = tx.send(7);
            });
        })
        .join()
        .unwrap();

        assert_eq!(rx.await.unwrap(), 7);
        wait_idle(&pool).await;
    }

    #[test]
    fn test_bound_runtime_is_used_when_created_outside_one() {
        let pool = NotifyPool::new();
        let (tx, rx) = oneshot::channel();
        pool.spawn(async move {
            let _ = tx.send(());
        });
        assert_eq!(pool.in_flight(), 0);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        pool.bind_runtime(runtime.handle().clone());
        let (tx, rx2) = oneshot::channel();
        pool.spawn(async move {
            let _ = tx.send(3);
        });
        assert_eq!(runtime.block_on(rx2).unwrap(), 3);
        drop(rx);
    }

    #[tokio::test]
    async fn test_tasks_spawned_after_cancel_still_run() {
        let pool = NotifyPool::new();
        pool.spawn(std::future::pending());
        pool.cancel_all();
        wait_idle(&pool).await;

        let (tx, rx) = oneshot::channel();
        pool.spawn(async move {
            tokio::task::yield_now().await;
            let _ = tx.send(());
        });
        rx.await.unwrap();
    }
}
