// src/scheduler.rs
//! Odroczone callbacki (zanik wykroczeń, wygaśnięcie immunitetu).

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::trace;

use crate::error::FloodError;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Jednorazowe wywołanie `task` po `delay`. Brak anulowania.
pub trait Scheduler: Send + Sync {
    fn schedule_after(&self, delay: Duration, task: Task);
}

/* =========================================
   Produkcyjny – timer tokio
   ========================================= */

#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Bierze runtime, w którym jesteśmy.
    pub fn current() -> Result<Self, FloodError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| FloodError::NoRuntime)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

/* =========================================
   Wirtualny zegar – testy i symulacje
   ========================================= */

struct Pending {
    due: Duration,
    seq: u64,
    task: Task,
}

#[derive(Default)]
struct VirtualInner {
    now: Duration,
    seq: u64,
    pending: Vec<Pending>,
}

/// Deterministyczny scheduler: nic się nie dzieje, dopóki ktoś nie wywoła `advance`.
/// Zadania z tym samym terminem odpalają w kolejności zaplanowania.
#[derive(Default)]
pub struct VirtualScheduler {
    inner: Mutex<VirtualInner>,
}

impl VirtualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Przesuwa zegar o `by`, odpalając po drodze wszystko, co dojrzało
    /// (także zadania zaplanowane przez odpalane zadania).
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now + by;
        loop {
            let next = {
                let mut inner = self.lock();
                let idx = inner
                    .pending
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.seq))
                    .map(|(i, _)| i);
                match idx {
                    Some(i) => {
                        let p = inner.pending.swap_remove(i);
                        inner.now = p.due;
                        Some(p.task)
                    }
                    None => {
                        inner.now = target;
                        None
                    }
                }
            };
            // lock puszczony – zadanie może planować kolejne
            match next {
                Some(task) => task(),
                None => break,
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VirtualInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule_after(&self, delay: Duration, task: Task) {
        let mut inner = self.lock();
        let due = inner.now + delay;
        let seq = inner.seq;
        inner.seq += 1;
        trace!(?due, "virtual task scheduled");
        inner.pending.push(Pending { due, seq, task });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn virtual_runs_due_tasks_in_order() {
        let sched = Arc::new(VirtualScheduler::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        for (name, secs) in [("b", 5u64), ("a", 3), ("c", 5)] {
            let log = log.clone();
            sched.schedule_after(
                Duration::from_secs(secs),
                Box::new(move || log.lock().unwrap().push(name)),
            );
        }

        sched.advance(Duration::from_secs(2));
        assert!(log.lock().unwrap().is_empty());
        sched.advance(Duration::from_secs(1));
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
        sched.advance(Duration::from_secs(10));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(sched.now(), Duration::from_secs(13));
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn virtual_runs_tasks_scheduled_by_tasks() {
        let sched = Arc::new(VirtualScheduler::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let s2 = sched.clone();
        let h2 = hits.clone();
        sched.schedule_after(
            Duration::from_secs(1),
            Box::new(move || {
                h2.fetch_add(1, Ordering::SeqCst);
                let h3 = h2.clone();
                s2.schedule_after(
                    Duration::from_secs(1),
                    Box::new(move || {
                        h3.fetch_add(1, Ordering::SeqCst);
                    }),
                );
            }),
        );

        sched.advance(Duration::from_secs(5));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_fires_after_delay() {
        let sched = TokioScheduler::current().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        sched.schedule_after(
            Duration::from_secs(3),
            Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tokio_scheduler_needs_runtime() {
        assert!(matches!(TokioScheduler::current(), Err(FloodError::NoRuntime)));
    }
}
