use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tokio::sync::Notify;

/// Unbounded multi-producer multi-consumer queue with drain detection.
///
/// Every `push` adds one unit of pending work that is only released by the
/// matching `mark_done`, so `join` waits for executions and not just pops.
#[derive(Debug)]
pub struct TaskQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    pending: AtomicUsize,
    available: Notify,
    drained: Notify,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            pending: AtomicUsize::new(0),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    /// Appends a task, never blocks.
    pub fn push(&self, task: T) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        // Cannot fail, the queue owns a receiver for as long as it lives.
        if self.tx.send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            log::error!("Couldn't push task, queue receiver is gone");
            return;
        }
        self.available.notify_one();
    }

    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Waits until a task is available and takes it.
    ///
    /// Cancel safe, a dropped call never loses a task.
    pub async fn pop(&self) -> T {
        loop {
            if let Some(task) = self.try_pop() {
                return task;
            }
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(task) = self.try_pop() {
                return task;
            }
            notified.await;
        }
    }

    /// Releases the pending work of one popped task, whatever its result.
    pub fn mark_done(&self) {
        let res = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match res {
            Ok(1) => self.drained.notify_waiters(),
            Ok(_) => (),
            Err(_) => log::error!("Task marked done more times than tasks were pushed"),
        }
    }

    /// Waits until every pushed task has been popped and marked done.
    ///
    /// Concurrent pushes simply extend the wait.
    pub async fn join(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            drained.await;
        }
    }

    /// Tasks pushed and not marked done yet, queued or in-flight.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Tasks waiting to be popped.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
