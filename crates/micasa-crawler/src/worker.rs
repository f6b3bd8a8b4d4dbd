use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::task::{CrawlContext, Task, TaskError, TaskOutcome};

/// Pulls tasks off the queue and runs them one at a time until stopped.
pub struct Worker<D> {
    id: usize,
    ctx: Arc<CrawlContext<D>>,
    stop: Arc<AtomicBool>,
    backoff: Duration,
}

impl<D: 'static> Worker<D> {
    pub fn new(id: usize, ctx: Arc<CrawlContext<D>>, backoff: Duration) -> Self {
        Self {
            id,
            ctx,
            stop: Arc::new(AtomicBool::new(false)),
            backoff,
        }
    }

    /// Runs the worker loop on the tokio runtime.
    pub fn spawn(self) -> WorkerHandle {
        let id = self.id;
        let stop = self.stop.clone();
        let handle = tokio::spawn(self.run());
        WorkerHandle { id, stop, handle }
    }

    /// Returns the number of tasks executed.
    ///
    /// The stop flag is checked once per iteration, a task being executed is
    /// always finished first. An empty queue is waited on for at most the
    /// back-off duration before checking the flag again.
    pub async fn run(self) -> usize {
        let mut executed = 0;
        log::debug!("{} -- Worker started", self.id);
        while !self.stop.load(Ordering::SeqCst) {
            let task = match timeout(self.backoff, self.ctx.queue.pop()).await {
                Ok(task) => task,
                Err(_) => continue,
            };
            log::debug!("{} -- Run task: {task}", self.id);
            self.execute(&task).await;
            self.ctx.queue.mark_done();
            executed += 1;
        }
        log::debug!("{} -- Worker stopped after {executed} tasks", self.id);
        executed
    }

    async fn execute(&self, task: &Task<D>) {
        let res = AssertUnwindSafe(task.run(&self.ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(TaskError::Panicked {
                    url: task.url().to_string(),
                    message: panic_message(panic),
                })
            });

        match task {
            Task::Spider(_) => self.ctx.stats.spider_run(),
            Task::Parser(_) => self.ctx.stats.parser_run(),
        }

        match res {
            Ok(TaskOutcome {
                spiders,
                items,
                records,
            }) => log::debug!(
                "{} -- Done {task}: {spiders} spiders, {items} items, {records} records",
                self.id
            ),
            Err(e) => {
                log::warn!("{} -- Skipping {task}: {e}", self.id);
                self.ctx.stats.failed(e.kind());
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("unknown panic")
    }
}

/// Owner side of a spawned [`Worker`].
#[derive(Debug)]
pub struct WorkerHandle {
    id: usize,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<usize>,
}

impl WorkerHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Asks the worker to exit after its current iteration.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Waits for the worker loop to actually exit.
    pub async fn join(self) -> anyhow::Result<usize> {
        let executed = self.handle.await?;
        Ok(executed)
    }
}
