use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::Throttle;
use crate::fetch::{Fetch, Page};

/// Hands out at most `per_second` permits every second.
#[derive(Debug)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    refill: JoinHandle<()>,
}

impl RateLimiter {
    /// Must be called from within a tokio runtime.
    pub fn new(per_second: usize) -> Self {
        let permits = Arc::new(Semaphore::new(0));

        let permits_c = permits.clone();
        let refill = tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let available = permits_c.available_permits();
                permits_c.add_permits(per_second.saturating_sub(available));
            }
        });

        Self { permits, refill }
    }

    /// Waits for a permit and consumes it.
    pub async fn acquire(&self) -> Result<()> {
        self.permits.acquire().await?.forget();
        Ok(())
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.refill.abort();
    }
}

#[derive(Debug)]
enum Gate {
    Concurrent(Semaphore),
    PerSecond(RateLimiter),
    Delay {
        delay: Duration,
        next_start: Mutex<Option<Instant>>,
    },
}

/// A [`Fetch`] wrapper applying a [`Throttle`] to every request.
#[derive(Debug)]
pub struct Throttled<F> {
    inner: F,
    gate: Gate,
}

impl<F: Fetch> Throttled<F> {
    /// Must be called from within a tokio runtime.
    ///
    /// Fails on a negative, infinite or NaN delay.
    pub fn new(inner: F, throttle: Throttle) -> Result<Self> {
        let gate = match throttle {
            Throttle::Concurrent(n) => Gate::Concurrent(Semaphore::new(n.get())),
            Throttle::PerSecond(n) => Gate::PerSecond(RateLimiter::new(n.get())),
            Throttle::Delay(secs) => Gate::Delay {
                delay: Duration::try_from_secs_f32(secs)
                    .map_err(|e| anyhow!("Invalid throttle delay {secs} got: {e}"))?,
                next_start: Mutex::new(None),
            },
        };
        Ok(Self { inner, gate })
    }
}

#[async_trait]
impl<F: Fetch> Fetch for Throttled<F> {
    async fn get(&self, url: &str) -> Result<Page> {
        match &self.gate {
            Gate::Concurrent(permits) => {
                let _permit = permits.acquire().await?;
                self.inner.get(url).await
            }
            Gate::PerSecond(limiter) => {
                limiter.acquire().await?;
                self.inner.get(url).await
            }
            Gate::Delay { delay, next_start } => {
                let start = {
                    let mut next_start = next_start.lock().await;
                    let now = Instant::now();
                    let start = next_start.map_or(now, |at| at.max(now));
                    *next_start = Some(start + *delay);
                    start
                };
                time::sleep_until(start).await;
                self.inner.get(url).await
            }
        }
    }

    async fn close(&self) {
        self.inner.close().await
    }
}
