use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::config::{CrawlerConfig, OnError};
use crate::fetch::Fetch;
use crate::scrapable::{Sink, Site};
use crate::stats::CrawlReport;
use crate::task::{CrawlContext, FailureKind};
use crate::worker::Worker;

/// Crawls `site` from its seeds until no queued or running task is left.
///
/// Failed tasks never stop the crawl. Once every worker has exited, the
/// fetcher and the sink are closed and the `OnError::Fail` policies decide
/// whether the run itself is reported as failed.
pub async fn crawl_site<D: 'static>(
    crawler_conf: &CrawlerConfig,
    site: Site<D>,
    fetcher: Arc<dyn Fetch>,
    sink: Arc<dyn Sink>,
) -> Result<CrawlReport> {
    crawler_conf.validate()?;

    let ctx = Arc::new(CrawlContext::new(fetcher, sink));

    log::info!("Initializing task queue for {}", site.name);
    let seeded = ctx.seed(&site);
    log::info!("Queued {seeded} seed tasks");

    log::info!("Starting {} workers", crawler_conf.num_workers);
    let workers = (0..crawler_conf.num_workers)
        .map(|id| Worker::new(id, ctx.clone(), crawler_conf.idle_backoff()).spawn())
        .collect::<Vec<_>>();

    let interrupted = if crawler_conf.handle_sigint {
        tokio::select! {
            _ = ctx.queue.join() => false,
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    log::error!("Couldn't listen for SIGINT got: {e}");
                    ctx.queue.join().await;
                    false
                } else {
                    log::warn!("Interrupted, stopping workers");
                    true
                }
            }
        }
    } else {
        ctx.queue.join().await;
        false
    };

    for worker in &workers {
        worker.stop();
    }
    let mut executed = 0;
    for worker in workers {
        let id = worker.id();
        match worker.join().await {
            Ok(n) => executed += n,
            Err(e) => log::error!("Worker {id} didn't exit cleanly: {e}"),
        }
    }
    log::info!("Workers stopped after {executed} tasks");

    ctx.fetcher.close().await;
    let sink = ctx.sink.clone();
    let closed = match tokio::task::spawn_blocking(move || sink.close()).await {
        Ok(closed) => closed,
        Err(e) => Err(anyhow!("Sink close task failed: {e}")),
    };

    let report = ctx.stats.report();
    log::info!("Crawl of {} finished: {report:?}", site.name);

    if interrupted {
        return Err(anyhow!("Interrupted"));
    }
    closed.map_err(|e| anyhow!("Couldn't close sink got: {e}"))?;
    check_failures(crawler_conf, &report)?;

    Ok(report)
}

fn check_failures(crawler_conf: &CrawlerConfig, report: &CrawlReport) -> Result<()> {
    let policies = [
        (FailureKind::Fetch, crawler_conf.on_fetch_error),
        (FailureKind::Parse, crawler_conf.on_parse_error),
        (FailureKind::Sink, crawler_conf.on_sink_error),
    ];
    for (kind, on_error) in policies {
        let failures = report.failures_of(kind);
        if let OnError::Fail = on_error {
            if failures > 0 {
                return Err(anyhow!("Crawl had {failures} {kind:?} failures"));
            }
        }
    }
    Ok(())
}
