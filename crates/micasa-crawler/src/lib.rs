mod config;
mod crawler;
mod dedup;
mod fetch;
mod limiter;
mod queue;
mod scrapable;
mod stats;
mod task;
mod worker;

pub use config::{CrawlerConfig, OnError, Throttle};
pub use crawler::crawl_site;
pub use dedup::DedupSet;
pub use fetch::{Fetch, HttpFetcher, Page};
pub use limiter::{RateLimiter, Throttled};
pub use queue::TaskQueue;
pub use scrapable::{
    DocumentParser, ItemRules, ItemStrategy, Record, Records, Site, Sink, SpiderRules,
    SpiderStrategy, Targets,
};
pub use stats::{CrawlReport, CrawlStats};
pub use task::{CrawlContext, FailureKind, ParserTask, SpiderTask, Task, TaskError, TaskOutcome};
pub use worker::{Worker, WorkerHandle};

pub use anyhow;
pub use async_trait::async_trait;
