use std::fmt;
use std::sync::Arc;

use crate::dedup::DedupSet;
use crate::fetch::{Fetch, Page};
use crate::queue::TaskQueue;
use crate::scrapable::{ItemRules, Sink, Site, SpiderRules};
use crate::stats::CrawlStats;

/// Shared state of one crawl run, handed to every task by the worker running it.
pub struct CrawlContext<D> {
    pub queue: Arc<TaskQueue<Task<D>>>,
    pub dedup: Arc<DedupSet>,
    pub fetcher: Arc<dyn Fetch>,
    pub sink: Arc<dyn Sink>,
    pub stats: Arc<CrawlStats>,
}

impl<D> CrawlContext<D> {
    /// Fresh queue, dedup set and stats around the given capabilities.
    pub fn new(fetcher: Arc<dyn Fetch>, sink: Arc<dyn Sink>) -> Self {
        Self {
            queue: Arc::new(TaskQueue::new()),
            dedup: Arc::new(DedupSet::new()),
            fetcher,
            sink,
            stats: Arc::new(CrawlStats::new()),
        }
    }

    /// Pushes a root spider task for every seed not marked yet.
    pub fn seed(&self, site: &Site<D>) -> usize {
        let mut seeded = 0;
        for url in &site.seeds {
            if self.dedup.seen_or_mark(url) {
                let task = SpiderTask::new(url.clone(), site.spider.clone(), site.item.clone());
                self.queue.push(Task::Spider(task));
                self.stats.seeded();
                seeded += 1;
            } else {
                log::warn!("Skipping duplicated seed {url}");
            }
        }
        seeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Fetch,
    Parse,
    Sink,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Couldn't fetch {url} got: {cause:#}")]
    Fetch { url: String, cause: anyhow::Error },
    #[error("Couldn't parse {url} got: {cause:#}")]
    Parse { url: String, cause: anyhow::Error },
    #[error("Couldn't write record from {url} got: {cause:#}")]
    Sink { url: String, cause: anyhow::Error },
    #[error("Task for {url} panicked: {message}")]
    Panicked { url: String, message: String },
}

impl TaskError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Fetch { .. } => FailureKind::Fetch,
            Self::Parse { .. } | Self::Panicked { .. } => FailureKind::Parse,
            Self::Sink { .. } => FailureKind::Sink,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Fetch { url, .. }
            | Self::Parse { url, .. }
            | Self::Sink { url, .. }
            | Self::Panicked { url, .. } => url,
        }
    }

    fn fetch(url: &str, cause: anyhow::Error) -> Self {
        Self::Fetch {
            url: url.to_string(),
            cause,
        }
    }

    fn parse(url: &str, cause: anyhow::Error) -> Self {
        Self::Parse {
            url: url.to_string(),
            cause,
        }
    }

    fn sink(url: &str, cause: anyhow::Error) -> Self {
        Self::Sink {
            url: url.to_string(),
            cause,
        }
    }
}

/// What a successful task produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskOutcome {
    /// New spider tasks pushed
    pub spiders: usize,
    /// New item parser tasks pushed
    pub items: usize,
    /// Records handed to the sink
    pub records: usize,
}

/// A unit of crawl work, executed once by a single worker.
pub enum Task<D> {
    Spider(SpiderTask<D>),
    Parser(ParserTask<D>),
}

impl<D> Task<D> {
    pub fn url(&self) -> &str {
        match self {
            Self::Spider(task) => &task.url,
            Self::Parser(task) => &task.url,
        }
    }

    pub async fn run(&self, ctx: &CrawlContext<D>) -> Result<TaskOutcome, TaskError> {
        match self {
            Self::Spider(task) => task.run(ctx).await,
            Self::Parser(task) => task.run(ctx).await,
        }
    }
}

impl<D> fmt::Debug for Task<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl<D> fmt::Display for Task<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spider(task) => write!(f, "Spider({})", task.url),
            Self::Parser(task) => write!(f, "Parser({})", task.url),
        }
    }
}

/// Fetches a page and queues the spider and item pages it links to.
pub struct SpiderTask<D> {
    url: String,
    spider: SpiderRules<D>,
    item: ItemRules<D>,
}

impl<D> SpiderTask<D> {
    pub fn new(url: String, spider: SpiderRules<D>, item: ItemRules<D>) -> Self {
        Self { url, spider, item }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn run(&self, ctx: &CrawlContext<D>) -> Result<TaskOutcome, TaskError> {
        let page = ctx
            .fetcher
            .get(&self.url)
            .await
            .map_err(|e| TaskError::fetch(&self.url, e))?;
        self.queue_targets(&page, ctx)
    }

    fn queue_targets(&self, page: &Page, ctx: &CrawlContext<D>) -> Result<TaskOutcome, TaskError> {
        let doc = self
            .spider
            .parser
            .parse(page)
            .map_err(|e| TaskError::parse(&self.url, e))?;
        let mut outcome = TaskOutcome::default();

        for target in self.spider.strategy.spider_targets(page, &doc) {
            let url = target.map_err(|e| TaskError::parse(&self.url, e))?;
            if ctx.dedup.seen_or_mark(&url) {
                let task = SpiderTask::new(url, self.spider.clone(), self.item.clone());
                ctx.queue.push(Task::Spider(task));
                outcome.spiders += 1;
            }
        }

        for target in self.spider.strategy.item_targets(page, &doc) {
            let url = target.map_err(|e| TaskError::parse(&self.url, e))?;
            if ctx.dedup.seen_or_mark(&url) {
                let task = ParserTask::new(url, self.item.clone());
                ctx.queue.push(Task::Parser(task));
                outcome.items += 1;
            }
        }

        Ok(outcome)
    }
}

/// Fetches a leaf page and hands every extracted record to the sink.
pub struct ParserTask<D> {
    url: String,
    item: ItemRules<D>,
}

impl<D> ParserTask<D> {
    pub fn new(url: String, item: ItemRules<D>) -> Self {
        Self { url, item }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn run(&self, ctx: &CrawlContext<D>) -> Result<TaskOutcome, TaskError> {
        let page = ctx
            .fetcher
            .get(&self.url)
            .await
            .map_err(|e| TaskError::fetch(&self.url, e))?;
        self.write_records(&page, ctx)
    }

    fn write_records(&self, page: &Page, ctx: &CrawlContext<D>) -> Result<TaskOutcome, TaskError> {
        let doc = self
            .item
            .parser
            .parse(page)
            .map_err(|e| TaskError::parse(&self.url, e))?;
        let mut outcome = TaskOutcome::default();

        for record in self.item.strategy.records(page, &doc) {
            let record = record.map_err(|e| TaskError::parse(&self.url, e))?;
            ctx.sink
                .write(record)
                .map_err(|e| TaskError::sink(&self.url, e))?;
            ctx.stats.record_written();
            outcome.records += 1;
        }

        Ok(outcome)
    }
}
