use std::sync::atomic::{AtomicUsize, Ordering};

use crate::task::FailureKind;

/// Live counters of a crawl run, updated by the workers.
#[derive(Debug, Default)]
pub struct CrawlStats {
    seeded: AtomicUsize,
    spiders_run: AtomicUsize,
    parsers_run: AtomicUsize,
    records: AtomicUsize,
    fetch_failures: AtomicUsize,
    parse_failures: AtomicUsize,
    sink_failures: AtomicUsize,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn seeded(&self) {
        self.seeded.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn spider_run(&self) {
        self.spiders_run.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn parser_run(&self) {
        self.parsers_run.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_written(&self) {
        self.records.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn failed(&self, kind: FailureKind) {
        let counter = match kind {
            FailureKind::Fetch => &self.fetch_failures,
            FailureKind::Parse => &self.parse_failures,
            FailureKind::Sink => &self.sink_failures,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn report(&self) -> CrawlReport {
        CrawlReport {
            seeded: self.seeded.load(Ordering::SeqCst),
            spiders_run: self.spiders_run.load(Ordering::SeqCst),
            parsers_run: self.parsers_run.load(Ordering::SeqCst),
            records: self.records.load(Ordering::SeqCst),
            fetch_failures: self.fetch_failures.load(Ordering::SeqCst),
            parse_failures: self.parse_failures.load(Ordering::SeqCst),
            sink_failures: self.sink_failures.load(Ordering::SeqCst),
        }
    }
}

/// Snapshot of [`CrawlStats`].
///
/// `spiders_run` and `parsers_run` count executed tasks, failed ones included.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlReport {
    pub seeded: usize,
    pub spiders_run: usize,
    pub parsers_run: usize,
    pub records: usize,
    pub fetch_failures: usize,
    pub parse_failures: usize,
    pub sink_failures: usize,
}

impl CrawlReport {
    pub fn tasks_run(&self) -> usize {
        self.spiders_run + self.parsers_run
    }

    pub fn failures(&self) -> usize {
        self.fetch_failures + self.parse_failures + self.sink_failures
    }

    pub fn failures_of(&self, kind: FailureKind) -> usize {
        match kind {
            FailureKind::Fetch => self.fetch_failures,
            FailureKind::Parse => self.parse_failures,
            FailureKind::Sink => self.sink_failures,
        }
    }
}
