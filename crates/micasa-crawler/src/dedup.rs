use dashmap::DashSet;

/// URLs already queued during one crawl run.
///
/// Marking is the membership test itself, so two workers discovering the same
/// URL concurrently can never both enqueue it.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: DashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when `url` was not marked yet and is now, the caller
    /// should then enqueue it. Returns `false` when it was already marked.
    pub fn seen_or_mark(&self, url: &str) -> bool {
        if self.seen.contains(url) {
            return false;
        }
        self.seen.insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forgets every URL, only meant to be used between two runs.
    pub fn reset(&self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn marks_once() {
        let dedup = DedupSet::new();
        assert!(dedup.seen_or_mark("http://a"));
        assert!(!dedup.seen_or_mark("http://a"));
        assert!(dedup.seen_or_mark("http://b"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn reset_between_runs() {
        let dedup = DedupSet::new();
        assert!(dedup.seen_or_mark("http://a"));
        dedup.reset();
        assert!(dedup.is_empty());
        assert!(dedup.seen_or_mark("http://a"));
    }

    #[test]
    fn concurrent_marks_yield_a_single_winner() {
        let dedup = Arc::new(DedupSet::new());
        for round in 0..50 {
            let url = format!("http://site/{round}");
            let workers = (0..8)
                .map(|_| {
                    let dedup = dedup.clone();
                    let url = url.clone();
                    thread::spawn(move || dedup.seen_or_mark(&url))
                })
                .collect::<Vec<_>>();
            let winners = workers
                .into_iter()
                .map(|w| w.join().unwrap())
                .filter(|&marked| marked)
                .count();
            assert_eq!(winners, 1, "url {url} marked {winners} times");
        }
    }
}
