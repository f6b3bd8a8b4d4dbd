use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::fetch::Page;

/// Lazy sequence of URLs discovered in a document.
pub type Targets<'a> = Box<dyn Iterator<Item = anyhow::Result<String>> + 'a>;

/// Lazy sequence of records extracted from a document.
pub type Records<'a> = Box<dyn Iterator<Item = anyhow::Result<Record>> + 'a>;

/// Turns a fetched page into the document the strategies query.
pub trait DocumentParser<D>: Send + Sync {
    fn parse(&self, page: &Page) -> anyhow::Result<D>;
}

impl<D, F> DocumentParser<D> for F
where
    F: Fn(&Page) -> anyhow::Result<D> + Send + Sync,
{
    fn parse(&self, page: &Page) -> anyhow::Result<D> {
        self(page)
    }
}

/// Site specific link discovery for spider pages.
pub trait SpiderStrategy<D>: Send + Sync {
    /// Further pages to crawl with the same logic.
    fn spider_targets<'a>(&'a self, page: &'a Page, doc: &'a D) -> Targets<'a>;

    /// Leaf pages holding records.
    fn item_targets<'a>(&'a self, page: &'a Page, doc: &'a D) -> Targets<'a>;
}

/// Site specific record extraction for item pages.
pub trait ItemStrategy<D>: Send + Sync {
    fn records<'a>(&'a self, page: &'a Page, doc: &'a D) -> Records<'a>;
}

/// Append only destination of extracted records.
pub trait Sink: Send + Sync {
    fn write(&self, record: Record) -> anyhow::Result<()>;

    /// Flushes and releases the sink, called once after the crawl has drained.
    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct SpiderRules<D> {
    pub parser: Arc<dyn DocumentParser<D>>,
    pub strategy: Arc<dyn SpiderStrategy<D>>,
}

impl<D> SpiderRules<D> {
    pub fn new<P, S>(parser: P, strategy: S) -> Self
    where
        P: DocumentParser<D> + 'static,
        S: SpiderStrategy<D> + 'static,
    {
        Self {
            parser: Arc::new(parser),
            strategy: Arc::new(strategy),
        }
    }
}

impl<D> Clone for SpiderRules<D> {
    fn clone(&self) -> Self {
        Self {
            parser: self.parser.clone(),
            strategy: self.strategy.clone(),
        }
    }
}

pub struct ItemRules<D> {
    pub parser: Arc<dyn DocumentParser<D>>,
    pub strategy: Arc<dyn ItemStrategy<D>>,
}

impl<D> ItemRules<D> {
    pub fn new<P, S>(parser: P, strategy: S) -> Self
    where
        P: DocumentParser<D> + 'static,
        S: ItemStrategy<D> + 'static,
    {
        Self {
            parser: Arc::new(parser),
            strategy: Arc::new(strategy),
        }
    }
}

impl<D> Clone for ItemRules<D> {
    fn clone(&self) -> Self {
        Self {
            parser: self.parser.clone(),
            strategy: self.strategy.clone(),
        }
    }
}

/// Everything needed to crawl one site.
pub struct Site<D> {
    pub name: String,
    /// Root spider pages
    pub seeds: Vec<String>,
    pub spider: SpiderRules<D>,
    pub item: ItemRules<D>,
}

impl<D> Clone for Site<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            seeds: self.seeds.clone(),
            spider: self.spider.clone(),
            item: self.item.clone(),
        }
    }
}

impl<D> fmt::Debug for Site<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Site")
            .field("name", &self.name)
            .field("seeds", &self.seeds)
            .finish_non_exhaustive()
    }
}

/// An extracted value made of named fields, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.fields.iter().map(|(k, v)| (k, v)))
    }
}
