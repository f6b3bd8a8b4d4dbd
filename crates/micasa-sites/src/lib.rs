pub mod dmoz;
mod document;
mod profile;
pub mod remax;
mod rules;
pub mod writer;

pub use document::{DocumentFormat, HtmlDocumentParser, HtmlParser, JsonHtmlParser};
pub use profile::{ItemProfile, SiteProfile, SpiderProfile};
pub use rules::{CssLinks, CssRecords, FieldRule, LinkRule, Links};
pub use writer::{CsvOptions, FileMode, RecordFormat, RecordWriter, WriterConfig};

pub use sws_scraper::Html;
