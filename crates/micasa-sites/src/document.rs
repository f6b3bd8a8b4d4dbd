use anyhow::{anyhow, Result};
use micasa_crawler::{DocumentParser, Page};
use serde::{Deserialize, Serialize};
use sws_scraper::Html;

/// How a fetched page becomes an HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentFormat {
    /// The body is the markup
    #[default]
    Html,
    /// The body is a JSON object holding the markup as a string field
    JsonField(String),
}

impl DocumentFormat {
    pub fn parser(&self) -> HtmlDocumentParser {
        match self {
            Self::Html => HtmlDocumentParser::Html(HtmlParser),
            Self::JsonField(field) => HtmlDocumentParser::JsonField(JsonHtmlParser::new(field)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlParser;

impl DocumentParser<Html> for HtmlParser {
    fn parse(&self, page: &Page) -> Result<Html> {
        Ok(Html::parse_document(page.text()))
    }
}

/// Unwraps markup embedded in a JSON payload.
#[derive(Debug, Clone)]
pub struct JsonHtmlParser {
    field: String,
}

impl JsonHtmlParser {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl DocumentParser<Html> for JsonHtmlParser {
    fn parse(&self, page: &Page) -> Result<Html> {
        let payload: serde_json::Value = page.json()?;
        let markup = payload
            .get(&self.field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("Missing string field `{}` in {}", self.field, page.url))?;
        Ok(Html::parse_document(markup))
    }
}

#[derive(Debug, Clone)]
pub enum HtmlDocumentParser {
    Html(HtmlParser),
    JsonField(JsonHtmlParser),
}

impl DocumentParser<Html> for HtmlDocumentParser {
    fn parse(&self, page: &Page) -> Result<Html> {
        match self {
            Self::Html(parser) => parser.parse(page),
            Self::JsonField(parser) => parser.parse(page),
        }
    }
}
