use std::io::prelude::*;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::CrawlerConfig;

/// A downloaded page, only lives for the duration of the task that fetched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Final URL of the page, after redirects
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            body: body.into(),
        }
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decodes the body as JSON, for sources that wrap their markup.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| anyhow!("Couldn't decode JSON from {} got: {e}", self.url))
    }

    /// Resolves a possibly relative link against the page URL.
    pub fn urljoin(&self, href: &str) -> Result<String> {
        let base =
            Url::parse(&self.url).map_err(|e| anyhow!("Invalid page URL {} got: {e}", self.url))?;
        let joined = base
            .join(href.trim())
            .map_err(|e| anyhow!("Couldn't join {href} to {} got: {e}", self.url))?;
        Ok(joined.to_string())
    }
}

/// The capability used by tasks to download their target.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<Page>;

    /// Releases held resources, called once after the crawl has drained.
    async fn close(&self) {}
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .gzip(true)
            .deflate(true)
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> Result<Page> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?
            .error_for_status()?;

        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();

        let body = match resp.headers().get(CONTENT_TYPE) {
            Some(c) if c == "application/x-gzip" || c == "application/gzip" => {
                let compressed = resp.bytes().await?;
                let mut gz = GzDecoder::new(&compressed[..]);
                let mut page = String::new();
                gz.read_to_string(&mut page)?;
                page
            }
            _ => resp.text().await?,
        };

        Ok(Page {
            url: final_url,
            status,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn urljoin_relative_and_absolute() {
        let page = Page::new("http://www.remax.pt/handlers/listinglist.ashx?page=1", "");
        assert_eq!(
            page.urljoin("/en/listing/123").unwrap(),
            "http://www.remax.pt/en/listing/123"
        );
        assert_eq!(
            page.urljoin("https://other.org/a").unwrap(),
            "https://other.org/a"
        );
        assert_eq!(
            page.urljoin("sibling").unwrap(),
            "http://www.remax.pt/handlers/sibling"
        );
    }

    #[test]
    fn urljoin_fails_on_relative_page() {
        let page = Page::new("not a url", "");
        assert!(page.urljoin("/a").is_err());
    }

    #[test]
    fn json_payload() {
        let page = Page::new("http://a", r#"{"llContentContainerHtml": "<p>hi</p>"}"#);
        let payload: HashMap<String, String> = page.json().unwrap();
        assert_eq!(payload["llContentContainerHtml"], "<p>hi</p>");

        let broken = Page::new("http://a", "<html>");
        assert!(broken.json::<serde_json::Value>().is_err());
    }
}
