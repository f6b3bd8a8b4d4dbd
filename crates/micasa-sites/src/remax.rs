//! Rental apartments listed on remax.pt.
//!
//! Spider pages come from the listing-list handler, which answers with JSON
//! wrapping the result markup, each listing then is a plain HTML page.

use std::collections::HashMap;
use std::iter;

use anyhow::{anyhow, Context, Result};
use micasa_crawler::{ItemRules, ItemStrategy, Page, Record, Records, Site, SpiderRules};
use serde::{Deserialize, Serialize};
use sws_scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::document::{DocumentFormat, HtmlParser};
use crate::rules::{attr, compile, text, CssLinks, LinkRule};

pub const LISTING_LIST_URL: &str = "http://www.remax.pt/handlers/listinglist.ashx";

/// Search parameters of the listing-list handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemaxQuery {
    /// Maximum monthly rent, in EUR
    #[serde(default = "default_max_rent")]
    pub max_rent: u32,
    /// Number of result pages to seed
    #[serde(default = "default_pages")]
    pub pages: usize,
}

impl Default for RemaxQuery {
    fn default() -> Self {
        Self {
            max_rent: default_max_rent(),
            pages: default_pages(),
        }
    }
}

fn default_max_rent() -> u32 {
    900
}

fn default_pages() -> usize {
    1
}

impl RemaxQuery {
    pub fn seeds(&self) -> Result<Vec<String>> {
        let max_rent = self.max_rent.to_string();
        (1..=self.pages)
            .map(|page| {
                let page = page.to_string();
                let params = [
                    ("mode", "list"),
                    ("tt", "260"), // rent
                    ("cr", "2"), // residential
                    ("r", "76"), // Lisbon region
                    ("p", "537"), // Lisbon province
                    ("pt", "359"), // condo/apartment
                    ("rmax", max_rent.as_str()),
                    ("cur", "EUR"),
                    ("la", "All"),
                    ("sb", "MostRecent"),
                    ("page", page.as_str()),
                    ("sc", "12"), // Portugal
                ];
                Ok(Url::parse_with_params(LISTING_LIST_URL, &params)?.to_string())
            })
            .collect()
    }
}

pub fn site(query: &RemaxQuery) -> Result<Site<Html>> {
    let links = CssLinks::new(
        &[],
        &[LinkRule::new("div.proplist-address > a").with_suffix("/?Lang=en-US")],
    )?;
    Ok(Site {
        name: String::from("remax"),
        seeds: query.seeds()?,
        spider: SpiderRules::new(
            DocumentFormat::JsonField("llContentContainerHtml".into()).parser(),
            links,
        ),
        item: ItemRules::new(HtmlParser, RemaxListing::new()?),
    })
}

/// Extracts the single record of a listing page.
///
/// Listings are not uniform, any missing piece fails the page.
#[derive(Debug, Clone)]
pub struct RemaxListing {
    reference: Selector,
    price: Selector,
    address: Selector,
    description: Selector,
    details: Selector,
    titled: Selector,
}

impl RemaxListing {
    pub fn new() -> Result<Self> {
        Ok(Self {
            reference: compile(r#"[itemprop="productID"]"#)?,
            price: compile(r#"[itemprop="price"]"#)?,
            address: compile(".key-address")?,
            description: compile(r#"[itemprop="description"]"#)?,
            details: compile(".data-item > *")?,
            titled: compile("[title]")?,
        })
    }

    fn first_text(&self, doc: &Html, selector: &Selector, what: &str) -> Result<String> {
        doc.select(selector.clone())
            .next()
            .map(|elem| text(&elem))
            .ok_or_else(|| anyhow!("Missing {what}"))
    }

    /// Label and value of every `data-item` row, both lowercased.
    fn details(&self, doc: &Html) -> HashMap<String, String> {
        doc.select(self.details.clone())
            .filter_map(|row| {
                let titles = row
                    .select(self.titled.clone())
                    .take(3)
                    .map(|elem: ElementRef| attr(&elem, "title"))
                    .collect::<Vec<_>>();
                match titles.as_slice() {
                    [_, Some(label), Some(value)] => {
                        Some((label.trim().to_lowercase(), value.trim().to_lowercase()))
                    }
                    _ => None,
                }
            })
            .collect()
    }

    fn record(&self, page: &Page, doc: &Html) -> Result<Record> {
        let price = self.first_text(doc, &self.price, "price")?;
        let price = price
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse::<u64>()
            .with_context(|| format!("Invalid price `{price}`"))?;

        let details = self.details(doc);
        let detail = |label: &str| {
            details
                .get(label)
                .cloned()
                .ok_or_else(|| anyhow!("Missing detail `{label}`"))
        };

        Ok(Record::new()
            .with("url", page.url.as_str())
            .with("agent", "remax")
            .with(
                "agent_reference",
                self.first_text(doc, &self.reference, "agent reference")?,
            )
            .with("property_type", "apartment")
            .with("transaction_type", "rent")
            .with("price", price.to_string())
            .with("address", self.first_text(doc, &self.address, "address")?)
            .with(
                "description",
                self.first_text(doc, &self.description, "description")?,
            )
            .with("lot_size", detail("lot size (m2)")?)
            .with("year_built", detail("year build")?)
            .with("total_rooms", detail("total rooms")?)
            .with("bedrooms", detail("bedrooms")?)
            .with("floor_level", detail("floor level")?))
    }
}

impl ItemStrategy<Html> for RemaxListing {
    fn records<'a>(&'a self, page: &'a Page, doc: &'a Html) -> Records<'a> {
        Box::new(iter::once_with(move || self.record(page, doc)))
    }
}
