use std::path::Path;

use anyhow::{bail, Context, Result};
use micasa_crawler::{ItemRules, Site, SpiderRules};
use serde::{Deserialize, Serialize};
use sws_scraper::Html;

use crate::document::DocumentFormat;
use crate::rules::{CssLinks, CssRecords, FieldRule, LinkRule};

/// A site described with CSS selectors instead of code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteProfile {
    pub name: String,
    pub seeds: Vec<String>,
    pub spider: SpiderProfile,
    pub item: ItemProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiderProfile {
    #[serde(default)]
    pub document: DocumentFormat,
    #[serde(default)]
    pub spider_links: Vec<LinkRule>,
    #[serde(default)]
    pub item_links: Vec<LinkRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemProfile {
    #[serde(default)]
    pub document: DocumentFormat,
    #[serde(default)]
    pub container: Option<String>,
    pub fields: Vec<FieldRule>,
}

impl SiteProfile {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs_err::read_to_string(path)?;
        Self::from_yaml(&yaml).with_context(|| format!("Invalid site profile {}", path.display()))
    }

    /// Compiles every selector, failing before any page is fetched.
    pub fn into_site(self) -> Result<Site<Html>> {
        if self.seeds.is_empty() {
            bail!("Site profile {} has no seed", self.name);
        }
        if self.item.fields.is_empty() {
            bail!("Site profile {} has no item field", self.name);
        }

        let links = CssLinks::new(&self.spider.spider_links, &self.spider.item_links)
            .with_context(|| format!("Invalid spider links of {}", self.name))?;
        let records = CssRecords::new(self.item.container.as_deref(), &self.item.fields)
            .with_context(|| format!("Invalid item fields of {}", self.name))?;

        Ok(Site {
            name: self.name,
            seeds: self.seeds,
            spider: SpiderRules::new(self.spider.document.parser(), links),
            item: ItemRules::new(self.item.document.parser(), records),
        })
    }
}
