use std::iter;

use anyhow::{anyhow, bail, Result};
use micasa_crawler::{ItemStrategy, Page, Record, Records, SpiderStrategy, Targets};
use serde::{Deserialize, Serialize};
use sws_scraper::{ElementRef, Html, Selector};

pub(crate) fn compile(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid CSS selector `{css}` got: {e:?}"))
}

pub(crate) fn attr(elem: &ElementRef, name: &str) -> Option<String> {
    elem.map_value(|v| v.attr(name).map(String::from)).flatten()
}

pub(crate) fn text(elem: &ElementRef) -> String {
    elem.inner_text().trim().to_string()
}

/// Links found in a document, as written in a site profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRule {
    pub selector: String,
    #[serde(default = "default_link_attr")]
    pub attr: String,
    /// Appended to every resolved link
    #[serde(default)]
    pub suffix: Option<String>,
}

fn default_link_attr() -> String {
    String::from("href")
}

impl LinkRule {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attr: default_link_attr(),
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn compile(&self) -> Result<Links> {
        Ok(Links {
            selector: compile(&self.selector)?,
            attr: self.attr.clone(),
            suffix: self.suffix.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Links {
    selector: Selector,
    attr: String,
    suffix: Option<String>,
}

impl Links {
    /// Elements missing the attribute are skipped.
    pub fn resolve<'a>(
        &'a self,
        page: &'a Page,
        doc: &'a Html,
    ) -> impl Iterator<Item = Result<String>> + 'a {
        doc.select(self.selector.clone()).filter_map(move |elem| {
            let href = attr(&elem, &self.attr)?;
            let link = page.urljoin(&href).map(|url| match &self.suffix {
                Some(suffix) => url + suffix,
                None => url,
            });
            Some(link)
        })
    }
}

/// Spider strategy following CSS selected links.
#[derive(Debug, Clone, Default)]
pub struct CssLinks {
    pub spiders: Vec<Links>,
    pub items: Vec<Links>,
}

impl CssLinks {
    pub fn new(spider_rules: &[LinkRule], item_rules: &[LinkRule]) -> Result<Self> {
        Ok(Self {
            spiders: spider_rules
                .iter()
                .map(LinkRule::compile)
                .collect::<Result<_>>()?,
            items: item_rules
                .iter()
                .map(LinkRule::compile)
                .collect::<Result<_>>()?,
        })
    }
}

impl SpiderStrategy<Html> for CssLinks {
    fn spider_targets<'a>(&'a self, page: &'a Page, doc: &'a Html) -> Targets<'a> {
        Box::new(self.spiders.iter().flat_map(move |l| l.resolve(page, doc)))
    }

    fn item_targets<'a>(&'a self, page: &'a Page, doc: &'a Html) -> Targets<'a> {
        Box::new(self.items.iter().flat_map(move |l| l.resolve(page, doc)))
    }
}

/// One record field, as written in a site profile.
///
/// Without `selector` the field is read from the record element itself, without
/// `attr` its trimmed text is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    pub name: String,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub attr: Option<String>,
    /// Resolve the value against the page URL
    #[serde(default)]
    pub url: bool,
    /// Missing values become empty instead of failing the page
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone)]
struct Field {
    rule: FieldRule,
    selector: Option<Selector>,
}

impl Field {
    fn extract(&self, page: &Page, elem: &ElementRef) -> Result<String> {
        let target = match &self.selector {
            Some(selector) => elem.select(selector.clone()).next(),
            None => Some(elem.clone()),
        };
        let value = target.and_then(|target| match &self.rule.attr {
            Some(name) => attr(&target, name),
            None => Some(text(&target)),
        });
        match value {
            Some(value) if self.rule.url => page.urljoin(&value),
            Some(value) => Ok(value),
            None if self.rule.optional => Ok(String::new()),
            None => bail!("Missing field `{}`", self.rule.name),
        }
    }
}

/// Item strategy building records out of CSS selected fields.
///
/// With a `container` every matching element yields a record, otherwise the
/// page yields exactly one.
#[derive(Debug, Clone)]
pub struct CssRecords {
    container: Option<Selector>,
    fields: Vec<Field>,
}

impl CssRecords {
    pub fn new(container: Option<&str>, rules: &[FieldRule]) -> Result<Self> {
        let fields = rules
            .iter()
            .map(|rule| {
                Ok(Field {
                    rule: rule.clone(),
                    selector: rule.selector.as_deref().map(compile).transpose()?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self {
            container: container.map(compile).transpose()?,
            fields,
        })
    }

    fn record(&self, page: &Page, elem: &ElementRef) -> Result<Record> {
        let mut record = Record::new();
        for field in &self.fields {
            record.push(field.rule.name.as_str(), field.extract(page, elem)?);
        }
        Ok(record)
    }
}

impl ItemStrategy<Html> for CssRecords {
    fn records<'a>(&'a self, page: &'a Page, doc: &'a Html) -> Records<'a> {
        match &self.container {
            Some(container) => Box::new(
                doc.select(container.clone())
                    .map(move |elem| self.record(page, &elem)),
            ),
            None => Box::new(iter::once_with(move || {
                self.record(page, &doc.root_element())
            })),
        }
    }
}
