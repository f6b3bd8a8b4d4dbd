use std::collections::HashMap;
use std::iter;
use std::path::PathBuf;
use std::sync::Arc;

use micasa_crawler::{
    anyhow, async_trait, crawl_site, CrawlReport, CrawlerConfig, Fetch, ItemRules, ItemStrategy,
    OnError, Page, Record, Records, Site, SpiderRules,
};
use micasa_sites::{
    CssLinks, CsvOptions, Html, HtmlParser, LinkRule, RecordFormat, RecordWriter, SiteProfile,
    WriterConfig,
};

struct StaticPages(HashMap<&'static str, &'static str>);

#[async_trait]
impl Fetch for StaticPages {
    async fn get(&self, url: &str) -> anyhow::Result<Page> {
        self.0
            .get(url)
            .map(|body| Page::new(url, *body))
            .ok_or_else(|| anyhow::anyhow!("404 Not Found: {url}"))
    }
}

const PROFILE: &str = r#"
name: directory
seeds: ["http://dir.example.org/"]
spider:
  spiderLinks:
    - selector: a.next
  itemLinks:
    - selector: ul.entries > li > a
item:
  fields:
    - name: name
      selector: h1
    - name: homepage
      selector: a.home
      attr: href
      url: true
"#;

fn pages() -> StaticPages {
    StaticPages(HashMap::from([
        (
            "http://dir.example.org/",
            r#"<ul class="entries"><li><a href="/alice">Alice</a></li><li><a href="/bob">Bob</a></li></ul>
               <a class="next" href="/page/2">next</a>"#,
        ),
        (
            "http://dir.example.org/page/2",
            r#"<ul class="entries"><li><a href="/bob">Bob</a></li><li><a href="/carol">Carol</a></li></ul>
               <a class="next" href="/">first</a>"#,
        ),
        (
            "http://dir.example.org/alice",
            r#"<h1> Alice </h1><a class="home" href="https://alice.example.org/">home</a>"#,
        ),
        (
            "http://dir.example.org/bob",
            r#"<h1>Bob</h1><a class="home" href="/~bob/">home</a>"#,
        ),
        ("http://dir.example.org/carol", r#"<h1>Carol</h1>"#),
    ]))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crawl_profile_into_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.jsonl");

    let site = SiteProfile::from_yaml(PROFILE).unwrap().into_site().unwrap();
    let sink = Arc::new(
        RecordWriter::spawn(&WriterConfig {
            output: Some(path.clone()),
            format: RecordFormat::JsonLines,
            ..Default::default()
        })
        .unwrap(),
    );
    let config = CrawlerConfig {
        num_workers: 2,
        idle_backoff_ms: 10,
        handle_sigint: false,
        ..Default::default()
    };

    let report = crawl_site(&config, site, Arc::new(pages()), sink)
        .await
        .unwrap();

    assert_eq!(report.spiders_run, 2);
    assert_eq!(report.parsers_run, 3);
    assert_eq!(report.records, 2);
    // Carol has no homepage
    assert_eq!(report.parse_failures, 1);

    let mut lines = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(String::from)
        .collect::<Vec<_>>();
    lines.sort();
    assert_eq!(
        lines,
        [
            r#"{"name":"Alice","homepage":"https://alice.example.org/"}"#,
            r#"{"name":"Bob","homepage":"http://dir.example.org/~bob/"}"#,
        ]
    );
}

/// One field per comma separated value of the page body.
struct BodyFields;

impl ItemStrategy<Html> for BodyFields {
    fn records<'a>(&'a self, page: &'a Page, _doc: &'a Html) -> Records<'a> {
        let record = page
            .text()
            .split(',')
            .enumerate()
            .map(|(i, value)| (format!("f{i}"), value.trim()))
            .collect::<Record>();
        Box::new(iter::once(Ok(record)))
    }
}

async fn crawl_uneven_records(on_sink_error: OnError, path: PathBuf) -> anyhow::Result<CrawlReport> {
    let fetcher = StaticPages(HashMap::from([
        (
            "http://uneven.example.org/",
            r#"<ul><li><a href="/a">a</a></li><li><a href="/b">b</a></li><li><a href="/c">c</a></li></ul>"#,
        ),
        ("http://uneven.example.org/a", "alice"),
        ("http://uneven.example.org/b", "bob, extra"),
        ("http://uneven.example.org/c", "carol"),
    ]));
    let site = Site {
        name: String::from("uneven"),
        seeds: vec![String::from("http://uneven.example.org/")],
        spider: SpiderRules::new(
            HtmlParser,
            CssLinks::new(&[], &[LinkRule::new("li > a")]).unwrap(),
        ),
        item: ItemRules::new(HtmlParser, BodyFields),
    };
    let sink = Arc::new(
        RecordWriter::spawn(&WriterConfig {
            output: Some(path),
            format: RecordFormat::Csv(CsvOptions::default()),
            ..Default::default()
        })
        .unwrap(),
    );
    // A single worker takes item pages in link order
    let config = CrawlerConfig {
        num_workers: 1,
        idle_backoff_ms: 10,
        handle_sigint: false,
        on_sink_error,
        ..Default::default()
    };

    crawl_site(&config, site, Arc::new(fetcher), sink).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_record_is_a_sink_failure_of_its_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.csv");

    let report = crawl_uneven_records(OnError::SkipAndLog, path.clone())
        .await
        .unwrap();

    assert_eq!(report.parsers_run, 3);
    assert_eq!(report.records, 2);
    assert_eq!(report.sink_failures, 1);
    assert_eq!(report.failures(), 1);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "f0\nalice\ncarol\n"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_record_fails_the_run_under_fail_policy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.csv");

    let err = crawl_uneven_records(OnError::Fail, path.clone())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Sink"));
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "f0\nalice\ncarol\n"
    );
}
