use std::fs::File;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::{env, io};

use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use micasa_crawler::{
    crawl_site, CrawlReport, CrawlerConfig, Fetch, HttpFetcher, OnError, Sink, Site, Throttle,
    Throttled,
};
use micasa_sites::remax::RemaxQuery;
use micasa_sites::{
    dmoz, remax, CsvOptions, FileMode, Html, RecordFormat, RecordWriter, SiteProfile, WriterConfig,
};
use tokio::runtime;

/// House hunting crawler
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[command(name = "crawl")]
    Crawl(CrawlArgs),
    #[command(hide = true)]
    Completion,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum BuiltinSite {
    Dmoz,
    Remax,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Format {
    Csv,
    Jsonl,
}

/// Crawl a site and write extracted records
#[derive(Debug, clap::Args)]
#[command(group = clap::ArgGroup::new("target").required(true))]
pub struct CrawlArgs {
    /// One of the built-in sites
    #[arg(group = "target", long, value_enum)]
    pub site: Option<BuiltinSite>,
    /// Path to a yaml site profile
    #[arg(group = "target", long)]
    pub profile: Option<PathBuf>,
    /// Path to the output file, stdout when missing
    #[arg(long, short)]
    pub output_file: Option<PathBuf>,
    /// Output format of the records
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    pub format: Format,
    /// Append to the output file instead of truncating it
    #[arg(long)]
    pub append: bool,
    /// Optional crawler yaml configuration file
    #[arg(env = "MICASA_CRAWLER_CONFIG", long)]
    pub crawler_config: Option<PathBuf>,
    /// Override crawler's user agent
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Override crawler's number of workers
    #[arg(long)]
    pub num_workers: Option<usize>,
    /// Override crawler's maximum concurrent page downloads
    #[arg(long)]
    pub throttle_concurrent: Option<usize>,
    /// Maximum monthly rent of the remax search
    #[arg(long, default_value_t = 900)]
    pub max_rent: u32,
    /// Number of remax result pages to seed
    #[arg(long, default_value_t = 1)]
    pub pages: usize,
    /// Override crawler's fetch error handling strategy
    #[arg(long, value_enum)]
    pub on_fetch_error: Option<OnError>,
    /// Override crawler's parse error handling strategy
    #[arg(long, value_enum)]
    pub on_parse_error: Option<OnError>,
    /// Override crawler's sink error handling strategy
    #[arg(long, value_enum)]
    pub on_sink_error: Option<OnError>,
    /// No SIGINT handling
    #[arg(long)]
    pub no_sigint: bool,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf = if let Some(file) = args.crawler_config.as_ref().map(File::open) {
            serde_yaml::from_reader(file?)?
        } else {
            CrawlerConfig::default()
        };
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(num_workers) = args.num_workers {
            conf.num_workers = num_workers;
        }
        if let Some(concurrent) = args.throttle_concurrent {
            let concurrent = NonZeroUsize::new(concurrent)
                .ok_or_else(|| anyhow::anyhow!("--throttle-concurrent must be at least 1"))?;
            conf.throttle = Some(Throttle::Concurrent(concurrent));
        }
        if let Some(on_fetch_error) = args.on_fetch_error {
            conf.on_fetch_error = on_fetch_error;
        }
        if let Some(on_parse_error) = args.on_parse_error {
            conf.on_parse_error = on_parse_error;
        }
        if let Some(on_sink_error) = args.on_sink_error {
            conf.on_sink_error = on_sink_error;
        }
        if args.no_sigint {
            conf.handle_sigint = false;
        }
        Ok(conf)
    }
}

impl From<&CrawlArgs> for WriterConfig {
    fn from(args: &CrawlArgs) -> Self {
        Self {
            output: args.output_file.clone(),
            file_mode: if args.append {
                FileMode::Append
            } else {
                FileMode::Create
            },
            format: match args.format {
                Format::Csv => RecordFormat::Csv(CsvOptions::default()),
                Format::Jsonl => RecordFormat::JsonLines,
            },
        }
    }
}

fn load_site(args: &CrawlArgs) -> anyhow::Result<Site<Html>> {
    match (&args.site, &args.profile) {
        (Some(BuiltinSite::Dmoz), _) => dmoz::site(),
        (Some(BuiltinSite::Remax), _) => remax::site(&RemaxQuery {
            max_rent: args.max_rent,
            pages: args.pages,
        }),
        (None, Some(path)) => SiteProfile::from_file(path)?.into_site(),
        (None, None) => anyhow::bail!("Missing `site` or `profile`"),
    }
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<CrawlReport> {
    let crawler_conf: CrawlerConfig = (&args).try_into()?;
    crawler_conf.validate()?;
    let site = load_site(&args)?;
    let sink: Arc<dyn Sink> = Arc::new(RecordWriter::spawn(&(&args).into())?);

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(async move {
        let http = HttpFetcher::new(&crawler_conf)?;
        let fetcher: Arc<dyn Fetch> = match crawler_conf.throttle {
            Some(throttle) => Arc::new(Throttled::new(http, throttle)?),
            None => Arc::new(http),
        };
        crawl_site(&crawler_conf, site, fetcher, sink).await
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            if !args.quiet {
                if env::var_os("RUST_LOG").is_none() {
                    env::set_var("RUST_LOG", "micasa_crawler=info,micasa_sites=warn");
                }
                env_logger::init();
            }
            let report = crawl(args)?;
            eprintln!(
                "Crawled {} pages ({} spiders, {} items), wrote {} records, {} failures",
                report.tasks_run(),
                report.spiders_run,
                report.parsers_run,
                report.records,
                report.failures()
            );
            Ok(())
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "micasa", &mut io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let args = Args::parse_from([
            "micasa",
            "crawl",
            "--site",
            "remax",
            "--num-workers",
            "2",
            "--throttle-concurrent",
            "5",
            "--on-fetch-error",
            "fail",
            "--no-sigint",
        ]);
        let SubCommand::Crawl(args) = args.cmd else {
            panic!("expected crawl");
        };
        let conf = CrawlerConfig::try_from(&args).unwrap();
        assert_eq!(conf.num_workers, 2);
        assert_eq!(conf.throttle, Some(Throttle::Concurrent(NonZeroUsize::new(5).unwrap())));
        assert_eq!(conf.on_fetch_error, OnError::Fail);
        assert!(!conf.handle_sigint);
        assert_eq!(conf.idle_backoff_ms, 400);
    }

    #[test]
    fn target_is_required() {
        assert!(Args::try_parse_from(["micasa", "crawl"]).is_err());
        assert!(Args::try_parse_from(["micasa", "crawl", "--site", "dmoz", "--profile", "x.yaml"]).is_err());
    }
}
