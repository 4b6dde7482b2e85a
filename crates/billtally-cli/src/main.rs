use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use billtally::config::{DEFAULT_EXCLUSIONS, DEFAULT_KEYWORD};
use billtally::{
    BrowserSearch, CongressApiClient, HttpPdfFetcher, KeywordCounter, Pipeline, PipelineConfig,
    ResultParser, SearchOptions, SearchProvider, SnapshotSearch,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;

const SEARCH_RESULTS_FILE: &str = "search_results.json";
const KEYWORD_RESULTS_FILE: &str = "keyword_search_results.json";
const FAILURES_FILE: &str = "keyword_search_failures.json";

#[derive(Parser)]
#[command(name = "billtally")]
#[command(about = "Count a keyword across the full text of congress.gov bills", long_about = None)]
struct Cli {
    #[arg(
        short = 'l',
        long = "log-level",
        value_enum,
        default_value = "info",
        global = true,
        help = "Set the logging level"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(short, long, default_value = DEFAULT_KEYWORD, help = "Keyword to search for and count")]
    keyword: String,

    #[arg(
        long = "exclude",
        value_name = "DESIGNATOR",
        help = "Bill designator to ignore, e.g. H.R.324 (repeatable)"
    )]
    exclude: Vec<String>,

    #[arg(long, help = "Do not apply the built-in exclusion list")]
    no_default_exclusions: bool,

    #[arg(
        long,
        value_name = "FILE",
        help = "Parse a saved results page instead of driving the browser"
    )]
    html_file: Option<PathBuf>,

    #[arg(long, help = "Run the browser with a visible window")]
    show_browser: bool,

    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 30,
        help = "How long to wait for search results to settle"
    )]
    ready_timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Search, resolve every bill's latest PDF and count the keyword in it
    Run {
        #[command(flatten)]
        search: SearchArgs,

        #[arg(long, env = "CONGRESS_API_KEY", hide_env_values = true, help = "congress.gov API key")]
        api_key: Option<String>,

        #[arg(
            long,
            value_name = "DIR",
            default_value = "analysis",
            help = "Directory the JSON results are written to"
        )]
        output_dir: PathBuf,

        #[arg(
            long,
            default_value_t = 1,
            value_parser = clap::value_parser!(u16).range(1..),
            help = "Number of bills processed at once"
        )]
        concurrency: u16,

        #[arg(
            long,
            value_name = "SECONDS",
            value_parser = clap::value_parser!(u64).range(1..),
            help = "Give up on a single bill after this many seconds"
        )]
        bill_timeout: Option<u64>,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Console summary format"
        )]
        format: OutputFormat,
    },
    /// Search and parse the results page only
    Search {
        #[command(flatten)]
        search: SearchArgs,

        #[arg(
            long,
            value_name = "DIR",
            help = "Write search_results.json to this directory instead of printing"
        )]
        output_dir: Option<PathBuf>,

        #[arg(
            short = 'o',
            long = "output",
            value_enum,
            default_value = "text",
            help = "Output format"
        )]
        format: OutputFormat,
    },
    /// Count the keyword in a local PDF file
    Count {
        #[arg(help = "Path to the PDF file")]
        pdf: PathBuf,

        #[arg(short, long, default_value = DEFAULT_KEYWORD, help = "Keyword to count")]
        keyword: String,
    },
}

impl SearchArgs {
    fn pipeline_config(&self) -> PipelineConfig {
        let mut exclusions: HashSet<String> = if self.no_default_exclusions {
            HashSet::new()
        } else {
            DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect()
        };
        exclusions.extend(self.exclude.iter().cloned());

        PipelineConfig {
            keyword: self.keyword.clone(),
            exclusions,
            search: SearchOptions {
                headless: !self.show_browser,
                ready_timeout: Duration::from_secs(self.ready_timeout),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn serialize_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            log::error!("Error serializing to JSON: {}", e);
            process::exit(1);
        }
    }
}

fn write_json<T: serde::Serialize>(dir: &Path, file: &str, value: &T) {
    let path = dir.join(file);
    log::info!("Saving results to {}", path.display());

    let result = fs::create_dir_all(dir)
        .map_err(|e| e.to_string())
        .and_then(|_| serde_json::to_string_pretty(value).map_err(|e| e.to_string()))
        .and_then(|json| fs::write(&path, json).map_err(|e| e.to_string()));

    if let Err(e) = result {
        log::error!("Error writing {}: {}", path.display(), e);
        process::exit(1);
    }
}

async fn run_pipeline<S: SearchProvider>(
    search: S,
    config: PipelineConfig,
    api_key: Option<String>,
    output_dir: &Path,
    format: OutputFormat,
) {
    let resolver = CongressApiClient::new(api_key, config.http_timeout).unwrap_or_else(|e| {
        log::error!("Configuration error: {}", e);
        process::exit(1);
    });
    let fetcher = HttpPdfFetcher::new(config.http_timeout).unwrap_or_else(|e| {
        log::error!("Configuration error: {}", e);
        process::exit(1);
    });
    let pipeline = Pipeline::new(config, search, resolver, fetcher).unwrap_or_else(|e| {
        log::error!("Configuration error: {}", e);
        process::exit(1);
    });

    let bills = pipeline.search().await.unwrap_or_else(|e| {
        log::error!("Aborting: {}", e);
        process::exit(1);
    });
    write_json(output_dir, SEARCH_RESULTS_FILE, &bills);

    let report = pipeline.count_bills(&bills).await;
    write_json(output_dir, KEYWORD_RESULTS_FILE, &report.counts);
    write_json(output_dir, FAILURES_FILE, &report.failures);

    for failure in &report.failures {
        log::warn!("{}", failure);
    }

    match format {
        OutputFormat::Json => serialize_json(&report),
        OutputFormat::Text => print!("{}", report),
    }
}

async fn run_search<S: SearchProvider>(
    search: S,
    config: PipelineConfig,
    output_dir: Option<PathBuf>,
    format: OutputFormat,
) {
    let html = search
        .rendered_results(&config.keyword)
        .await
        .unwrap_or_else(|e| {
            log::error!("Aborting: {}", e);
            process::exit(1);
        });

    let bills = ResultParser::from_config(&config).parse(&html);

    if let Some(dir) = output_dir {
        write_json(&dir, SEARCH_RESULTS_FILE, &bills);
        return;
    }

    match format {
        OutputFormat::Json => serialize_json(&bills),
        OutputFormat::Text => {
            if bills.is_empty() {
                println!("No bills to display.");
            } else {
                for (i, bill) in bills.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, bill);
                }
            }
        }
    }
}

fn snapshot_or_exit(path: &Path) -> SnapshotSearch {
    SnapshotSearch::from_file(path).unwrap_or_else(|e| {
        log::error!("Aborting: {}", e);
        process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; CONGRESS_API_KEY may come from the environment or --api-key.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level.clone().into())
        .init();

    match cli.command {
        Commands::Run {
            search,
            api_key,
            output_dir,
            concurrency,
            bill_timeout,
            format,
        } => {
            let config = PipelineConfig {
                concurrency: concurrency as usize,
                bill_timeout: bill_timeout.map(Duration::from_secs),
                ..search.pipeline_config()
            };

            match &search.html_file {
                Some(path) => {
                    run_pipeline(snapshot_or_exit(path), config, api_key, &output_dir, format)
                        .await
                }
                None => {
                    let browser = BrowserSearch::from_config(&config);
                    run_pipeline(browser, config, api_key, &output_dir, format).await
                }
            }
        }

        Commands::Search {
            search,
            output_dir,
            format,
        } => {
            let config = search.pipeline_config().validate().unwrap_or_else(|e| {
                log::error!("Invalid args: {e}");
                process::exit(1);
            });

            match &search.html_file {
                Some(path) => run_search(snapshot_or_exit(path), config, output_dir, format).await,
                None => {
                    let browser = BrowserSearch::from_config(&config);
                    run_search(browser, config, output_dir, format).await
                }
            }
        }

        Commands::Count { pdf, keyword } => {
            let counter = KeywordCounter::new(&keyword).unwrap_or_else(|e| {
                log::error!("Invalid args: {e}");
                process::exit(1);
            });

            let bytes = fs::read(&pdf).unwrap_or_else(|e| {
                log::error!("Error reading {}: {}", pdf.display(), e);
                process::exit(1);
            });

            let count = counter.count_in_pdf_blocking(bytes).await.unwrap_or_else(|e| {
                log::error!("Error counting '{}' in {}: {}", keyword, pdf.display(), e);
                process::exit(1);
            });

            println!("{}: {} × '{}'", pdf.display(), count, counter.keyword());
        }
    }
}
