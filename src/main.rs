use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatlytics_export::export::{DirectorySink, PageLayout};
use chatlytics_export::rendering::Document;
use chatlytics_export::{ExportConfig, Exporter, Viewport};

#[derive(Parser)]
#[command(name = "chatlytics-export", version, about = "Export Chatlytics dashboards as PDF reports")]
struct Cli {
    /// Log pipeline progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture a dashboard HTML file into a PDF report
    Export {
        #[arg(long)]
        html: PathBuf,
        /// CSS selector of the element to capture
        #[arg(long, default_value = "body")]
        selector: String,
        /// Report label, usually the selected user or "Overall"
        #[arg(long)]
        label: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// JSON export configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// One page sized to the content instead of A4 pages
        #[arg(long)]
        single_page: bool,
        /// Viewport the dashboard is displayed in, WIDTHxHEIGHT
        #[arg(long, default_value = "390x844")]
        viewport: Viewport,
    },
    /// Upload a chat export to the analysis service and print the result
    #[cfg(feature = "api")]
    Analyze {
        chat: PathBuf,
        /// Service base URL (defaults to $CHATLYTICS_API_URL)
        #[arg(long)]
        api: Option<String>,
    },
}

/// A valid `RUST_LOG` wins over `--verbose`.
fn log_filter(directives: Option<String>, verbose: bool) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(if verbose { "debug" } else { "warn" }))
}

// `log` records reach the subscriber through its `tracing-log` bridge.
fn init_logging(verbose: bool) {
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), verbose);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli.command).await {
        eprintln!("Failed to generate PDF report: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Export { html, selector, label, out, config, single_page, viewport } => {
            let mut cfg = match config {
                Some(path) => ExportConfig::from_json_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => ExportConfig::default(),
            };
            if single_page {
                cfg.page_layout = PageLayout::SinglePage;
            }

            let source = tokio::fs::read_to_string(&html)
                .await
                .with_context(|| format!("reading {}", html.display()))?;
            let doc = Document::parse(&source, viewport)?;
            let target = doc
                .query(&selector)?
                .ok_or_else(|| anyhow!("no element matches '{}'", selector))?;

            let exporter = Exporter::new(cfg).with_sink(DirectorySink::new(&out));
            let report = exporter.generate_report(&doc, target, &label).await?;
            println!(
                "{} ({} page{}, {}x{} px)",
                out.join(&report.filename).display(),
                report.pages,
                if report.pages == 1 { "" } else { "s" },
                report.raster_size.0,
                report.raster_size.1
            );
        }
        #[cfg(feature = "api")]
        Command::Analyze { chat, api } => {
            use chatlytics_export::api::AnalysisClient;

            let client = match api {
                Some(url) => AnalysisClient::new(&url)?,
                None => AnalysisClient::from_env()?,
            };
            let res = client.analyze_file(&chat).await?;
            if let Some(overall) = res.overall() {
                eprintln!(
                    "{} users, {} messages, {} words",
                    res.users.len(),
                    overall.basic_stats.messages,
                    overall.basic_stats.words
                );
            }
            println!("{}", serde_json::to_string_pretty(&res)?);
        }
    }
    Ok(())
}
