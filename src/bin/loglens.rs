use anyhow::{bail, Context, Result};
use clap::Parser;
use loglens::aggregate::MemorySink;
use loglens::config::{AnalysisConfig, InsightProvider};
use loglens::pipeline::run_analysis;
use loglens::reader::LogSource;
use loglens::report::render_markdown;
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "loglens", version, about = "Log analysis pipeline: parse, redact, cluster, summarize")]
struct Cli {
    /// Input file (`-` for stdin). Gzip is detected by `.gz` suffix or magic bytes.
    input: String,

    /// Treat the input file as pasted text instead of a stored upload
    #[arg(long = "paste", default_value_t = false)]
    paste: bool,

    #[arg(long = "max-lines", default_value_t = 50_000)]
    max_lines: usize,
    #[arg(long = "max-bytes", default_value_t = 20 * 1024 * 1024)]
    max_bytes: u64,

    /// Disable TF-IDF cluster merging
    #[arg(long = "no-merge", default_value_t = false)]
    no_merge: bool,
    #[arg(long = "similarity-threshold", default_value_t = 0.72)]
    similarity_threshold: f64,

    /// Disable sensitive-data redaction
    #[arg(long = "no-redaction", default_value_t = false)]
    no_redaction: bool,

    /// Disable the AI insight stage
    #[arg(long = "no-insight", default_value_t = false)]
    no_insight: bool,
    /// Insight backend: mock | openai
    #[arg(long = "insight-provider", default_value = "mock")]
    insight_provider: String,
    #[arg(long = "model", default_value = "gpt-4o-mini")]
    model: String,
    #[arg(long = "api-url", default_value = "https://api.openai.com/v1/chat/completions")]
    api_url: String,
    /// API key for the openai backend; falls back to LOGLENS_API_KEY
    #[arg(long = "api-key")]
    api_key: Option<String>,

    /// Output format: json | markdown
    #[arg(long = "format", default_value = "json")]
    format: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AnalysisConfig::default();
    config.max_lines = cli.max_lines;
    config.max_bytes = cli.max_bytes;
    config.merge.enabled = !cli.no_merge;
    config.merge.similarity_threshold = cli.similarity_threshold;
    config.redaction.enabled = !cli.no_redaction;
    config.insight.enabled = !cli.no_insight;
    config.insight.provider = match cli.insight_provider.trim().to_lowercase().as_str() {
        "mock" => InsightProvider::Mock,
        "openai" => InsightProvider::OpenAi,
        other => bail!("unsupported insight provider: {other}"),
    };
    config.insight.model = cli.model;
    config.insight.api_url = cli.api_url;
    config.insight.api_key = cli
        .api_key
        .or_else(|| std::env::var("LOGLENS_API_KEY").ok())
        .unwrap_or_default();

    let source = if cli.input == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("reading stdin")?;
        LogSource::Inline(content)
    } else if cli.paste {
        let content = std::fs::read_to_string(&cli.input)
            .with_context(|| format!("reading {}", cli.input))?;
        LogSource::Inline(content)
    } else {
        LogSource::Upload {
            key: PathBuf::from(&cli.input),
        }
    };

    let mut sink = MemorySink::default();
    let outcome = run_analysis(&source, &config, &mut sink, None);

    match cli.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&outcome)?),
        "markdown" => print!("{}", render_markdown(&outcome, &cli.input, &sink.events)),
        other => bail!("unsupported output format: {other}"),
    }

    Ok(())
}
