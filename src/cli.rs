use std::fmt::Display;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::builder::styling::{AnsiColor, Color, Style, Styles};
use clap::{Args, ColorChoice, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::{Generator, Shell, generate};
use clap_complete_nushell::Nushell;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{Span, info, warn};
use tracing_indicatif::indicatif_println;
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::style::ProgressStyle;

use crate::ai::seo::{check_seo_recommendation, make_seo_recommendations};
use crate::ai::{ChatModel, Provider};
use crate::cluster::community::{DEFAULT_MIN_CLUSTER_SIZE, DEFAULT_THRESHOLD};
use crate::cluster::{ClusterOutcome, CommunityDetection, SiteClusterer};
use crate::context::Context;
use crate::embed::DEFAULT_CHUNK_SIZE;
use crate::report::{CheckReport, KeywordReport, write_json_output};
use crate::search::fetch::PAGE_TIMEOUT;
use crate::search::{
    DuckDuckGo, HttpFetcher, PageFetcher, SearchProvider, SerpApi, fetch_sources,
};
use crate::text::strip_site;
use crate::vector_store::{DEFAULT_K, Metric, VectorStore};
use crate::{AppError, AppResult};

const STYLES: Styles = Styles::styled()
    .header(Style::new().bold())
    .usage(Style::new().bold())
    .error(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red))))
    .literal(
        Style::new()
            .bold()
            .fg_color(Some(Color::Ansi(AnsiColor::Green))),
    )
    .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow))))
    .valid(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))))
    .invalid(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightRed))))
    .context(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Magenta))))
    .context_value(
        Style::new()
            .bold()
            .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
    );

/// Long-form CLI description shown in `--help`.
const LONG_ABOUT: &str = "simsites - SEO hints from the sites that already rank

`keywords` searches the web, clusters the text of the top results by meaning and asks a
language model what the most common themes mean for your own site.

`check` embeds the text of one page, finds the passages closest to a recommendation and
asks the language model whether the page already follows it.

Mistral, OpenAI and any OpenAI-compatible server (such as \x1b]8;;https://lmstudio.ai/\x1b\\\x1b[4;36mLM Studio\x1b[24;39m\x1b]8;;\x1b\\) are supported.";

/// simsites - SEO hints from the sites that already rank.
#[derive(Parser, Debug, Clone)]
#[command(author, version, propagate_version = true, about, long_about = Some(LONG_ABOUT), styles = STYLES)]
pub struct Cli {
    /// Color choice for the output
    #[arg(long, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Subcommand to run
    #[command(subcommand)]
    pub cmd: Cmd,
}

/// Top-level commands supported by the CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Cluster the top search results for a search and get SEO recommendations
    ///
    /// Runs the search, fetches every result (falling back to the search snippet when a
    /// page cannot be fetched), groups the text of all pages into clusters of similar
    /// lines and asks the language model about each of the largest clusters.
    Keywords {
        #[command(flatten)]
        search: SearchArgs,
        #[command(flatten)]
        clustering: ClusterArgs,
        #[command(flatten)]
        backend: BackendArgs,
        /// Write the results to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Check a page against an SEO recommendation
    ///
    /// Fetches the page, indexes its lines and sends the lines closest to the
    /// recommendation to the language model for a verdict.
    Check {
        #[command(flatten)]
        check: CheckArgs,
        #[command(flatten)]
        backend: BackendArgs,
        /// Write the results to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },

    /// Generate shell completion for a given shell
    Completion {
        /// Output file to write the completion script to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// The shell to generate the completion for
        #[arg(value_enum)]
        shell: CompletionShell,

        #[command(flatten)]
        verbosity: Verbosity<InfoLevel>,
    },
}

/// Supported completion targets for shell auto-completion.
#[derive(ValueEnum, Clone, Debug)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
    Nushell,
}

impl Display for CompletionShell {
    /// Render the canonical shell name string.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompletionShell::Bash => "bash",
            CompletionShell::Zsh => "zsh",
            CompletionShell::Fish => "fish",
            CompletionShell::PowerShell => "powershell",
            CompletionShell::Elvish => "elvish",
            CompletionShell::Nushell => "nushell",
        };
        write!(f, "{}", s)
    }
}

impl Generator for &CompletionShell {
    fn generate(&self, cmd: &clap::builder::Command, buf: &mut dyn Write) {
        match self {
            CompletionShell::Bash => Shell::Bash.generate(cmd, buf),
            CompletionShell::Zsh => Shell::Zsh.generate(cmd, buf),
            CompletionShell::Fish => Shell::Fish.generate(cmd, buf),
            CompletionShell::PowerShell => Shell::PowerShell.generate(cmd, buf),
            CompletionShell::Elvish => Shell::Elvish.generate(cmd, buf),
            CompletionShell::Nushell => Nushell.generate(cmd, buf),
        }
    }

    fn file_name(&self, name: &str) -> String {
        match self {
            CompletionShell::Bash => Shell::Bash.file_name(name),
            CompletionShell::Zsh => Shell::Zsh.file_name(name),
            CompletionShell::Fish => Shell::Fish.file_name(name),
            CompletionShell::PowerShell => Shell::PowerShell.file_name(name),
            CompletionShell::Elvish => Shell::Elvish.file_name(name),
            CompletionShell::Nushell => Nushell.file_name(name),
        }
    }
}

/// Search engines the keywords command can query.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Engine {
    /// DuckDuckGo, results from the past year
    #[default]
    Ddg,
    /// Google through SerpApi (needs an API key)
    Serpapi,
}

/// Options for the web search.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// The search to optimize for
    #[arg(short, long)]
    pub search: String,

    /// Search engine to use
    #[arg(long, value_enum, default_value_t = Engine::Ddg)]
    pub engine: Engine,

    /// SerpApi key, required with `--engine serpapi`
    #[arg(long, env = "SERPAPI_KEY", hide_env_values = true)]
    pub serpapi_key: Option<String>,

    /// Location to search from (SerpApi only), e.g. "Austin, Texas"
    #[arg(long)]
    pub location: Option<String>,

    /// Two-letter country code of the search (SerpApi only)
    #[arg(long, default_value = "us")]
    pub country: String,

    /// Interface language of the search (SerpApi only)
    #[arg(long, default_value = "en")]
    pub language: String,

    /// Number of search results to fetch
    #[arg(long, default_value_t = 10)]
    pub max_results: usize,
}

/// Options for grouping lines into clusters.
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Smallest number of lines that counts as a cluster
    #[arg(long, default_value_t = DEFAULT_MIN_CLUSTER_SIZE)]
    pub min_cluster_size: usize,

    /// Cosine similarity every pair of lines in a cluster must reach
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f64,

    /// Number of clusters to report, largest first
    #[arg(long, default_value_t = 5)]
    pub clusters: usize,

    /// Number of distinct lines to report per cluster
    #[arg(long, default_value_t = 5)]
    pub terms: usize,
}

/// Options for the check command.
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// The search to optimize for
    #[arg(short, long)]
    pub search: String,

    /// Page to check (include http[s])
    #[arg(short, long)]
    pub url: String,

    /// SEO recommendation to check the page against
    #[arg(short, long)]
    pub recommendation: String,

    /// Number of page lines to show the language model
    #[arg(short, default_value_t = DEFAULT_K)]
    pub k: usize,

    /// Drop lines farther than this from the recommendation
    #[arg(long)]
    pub distance_threshold: Option<f64>,

    /// Distance used to rank page lines
    #[arg(long, value_enum, default_value_t = Metric::Cosine)]
    pub metric: Metric,
}

/// Options for the language model and embedding backend shared by all commands.
#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Language model provider
    #[arg(long, value_enum, default_value_t = Provider::Mistral)]
    pub provider: Provider,

    /// Override the provider's API base URL
    #[arg(long)]
    pub api_base: Option<String>,

    /// API key; defaults to the provider's own variable (MISTRAL_API_KEY or OPENAI_API_KEY)
    #[arg(long, env = "SIMSITES_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Override the provider's chat model
    #[arg(long)]
    pub chat_model: Option<String>,

    /// Override the provider's embedding model
    #[arg(long)]
    pub embedding_model: Option<String>,

    /// Embed on this machine instead of through the API
    #[arg(long, default_value_t = false)]
    pub local_embed: bool,

    /// Hugging Face model used with `--local-embed`
    #[arg(long, default_value = "sentence-transformers/all-MiniLM-L6-v2")]
    pub local_model: String,

    /// Lines per embedding request
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Timeout for each network request
    ///
    /// Some valid suffixes are:
    /// - Seconds: `s`, `sec`, or `seconds`
    /// - Minutes: `m`, `min`, or `minutes`
    #[arg(long, default_value = "30s")]
    pub timeout: String,
}

impl BackendArgs {
    pub fn timeout(&self) -> AppResult<Duration> {
        Ok(humantime::parse_duration(&self.timeout)?)
    }

    /// `--api-key`, then the provider's own environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().filter(|k| !k.is_empty()).or_else(|| {
            self.provider
                .api_key_env()
                .and_then(|var| std::env::var(var).ok())
                .filter(|k| !k.is_empty())
        })
    }
}

/// Helper trait for accessing verbosity flags on commands.
pub trait GetVerbosity {
    fn get_verbosity(&self) -> &Verbosity<InfoLevel>;
}

impl GetVerbosity for Cmd {
    fn get_verbosity(&self) -> &Verbosity<InfoLevel> {
        match self {
            Cmd::Keywords { verbosity, .. } => verbosity,
            Cmd::Check { verbosity, .. } => verbosity,
            Cmd::Completion { verbosity, .. } => verbosity,
        }
    }
}

impl Cmd {
    /// Execute the chosen top-level command.
    #[tracing::instrument(name = "Running command", level = "debug", skip(self))]
    pub async fn run(&self) -> AppResult<()> {
        match self {
            Cmd::Keywords {
                search,
                clustering,
                backend,
                output,
                ..
            } => run_keywords(search, clustering, backend, output.as_ref()).await,
            Cmd::Check {
                check,
                backend,
                output,
                ..
            } => run_check(check, backend, output.as_ref()).await,
            Cmd::Completion { shell, output, .. } => {
                let mut cmd = Cli::command();
                if let Some(output_path) = output {
                    let mut file = std::fs::OpenOptions::new()
                        .write(true)
                        .truncate(true)
                        .create(true)
                        .open(output_path)?;
                    generate(shell, &mut cmd, "simsites", &mut file);
                    info!(
                        "Generated completion script for {} at {}",
                        shell,
                        output_path.display()
                    );
                } else {
                    generate(shell, &mut cmd, "simsites", &mut std::io::stdout());
                }
                Ok(())
            }
        }
    }
}

fn search_provider(args: &SearchArgs, ctx: &Context) -> AppResult<Box<dyn SearchProvider>> {
    Ok(match args.engine {
        Engine::Ddg => Box::new(DuckDuckGo::new(ctx.http.clone())),
        Engine::Serpapi => {
            let key = args.serpapi_key.as_deref().ok_or_else(|| {
                AppError::InvalidArgument(
                    "--engine serpapi needs --serpapi-key or SERPAPI_KEY".to_string(),
                )
            })?;
            Box::new(
                SerpApi::new(ctx.http.clone(), key)
                    .with_location(args.location.clone())
                    .with_country(args.country.as_str())
                    .with_language(args.language.as_str()),
            )
        }
    })
}

#[tracing::instrument(name = "Finding keywords", level = "info", skip_all, fields(search = %search.search))]
async fn run_keywords(
    search: &SearchArgs,
    clustering: &ClusterArgs,
    backend: &BackendArgs,
    output: Option<&PathBuf>,
) -> AppResult<()> {
    let start = Instant::now();
    let ctx = Context::new(backend)?;
    let provider = search_provider(search, &ctx)?;

    indicatif_println!("Performing search: '{}'", search.search);
    let results = provider.search(&search.search, search.max_results).await?;
    let fetcher = HttpFetcher::new(ctx.http.clone(), ctx.timeout);
    let sources = fetch_sources(&fetcher, &results).await;
    indicatif_println!(
        "Clustering {} site(s) found for search '{}'",
        sources.len(),
        search.search
    );

    let engine = SiteClusterer::new(
        &ctx.embedder,
        CommunityDetection::new(clustering.min_cluster_size, clustering.threshold),
    );
    let keywords = match engine.cluster_sites(&sources).await? {
        ClusterOutcome::NoContent => Vec::new(),
        ClusterOutcome::Clustered(clustered) => {
            clustered.top_keywords(clustering.clusters, clustering.terms)
        }
    };
    indicatif_println!(
        "Here are the top {} most common sets of keywords (most common first):\n",
        keywords.len()
    );

    let recommendations = recommend_all(&ctx.llm, &search.search, &keywords).await;

    let report = KeywordReport {
        search: search.search.clone(),
        keywords,
        recommendations,
        runtime: start.elapsed(),
    };
    if let Some(path) = output {
        write_json_output(path, &report).await?;
        indicatif_println!("Results saved to '{}'", path.display());
    }
    indicatif_println!(
        "Total recommendation runtime {}",
        humantime::format_duration(Duration::from_millis(report.runtime.as_millis() as u64))
    );
    Ok(())
}

/// One recommendation per keyword set. A failed call is recorded as `None` and the
/// remaining sets are still asked.
#[tracing::instrument(name = "Asking for recommendations", level = "info", skip_all, fields(sets = keywords.len()))]
async fn recommend_all<M: ChatModel + ?Sized>(
    model: &M,
    search: &str,
    keywords: &[Vec<String>],
) -> Vec<Option<String>> {
    let span = Span::current();
    span.pb_set_message("Asking the LLM...");
    span.pb_set_finish_message("Recommendations complete");
    span.pb_set_length(keywords.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len}") {
        span.pb_set_style(&style);
    }

    let mut recommendations = Vec::with_capacity(keywords.len());
    for set in keywords {
        indicatif_println!("Keywords:\n{}\n", set.join(","));
        match make_seo_recommendations(model, search, set).await {
            Ok(answer) => {
                indicatif_println!("Recommendations from the LLM:\n{answer}");
                recommendations.push(Some(answer));
            }
            Err(e) => {
                warn!("No recommendation for this keyword set. {e}");
                recommendations.push(None);
            }
        }
        indicatif_println!("{}", "- - -".repeat(10));
        span.pb_inc(1);
    }
    recommendations
}

#[tracing::instrument(name = "Checking recommendation", level = "info", skip_all, fields(url = %check.url))]
async fn run_check(
    check: &CheckArgs,
    backend: &BackendArgs,
    output: Option<&PathBuf>,
) -> AppResult<()> {
    let start = Instant::now();
    let ctx = Context::new(backend)?;

    info!("Fetching {}...", check.url);
    let html = HttpFetcher::new(ctx.http.clone(), PAGE_TIMEOUT)
        .fetch(&check.url)
        .await?;
    let lines = strip_site(&html, true);
    if lines.is_empty() {
        warn!("{} has no visible text", check.url);
    }

    let mut store = VectorStore::with_metric(&ctx.embedder, check.metric);
    store.add(&lines).await?;
    let excerpts = store
        .query(&check.recommendation, check.k, check.distance_threshold)
        .await?;
    info!("Found {} relevant excerpts", excerpts.len());

    let verdict =
        check_seo_recommendation(&ctx.llm, &check.search, &check.recommendation, &excerpts)
            .await?;
    let report = CheckReport {
        search: check.search.clone(),
        recommendation: check.recommendation.clone(),
        most_relevant_site_contents: excerpts,
        recommendation_check_results: verdict,
        runtime: start.elapsed(),
    };
    indicatif_println!(
        "Total recommendation runtime {}\n",
        humantime::format_duration(Duration::from_millis(report.runtime.as_millis() as u64))
    );
    indicatif_println!("{}", report.recommendation_check_results);

    if let Some(path) = output {
        write_json_output(path, &report).await?;
        indicatif_println!("Results saved to '{}'", path.display());
    }
    Ok(())
}
