use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::ToolOptions;
use crate::model::{Language, ProviderId, RequestError, SearchMode, SearchRequest};
use crate::output::{OutputError, write_document};
use crate::report::{OutputFormat, render};
use crate::search::engine::{DEFAULT_UNIT_TIMEOUT, DispatchOptions, dispatch_with_cancel};
use crate::transport::HttpTransport;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fan a research query out to several AI web-search providers and merge the answers
/// into one cross-validation report.
#[derive(Debug, Parser)]
#[command(name = "polysearch", version, about)]
pub struct Cli {
    /// Topic or question to research.
    pub query: String,

    /// Research style sent to every provider.
    #[arg(long, value_enum, default_value_t)]
    pub mode: SearchMode,

    /// Which language's sources to favour.
    #[arg(long, value_enum, default_value_t)]
    pub lang: Language,

    /// Comma-separated providers to query.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = ProviderId::ALL)]
    pub providers: Vec<ProviderId>,

    /// Write the report here instead of stdout. Parent directories are created.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Emit the full report as JSON, including each provider's raw response.
    #[arg(long)]
    pub raw: bool,

    /// Display name of the primary search language.
    #[arg(long, default_value = "Korean")]
    pub primary_language: String,

    /// Per-provider deadline in seconds.
    #[arg(long, default_value_t = DEFAULT_UNIT_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Upper bound on searches per provider, where supported.
    #[arg(long, default_value_t = 5)]
    pub max_searches: u32,

    /// Restrict searches to these domains (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub domains: Vec<String>,

    /// Exclude these domains (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub block_domains: Vec<String>,

    /// Let providers that support it fetch full pages.
    #[arg(long)]
    pub fetch: bool,

    /// Enable provider-side dynamic result filtering.
    #[arg(long)]
    pub dynamic: bool,

    /// ISO country code used as approximate user location.
    #[arg(long)]
    pub country: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl Cli {
    pub fn search_request(&self) -> Result<SearchRequest, RequestError> {
        SearchRequest::new(
            &self.query,
            self.mode,
            self.lang,
            self.providers.iter().copied(),
        )
    }

    pub fn tool_options(&self) -> ToolOptions {
        ToolOptions {
            primary_language: self.primary_language.clone(),
            max_searches: self.max_searches,
            allowed_domains: self.domains.clone(),
            blocked_domains: self.block_domains.clone(),
            enable_fetch: self.fetch,
            dynamic_filtering: self.dynamic,
            country: self.country.clone(),
        }
    }

    /// Raw provider responses are only kept when they will be written out.
    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            unit_timeout: Duration::from_secs(self.timeout),
            keep_raw: self.raw,
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        if self.raw {
            OutputFormat::Structured
        } else {
            OutputFormat::Markdown
        }
    }
}

pub async fn run(cli: Cli) -> Result<(), CliError> {
    let request = cli.search_request()?;
    let http = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
    let transport = HttpTransport::from_env(http, &cli.tool_options());

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received Ctrl+C, cancelling outstanding providers");
            let _ = cancel_tx.send(true);
        }
    });

    info!(
        query = request.query(),
        mode = %request.mode(),
        providers = ?request.providers(),
        "starting search"
    );

    let report =
        dispatch_with_cancel(&transport, &request, cli.dispatch_options(), cancel_rx).await;

    let document = render(&report, cli.output_format()).map_err(OutputError::from)?;
    write_document(cli.output.as_deref(), &document)?;
    Ok(())
}
