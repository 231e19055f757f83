use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_ingestor_mcp::config::{
    default_config_path, load_config, write_default_config, Config, ENV_PREFIX,
};
use doc_ingestor_mcp::docs::DocFetcher;
use doc_ingestor_mcp::mcp::build_server;
use doc_ingestor_mcp::transport::{shutdown_signal, StdioTransport, StreamableHttpService};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Doc Ingestor MCP - Scrape library documentation and store code snippets for retrieval
#[derive(Parser, Debug)]
#[command(name = "doc-ingestor-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MCP server for scraping library documentation and storing code snippets", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show all environment variables
    #[arg(long, global = true)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server (streamable HTTP by default)
    Serve {
        /// Run in stdio mode (for MCP clients that spawn the server)
        #[arg(long, conflicts_with = "http")]
        stdio: bool,

        /// Run in streamable HTTP mode
        #[arg(long)]
        http: bool,

        /// Port for HTTP mode (overrides config)
        #[arg(long, short)]
        port: Option<u16>,

        /// Host to bind to for HTTP mode (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// List documentation links found on a page
    Urls {
        /// Documentation page URL
        url: String,
    },

    /// Extract headers and text content from a page
    Extract {
        /// Page URL
        url: String,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a configuration file with the default settings
    Init {
        /// Where to write (default: user config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

fn print_env_vars() {
    println!("Doc Ingestor MCP - Environment Variables");
    println!();
    println!("API Keys:");
    println!("  OPENAI_API_KEY              API key for the embeddings service");
    println!();
    println!("Server Settings:");
    println!("  {}_SERVER__HOST              Bind address (default: 127.0.0.1)", ENV_PREFIX);
    println!("  {}_SERVER__PORT              Bind port (default: 3001)", ENV_PREFIX);
    println!("  {}_SERVER__PATH              Endpoint path (default: /mcp)", ENV_PREFIX);
    println!("  {}_SERVER__KEEP_ALIVE_SECS   SSE keep-alive interval (default: 15)", ENV_PREFIX);
    println!("  {}_SERVER__HISTORY_CAPACITY  Events kept per session for resumption (default: 1024)", ENV_PREFIX);
    println!();
    println!("Scraper Settings:");
    println!("  {}_SCRAPER__USER_AGENT       User agent for page fetches", ENV_PREFIX);
    println!("  {}_SCRAPER__TIMEOUT_SECS     Request timeout (default: 30)", ENV_PREFIX);
    println!();
    println!("Embeddings and Vector Store:");
    println!("  {}_EMBEDDINGS__API_BASE      OpenAI-compatible API base URL", ENV_PREFIX);
    println!("  {}_EMBEDDINGS__MODEL         Embedding model (default: text-embedding-3-small)", ENV_PREFIX);
    println!("  {}_VECTOR_STORE__URL         Chroma URL (default: http://localhost:8000)", ENV_PREFIX);
    println!("  {}_VECTOR_STORE__COLLECTION  Snippet collection (default: snippet)", ENV_PREFIX);
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                    Rust logging level (e.g., debug, info, warn, error)");
    std::process::exit(0);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Show environment variables and exit if requested
    if cli.env {
        print_env_vars();
    }

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = if cli.quiet { "error" } else { log_level };

    // stdout carries protocol traffic in stdio mode, so logs go to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("doc_ingestor_mcp={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Some(Commands::Serve {
            stdio,
            http: _,
            port,
            host,
        }) => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }

            if stdio {
                serve_stdio(&config).await?;
            } else {
                serve_http(&config).await?;
            }
        }

        None => serve_http(&config).await?,

        Some(Commands::Urls { url }) => {
            let url = Url::parse(&url).with_context(|| format!("Invalid URL: {}", url))?;
            let fetcher = DocFetcher::from_config(&config.scraper)?;
            let urls = fetcher.get_all_doc_urls(&url).await;
            if !cli.quiet {
                eprintln!("Found {} documentation links", urls.len());
            }
            println!("{}", serde_json::to_string_pretty(&urls)?);
        }

        Some(Commands::Extract { url }) => {
            let url = Url::parse(&url).with_context(|| format!("Invalid URL: {}", url))?;
            let fetcher = DocFetcher::from_config(&config.scraper)?;
            let document = fetcher
                .extract_content(&url)
                .await
                .with_context(|| format!("Failed to fetch {}", url))?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }

        Some(Commands::Config { action }) => match action {
            ConfigAction::Init { path, force } => {
                let path = path
                    .or_else(default_config_path)
                    .context("Could not determine a config directory; pass a path")?;
                write_default_config(&path, force)?;
                println!("Wrote default configuration to {}", path.display());
            }
            ConfigAction::Show => {
                let mut shown: Config = config.clone();
                if shown.embeddings.api_key.is_some() {
                    shown.embeddings.api_key = Some("<redacted>".to_string());
                }
                print!("{}", toml::to_string_pretty(&shown)?);
            }
        },
    }

    Ok(())
}

async fn serve_http(config: &Config) -> Result<()> {
    let server = Arc::new(build_server(config)?);
    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let service = StreamableHttpService::new(server, config.server.http_transport());
    let report = service.serve(listener, shutdown_signal()).await?;
    if report.failed > 0 {
        tracing::warn!("{} sessions failed to close cleanly", report.failed);
    }
    Ok(())
}

async fn serve_stdio(config: &Config) -> Result<()> {
    tracing::info!("Running MCP server in stdio mode");
    let server = Arc::new(build_server(config)?);
    StdioTransport::new(server)
        .with_history_capacity(config.server.history_capacity)
        .run()
        .await?;
    Ok(())
}
