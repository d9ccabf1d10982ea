//! bridgemcp
//!
//! - `serve`: emulate the generated server described by a source file, over
//!   stdio (default) or HTTP
//! - `inspect`: print the registry recovered from a source file

use {
    anyhow::{Context, Result},
    bridgemcp::{
        logging, CallDispatcher, Dispatch, DispatcherConfig, ProtocolServer, Registry,
        SourceIntrospector,
    },
    clap::{Args, Parser, Subcommand},
    std::{
        path::{Path, PathBuf},
        sync::Arc,
        time::Duration,
    },
};

#[derive(Parser)]
#[command(name = "bridgemcp", version, about = "Execution and protocol bridge for generated MCP servers")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host the protocol server for a generated source file
    Serve(ServeArgs),
    /// Print the registry recovered from a generated source file as JSON
    Inspect(InspectArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Generated server source (Python or TypeScript)
    #[arg(long, env = "BRIDGEMCP_SOURCE")]
    source: PathBuf,

    /// Target API base URL, overriding the one found in the source
    #[arg(long, env = "BRIDGEMCP_API_BASE_URL")]
    api_base_url: Option<String>,

    /// Serve HTTP on this port instead of stdio
    #[arg(long, env = "BRIDGEMCP_HTTP_PORT")]
    http_port: Option<u16>,

    /// Per-call timeout for outbound API requests
    #[arg(long, env = "BRIDGEMCP_DISPATCH_TIMEOUT_SECS", default_value_t = 30)]
    dispatch_timeout_secs: u64,
}

#[derive(Args)]
struct InspectArgs {
    #[arg(long)]
    source: PathBuf,

    #[arg(long)]
    api_base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    match Cli::parse().command {
        Commands::Serve(args) => serve(args).await,
        Commands::Inspect(args) => inspect(args).await,
    }
}

async fn load_registry(source: &Path, api_base_url: Option<String>) -> Result<Registry> {
    let text = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("Failed to read source file {}", source.display()))?;
    let registry = SourceIntrospector::parse(&text);
    Ok(match api_base_url {
        Some(url) => registry.with_api_base_url(url.trim_end_matches('/')),
        None => registry,
    })
}

async fn serve(args: ServeArgs) -> Result<()> {
    let registry = Arc::new(load_registry(&args.source, args.api_base_url).await?);

    let config = DispatcherConfig {
        timeout: Duration::from_secs(args.dispatch_timeout_secs),
        ..DispatcherConfig::default()
    };
    let dispatcher: Arc<dyn Dispatch> =
        Arc::new(CallDispatcher::new(config).context("Failed to create HTTP client")?);
    let server = Arc::new(ProtocolServer::new(registry, dispatcher));

    match args.http_port {
        Some(port) => bridgemcp::http::serve_http(server, port).await,
        None => bridgemcp::stdio::serve_stdio(server).await,
    }
}

async fn inspect(args: InspectArgs) -> Result<()> {
    let registry = load_registry(&args.source, args.api_base_url).await?;
    println!("{}", serde_json::to_string_pretty(&registry)?);
    Ok(())
}
