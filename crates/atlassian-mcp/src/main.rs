//! Atlassian MCP server entry point.

use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use atlassian_mcp::audit::TracingAuditSink;
use atlassian_mcp::client::ClientFactory;
use atlassian_mcp::config::ServerConfig;
use atlassian_mcp::protocol::ProtocolHandler;
use atlassian_mcp::tools::default_registry;
use atlassian_mcp::transport::HttpTransport;
use atlassian_mcp::types::InitializeResult;

#[derive(Parser)]
#[command(
    name = "atlassian-mcp",
    about = "MCP server for Jira and Confluence with per-request credentials",
    version
)]
struct Cli {
    #[command(flatten)]
    config: ServerConfig,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default).
    Serve,

    /// Print the tool catalogue as JSON.
    Tools,

    /// Print server capabilities as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   atlassian-mcp completions bash > ~/.local/share/bash-completion/completions/atlassian-mcp
    ///   atlassian-mcp completions zsh > ~/.zfunc/_atlassian-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn build_handler(config: &ServerConfig) -> anyhow::Result<ProtocolHandler> {
    let clients = Arc::new(ClientFactory::new(&config.upstream())?);
    let registry = Arc::new(default_registry(clients));
    Ok(ProtocolHandler::with_audit(registry, Arc::new(TracingAuditSink)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let resolver = cli.config.credential_resolver()?;
            let upstream = cli.config.upstream();
            tracing::info!("Atlassian MCP server v{}", env!("CARGO_PKG_VERSION"));
            tracing::info!("Security mode: {}", resolver.mode());
            tracing::info!(
                "Jira: {}",
                upstream.jira_base_url.as_deref().unwrap_or("(not configured)")
            );
            tracing::info!(
                "Confluence: {}",
                upstream
                    .confluence_base_url
                    .as_deref()
                    .unwrap_or("(not configured)")
            );

            let handler = build_handler(&cli.config)?;
            tracing::info!("Registered {} tools", handler.registry().len());
            let transport = HttpTransport::new(handler, resolver);
            transport.run(&cli.config.addr).await?;
        }

        Commands::Tools => {
            let handler = build_handler(&cli.config)?;
            println!("{}", serde_json::to_string_pretty(&handler.catalogue())?);
        }

        Commands::Info => {
            let capabilities = InitializeResult::default_result();
            let handler = build_handler(&cli.config)?;
            let tools = handler.registry().all_metadata();
            let info = serde_json::json!({
                "server": capabilities.server_info,
                "protocol_version": capabilities.protocol_version,
                "capabilities": capabilities.capabilities,
                "security_mode": cli.config.security_mode.as_str(),
                "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": tools.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "atlassian-mcp", &mut std::io::stdout());
        }
    }

    Ok(())
}
