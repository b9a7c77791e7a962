use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{error, info};

use mentor_chat::chat::{self, ChatSession};
use mentor_chat::config;
use mentor_chat::constants;
use mentor_chat::llm_interaction::{CompletionGateway, OpenAiCompletionService};
use mentor_chat::persona;
use mentor_chat::pricing::{format_cost, PricingModel};
use mentor_chat::session::SessionRegistry;
use mentor_chat::web_server::{self, AppState};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Serve the chat web UI.
    Serve {
        #[arg(long, default_value = "127.0.0.1", help = "Address to bind the web server to.")]
        host: IpAddr,
        #[arg(long, default_value_t = 8501, help = "Port for the web server.")]
        port: u16,
    },
    /// Chat with the mentor in the terminal.
    Chat,
    /// Print the approximate cost of a reply from its token counts.
    Estimate {
        /// Prompt (input) tokens.
        input_tokens: u64,
        /// Completion (output) tokens.
        output_tokens: u64,
    },
}

/// Fails before anything is served when no API key can be found.
fn build_gateway() -> Result<CompletionGateway> {
    let api_key = config::load_api_key()?;
    let service = OpenAiCompletionService::from_env(api_key.expose());
    Ok(CompletionGateway::new(Arc::new(service), persona::PERSONA))
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,mentor_chat=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("mentor-chat starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Serve { host, port } => {
            let gateway = build_gateway()?;
            let registry = SessionRegistry::new(
                gateway,
                Duration::from_secs(*constants::SESSION_IDLE_SECS),
            );
            let state = AppState::from_env(registry);
            let addr = SocketAddr::new(host, port);

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(addr, state).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            // Pin the ctrl_c future to the stack so its address is stable
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat => {
            let mut session = ChatSession::new(build_gateway()?);
            chat::run_terminal_chat(
                &mut session,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
            )
            .await
            .context("Chat session failed")?;
        }
        Commands::Estimate {
            input_tokens,
            output_tokens,
        } => {
            let cost = PricingModel::from_env().estimate_cost(input_tokens, output_tokens);
            println!("{}", format_cost(cost));
        }
    }

    Ok(())
}
