use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use elara_agents::ChatTurn;
use elara_config::ConfigLoader;
use elara_gateway::GatewayServer;
use elara_gateway::state::{AppState, Credentials};
use elara_security::RedactingWriter;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "elara", version, about = "Elara AI - search-augmented chat backend")]
struct Cli {
    /// Path to a YAML or TOML configuration file.
    #[arg(short, long, global = true, env = "ELARA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Ask a single question and print the answer.
    Ask {
        /// Allow a live web search when the question needs one.
        #[arg(short, long)]
        search: bool,
        /// Preferred model, tried before the configured list.
        #[arg(short, long)]
        model: Option<String>,
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let mut config =
        ConfigLoader::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            info!("starting Elara v{}", env!("CARGO_PKG_VERSION"));
            GatewayServer::new(config)
                .run()
                .await
                .context("gateway exited with an error")?;
        }
        Commands::Ask {
            search,
            model,
            text,
        } => {
            let question = text.join(" ");
            if question.trim().is_empty() {
                anyhow::bail!("no question provided");
            }
            let state = AppState::new(config);
            let runtime = state.runtime_for(Credentials::default(), search)?;
            let reply = runtime
                .process_message(
                    ChatTurn::new(question.trim())
                        .with_search(search)
                        .with_model(model.as_deref()),
                )
                .await;
            println!("{}", reply.reply);
            for source in &reply.sources {
                println!("  source: {}", source.source_url);
            }
            if !reply.completed {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}

/// `RUST_LOG` overrides the default `info` filter; `ELARA_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(RedactingWriter::stderr());

    if std::env::var("ELARA_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}
