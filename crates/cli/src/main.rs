mod engine;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "arb-engine")]
#[command(about = "Cross-venue arbitrage engine for binary prediction markets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full engine: schedulers, reconciliation, and the web API
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Serve only the web API over existing state
    Server {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Smoke-run one opportunity through the execution path on paper venues
    Demo {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => engine::run(&config).await,
        Commands::Server { config } => engine::serve(&config).await,
        Commands::Demo { config } => engine::demo(&config).await,
    }
}
