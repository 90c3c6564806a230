use cardio_rag::Result;
use cardio_rag::commands::{ingest, serve};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cardio-rag")]
#[command(about = "Document-grounded cardiology question answering over HTTP")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chatbot HTTP API
    Serve {
        /// Address to listen on, e.g. 127.0.0.1:8000
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Ingest a document without starting the server
    Ingest {
        /// Path of the .md, .pdf or .txt document to ingest
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            serve(bind).await?;
        }
        Commands::Ingest { file } => {
            ingest(&file).await?;
        }
    }

    Ok(())
}
