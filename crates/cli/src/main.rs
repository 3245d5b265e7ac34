//! MathTutor CLI — the main entry point.
//!
//! Commands:
//! - `onboard`  — Write the default config
//! - `ask`      — Answer one question
//! - `repl`     — Interactive tutor session
//! - `plot`     — Plot a function in the terminal
//! - `ocr`      — Read a question from an image and answer it
//! - `listen`   — Take a spoken question and answer it
//! - `load`     — Load the language model and report progress
//! - `serve`    — Start the HTTP gateway and browser frontend
//! - `doctor`   — Diagnose the setup

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mathtutor",
    about = "MathTutor — algebra engine first, language model second",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Onboard,

    /// Answer a single question
    Ask {
        /// The question, e.g. "integral(x^2)" or "What is a prime number?"
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Read the answer aloud
        #[arg(long)]
        speak: bool,

        /// Load the model first so the AI fallback is available
        #[arg(long)]
        load: bool,
    },

    /// Interactive session (:load, :status, :test-ai, :quit)
    Repl,

    /// Plot a function of x over the configured domain
    Plot {
        #[arg(required = true, num_args = 1..)]
        expression: Vec<String>,
    },

    /// Recognize a question in an image and answer it
    Ocr {
        image: PathBuf,
    },

    /// Listen for a spoken question and answer it
    Listen,

    /// Load the language model and report progress
    Load,

    /// Start the HTTP gateway with the browser frontend
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Diagnose configuration and helper programs
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Ask {
            question,
            speak,
            load,
        } => commands::ask::run(question.join(" "), speak, load).await?,
        Commands::Repl => commands::repl::run().await?,
        Commands::Plot { expression } => commands::plot::run(expression.join(" ")).await?,
        Commands::Ocr { image } => commands::ocr::run(image).await?,
        Commands::Listen => commands::listen::run().await?,
        Commands::Load => commands::load::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
