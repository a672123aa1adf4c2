use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use support_rag::commands::{append_rows, ask, build_index, chat, search_examples, verify_index};
use support_rag::config::{Config, get_config_dir, run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "support-rag")]
#[command(about = "Retrieval-augmented customer support assistant")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (default: ~/.support-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the service, retrieval and generation settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed the corpus and build the index
    Build {
        /// Replace an existing index file
        #[arg(long)]
        force: bool,
    },
    /// Append the rows of a CSV file to the corpus and the index
    Append {
        /// CSV file with the same query and response columns as the corpus
        csv: PathBuf,
    },
    /// Check that the corpus and the index line up
    Verify {
        /// Also re-embed this many rows and check each retrieves itself
        #[arg(long)]
        sample: Option<usize>,
    },
    /// Show the corpus examples closest to a query
    Search {
        query: String,
        /// Number of examples to retrieve
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Start an interactive support conversation
    Chat,
    /// Answer a single query
    Ask { query: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    if let Commands::Config { show } = cli.command {
        if show {
            show_config(&Config::load(&config_dir)?)?;
        } else {
            run_interactive_config(&config_dir)?;
        }
        return Ok(());
    }

    let config = Config::load(&config_dir)?;
    match cli.command {
        Commands::Config { .. } => {}
        Commands::Build { force } => build_index(&config, force)?,
        Commands::Append { csv } => append_rows(&config, &csv)?,
        Commands::Verify { sample } => verify_index(&config, sample)?,
        Commands::Search { query, k } => search_examples(&config, &query, k)?,
        Commands::Chat => chat(&config)?,
        Commands::Ask { query } => ask(&config, &query)?,
    }

    Ok(())
}
