//! # docchat CLI
//!
//! ```bash
//! docchat --config ./config/docchat.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docchat init` | Create the data directories |
//! | `docchat upload <path>` | Store a document and print its `saved_name` |
//! | `docchat collections` | List stored collections |
//! | `docchat ask <saved_name> "<question>"` | Ask one question against a collection |
//! | `docchat history <saved_name>` | Print the persisted chat history |
//! | `docchat clear <saved_name>` | Empty the chat history |
//! | `docchat delete <saved_name>` | Remove file, vector index and chat history |
//! | `docchat serve` | Start the HTTP API |
//!
//! A `.env` file in the working directory is loaded first, so
//! `GOOGLE_API_KEY` can live there.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docchat::{commands, config, logging, server};

/// docchat: chat with your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means defaults.
#[derive(Parser)]
#[command(
    name = "docchat",
    about = "Chat with your documents: upload, index, and ask questions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directories. Idempotent; also sweeps leftovers of
    /// interrupted deletions.
    Init,

    /// Store a document and print its saved name.
    Upload {
        /// File to upload (pdf, docx, txt, csv, or a .url file holding a link).
        path: PathBuf,

        /// Declared type, used when the file name has no known extension.
        #[arg(long)]
        file_type: Option<String>,
    },

    /// List stored collections.
    Collections,

    /// Ask a question against a collection, building its index if needed.
    ///
    /// Each invocation starts a fresh conversation buffer; the turn is
    /// still appended to the persisted chat history.
    Ask {
        saved_name: String,
        question: String,
    },

    /// Print the persisted chat history of a collection.
    History { saved_name: String },

    /// Empty the chat history of a collection.
    Clear { saved_name: String },

    /// Delete a collection: the stored file, its vector index and its chat
    /// history.
    Delete { saved_name: String },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg)?,
        Commands::Upload { path, file_type } => {
            commands::run_upload(&cfg, &path, file_type.as_deref())?
        }
        Commands::Collections => commands::run_collections(&cfg)?,
        Commands::Ask {
            saved_name,
            question,
        } => commands::run_ask(&cfg, &saved_name, &question).await?,
        Commands::History { saved_name } => commands::run_history(&cfg, &saved_name)?,
        Commands::Clear { saved_name } => commands::run_clear(&cfg, &saved_name)?,
        Commands::Delete { saved_name } => commands::run_delete(&cfg, &saved_name)?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
