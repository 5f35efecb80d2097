//! CLI command implementations.
//!
//! Commands that only touch the data directory (`init`, `upload`,
//! `collections`, `history`, `clear`, `delete`) work on the stores
//! directly and need no provider credentials. `ask` builds the full
//! service.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::chat_history::ChatHistoryStore;
use crate::collection::CollectionManager;
use crate::config::Config;
use crate::file_store::{typed_filename, FileStore};
use crate::layout::{validate_saved_name, DataLayout};
use crate::models::FileType;
use crate::service::DocChat;

fn layout(config: &Config) -> Result<DataLayout> {
    let layout = DataLayout::new(&config.data.root);
    layout.init()?;
    Ok(layout)
}

fn require_collection(files: &FileStore, saved_name: &str) -> Result<()> {
    validate_saved_name(saved_name)?;
    if !files.exists(saved_name) {
        bail!("collection '{}' not found", saved_name);
    }
    Ok(())
}

pub fn run_init(config: &Config) -> Result<()> {
    let layout = layout(config)?;
    println!("Data directory initialized at {}", layout.root().display());
    Ok(())
}

/// Stores the file at `path` and prints its `saved_name`.
pub fn run_upload(config: &Config, path: &Path, file_type: Option<&str>) -> Result<()> {
    let declared: Option<FileType> = file_type.map(str::parse).transpose()?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("not a file path: {}", path.display()))?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    if bytes.is_empty() {
        bail!("{} is empty", path.display());
    }
    let name = typed_filename(&filename, declared).with_context(|| {
        format!("cannot determine the type of '{}'; pass --file-type", filename)
    })?;

    let files = FileStore::new(layout(config)?);
    let saved_name = files.save(&name, &bytes)?;
    println!("{}", saved_name);
    Ok(())
}

pub fn run_collections(config: &Config) -> Result<()> {
    let files = FileStore::new(layout(config)?);
    let names = files.list()?;
    if names.is_empty() {
        println!("No collections.");
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

pub async fn run_ask(config: &Config, saved_name: &str, question: &str) -> Result<()> {
    let service = DocChat::from_config(config.clone())?;
    let response = service.ask(saved_name, question).await?;
    println!("{}", response.answer);
    Ok(())
}

pub fn run_history(config: &Config, saved_name: &str) -> Result<()> {
    validate_saved_name(saved_name)?;
    let history = ChatHistoryStore::new(layout(config)?);
    let turns = history.load(saved_name)?;
    if turns.is_empty() {
        println!("No chat history for {}.", saved_name);
    }
    for turn in turns {
        println!("{}: {}", turn.role.label(), turn.text);
    }
    Ok(())
}

pub fn run_clear(config: &Config, saved_name: &str) -> Result<()> {
    let layout = layout(config)?;
    require_collection(&FileStore::new(layout.clone()), saved_name)?;
    ChatHistoryStore::new(layout).clear(saved_name)?;
    println!("Cleared chat history for {}.", saved_name);
    Ok(())
}

pub fn run_delete(config: &Config, saved_name: &str) -> Result<()> {
    let manager = CollectionManager::new(layout(config)?);
    let report = manager.delete(saved_name)?;
    if report.is_noop() {
        println!("Nothing to delete for {}.", saved_name);
        return Ok(());
    }

    let mut removed = Vec::new();
    if report.file {
        removed.push("file");
    }
    if report.vectorstore {
        removed.push("vector store");
    }
    if report.chat_history {
        removed.push("chat history");
    }
    println!("Deleted {}: {}", saved_name, removed.join(", "));
    Ok(())
}
