//! # docchat
//!
//! Chat with your documents. Each uploaded file becomes a *collection*
//! keyed by its `saved_name`: the stored file, a vector index built from
//! its text, and a persisted chat history. Questions are answered by a
//! conversational retrieval chain over the collection's index.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────┐
//! │ File store │──▶│ Extract +    │──▶│ Vector index  │
//! │ (uploads)  │   │ chunk+embed  │   │ (SQLite/coll.)│
//! └────────────┘   └──────────────┘   └──────┬────────┘
//!                                            │ top-k
//!                  ┌──────────────┐   ┌──────▼────────┐
//!                  │ Chat history │◀──│ Conversational│──▶ LLM
//!                  │ (markdown)   │   │ chain         │
//!                  └──────────────┘   └──────┬────────┘
//!                                  ┌─────────┴─────────┐
//!                                  ▼                   ▼
//!                             ┌─────────┐        ┌──────────┐
//!                             │   CLI   │        │   HTTP   │
//!                             └─────────┘        └──────────┘
//! ```
//!
//! ## Data layout
//!
//! ```text
//! <root>/uploaded_files/<saved_name>
//! <root>/vectorstores/<saved_name>/index.sqlite
//! <root>/chat_history/<saved_name>.md
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`layout`] | Data directory layout and initialisation |
//! | [`file_store`] | Content-addressed upload storage |
//! | [`chat_history`] | Per-collection chat history |
//! | [`collection`] | Collection deletion with staging |
//! | [`extract`] | PDF/DOCX/TXT/CSV/URL text extraction |
//! | [`chunk`] | Recursive text splitting |
//! | [`embedding`] | Embedding providers |
//! | [`index`] | Per-collection vector index |
//! | [`llm`] | Chat-model providers |
//! | [`chain`] | Conversational retrieval chain |
//! | [`service`] | The service behind CLI and HTTP |
//! | [`server`] | HTTP API |

pub mod chain;
pub mod chat_history;
pub mod chunk;
pub mod collection;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod file_store;
pub mod index;
pub mod layout;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod prompt;
mod retry;
pub mod server;
pub mod service;

#[cfg(test)]
mod testing;
