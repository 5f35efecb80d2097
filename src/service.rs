//! The document-chat service behind both the HTTP API and the CLI.
//!
//! [`DocChat`] owns the data layout, the stores, the providers, and one
//! cached [`ConversationalChain`] per activated collection. A chain's
//! conversation buffer lives as long as the cache entry: re-activating,
//! deleting or restarting the process starts a fresh buffer, while the
//! persisted chat history is kept until cleared.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::chain::ConversationalChain;
use crate::chat_history::{ChatHistoryStore, ChatTurn, Role};
use crate::chunk::TextSplitter;
use crate::collection::{CollectionManager, DeleteError, DeletionReport};
use crate::config::{validate, Config};
use crate::embedding::{create_embedder, Embedder};
use crate::extract::{self, ExtractError};
use crate::file_store::{saved_name_for, typed_filename, FileStore};
use crate::index::{build_index, load_index_if_exists};
use crate::layout::{validate_saved_name, DataLayout};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::FileType;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Delete(#[from] DeleteError),
    /// The embedding or chat provider failed.
    #[error("{0:#}")]
    Upstream(anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Storage and I/O failures are ours; anything else out of the pipeline
/// came from a provider.
fn classify(err: anyhow::Error) -> ServiceError {
    if err.downcast_ref::<sqlx::Error>().is_some() || err.downcast_ref::<std::io::Error>().is_some()
    {
        ServiceError::Internal(err)
    } else {
        ServiceError::Upstream(err)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub mode: &'static str,
    pub answer: String,
}

type SharedChain = Arc<Mutex<ConversationalChain>>;

pub struct DocChat {
    config: Config,
    files: FileStore,
    history: ChatHistoryStore,
    collections: CollectionManager,
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn ChatModel>,
    http: reqwest::Client,
    chains: Mutex<HashMap<String, SharedChain>>,
}

impl DocChat {
    /// Validates `config`, initialises the data layout under
    /// `config.data.root` and wires the given providers.
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
    ) -> anyhow::Result<Self> {
        validate(&config)?;
        let layout = DataLayout::new(&config.data.root);
        layout.init()?;

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.embedding.timeout_secs))
            .build()?;

        Ok(Self {
            files: FileStore::new(layout.clone()),
            history: ChatHistoryStore::new(layout.clone()),
            collections: CollectionManager::new(layout),
            splitter: TextSplitter::from_config(&config.chunking),
            embedder,
            model,
            http,
            chains: Mutex::new(HashMap::new()),
            config,
        })
    }

    /// Builds the providers named in `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let model = create_chat_model(&config.llm)?;
        tracing::info!(
            embedding = embedder.model_name(),
            llm = model.model_name(),
            "providers ready"
        );
        Self::new(config, embedder, model)
    }

    /// Stores an upload and returns its `saved_name`.
    ///
    /// When `filename` has no recognised extension, the declared type's
    /// extension is appended so the type can be recovered from the name.
    pub fn upload(
        &self,
        filename: &str,
        bytes: &[u8],
        file_type: Option<FileType>,
    ) -> ServiceResult<String> {
        if bytes.is_empty() {
            return Err(ServiceError::BadRequest("uploaded file is empty".to_string()));
        }

        let name = typed_filename(filename, file_type).ok_or_else(|| {
            ServiceError::BadRequest(format!(
                "cannot determine the type of '{}'; pass file_type",
                filename
            ))
        })?;

        let saved_name = saved_name_for(&name, bytes);
        validate_saved_name(&saved_name).map_err(|e| ServiceError::BadRequest(e.to_string()))?;
        Ok(self.files.save(&name, bytes)?)
    }

    pub fn collections(&self) -> ServiceResult<Vec<String>> {
        Ok(self.files.list()?)
    }

    fn check_collection(&self, saved_name: &str) -> ServiceResult<()> {
        validate_saved_name(saved_name).map_err(|e| ServiceError::BadRequest(e.to_string()))?;
        if !self.files.exists(saved_name) {
            return Err(ServiceError::NotFound(format!(
                "collection '{}' not found",
                saved_name
            )));
        }
        Ok(())
    }

    /// Loads or builds the collection's index and caches a chain with a
    /// fresh conversation buffer, replacing any earlier one.
    pub async fn activate(&self, saved_name: &str) -> ServiceResult<()> {
        self.check_collection(saved_name)?;
        let chain = self.build_chain(saved_name).await?;
        self.chains
            .lock()
            .await
            .insert(saved_name.to_string(), Arc::new(Mutex::new(chain)));
        tracing::info!(saved_name, "collection activated");
        Ok(())
    }

    async fn build_chain(&self, saved_name: &str) -> ServiceResult<ConversationalChain> {
        let dir = self.collections.vectorstore_dir_for(saved_name);
        let batch_size = self.config.embedding.batch_size;

        let index = match load_index_if_exists(&dir, self.embedder.clone(), batch_size).await? {
            Some(index) => index,
            None => {
                let file_type = FileType::from_name(saved_name).ok_or_else(|| {
                    ServiceError::BadRequest(format!(
                        "cannot determine the type of '{}' from its extension",
                        saved_name
                    ))
                })?;
                let bytes = self.files.read(saved_name)?;
                let documents =
                    extract::load_documents(&bytes, file_type, saved_name, &self.http).await?;
                build_index(
                    &documents,
                    &dir,
                    self.embedder.clone(),
                    &self.splitter,
                    batch_size,
                )
                .await
                .map_err(classify)?
            }
        };

        Ok(ConversationalChain::new(
            Arc::new(index),
            self.model.clone(),
            self.config.retrieval.k,
        ))
    }

    async fn chain_for(&self, saved_name: &str) -> ServiceResult<SharedChain> {
        if let Some(chain) = self.chains.lock().await.get(saved_name) {
            return Ok(chain.clone());
        }
        self.activate(saved_name).await?;
        self.chains
            .lock()
            .await
            .get(saved_name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("collection '{}' not found", saved_name)))
    }

    /// Answers `question` against the collection, activating it first if
    /// needed. Both turns are persisted only after the model answered.
    pub async fn ask(&self, saved_name: &str, question: &str) -> ServiceResult<AskResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::BadRequest("question is empty".to_string()));
        }
        self.check_collection(saved_name)?;

        let chain = self.chain_for(saved_name).await?;
        let answer = chain.lock().await.ask(question).await.map_err(classify)?;

        self.history.append_turns(
            saved_name,
            &[
                ChatTurn::new(Role::User, question),
                ChatTurn::new(Role::Assistant, answer.answer.as_str()),
            ],
        )?;
        tracing::info!(
            saved_name,
            sources = answer.sources.len(),
            "answered question"
        );

        Ok(AskResponse {
            mode: "rag",
            answer: answer.answer,
        })
    }

    /// Empties the persisted history and the cached chain's buffer.
    pub async fn clear_chat(&self, saved_name: &str) -> ServiceResult<()> {
        self.check_collection(saved_name)?;
        self.history.clear(saved_name)?;

        let cached = self.chains.lock().await.get(saved_name).cloned();
        if let Some(chain) = cached {
            chain.lock().await.reset_memory();
        }
        Ok(())
    }

    pub fn chat(&self, saved_name: &str) -> ServiceResult<Vec<ChatTurn>> {
        validate_saved_name(saved_name).map_err(|e| ServiceError::BadRequest(e.to_string()))?;
        Ok(self.history.load(saved_name)?)
    }

    /// Drops the cached chain, then removes the collection's resources.
    pub async fn delete(&self, saved_name: &str) -> ServiceResult<DeletionReport> {
        let evicted = self.chains.lock().await.remove(saved_name);
        if let Some(chain) = evicted {
            chain.lock().await.index().close().await;
        }
        Ok(self.collections.delete(saved_name)?)
    }

    pub async fn is_active(&self, saved_name: &str) -> bool {
        self.chains.lock().await.contains_key(saved_name)
    }
}
