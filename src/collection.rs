//! Collection lifecycle: the raw upload, its vector index directory, and
//! its chat history, all keyed by `saved_name`.
//!
//! Deletion runs in two phases. Every resource that exists is first moved
//! into a fresh `.trash/<uuid>/` directory; if any move fails, the ones
//! already moved are put back and nothing is lost. Only then is the
//! staging directory removed. A failure in that second phase leaves the
//! collection gone from the live tree and the leftovers in the trash,
//! where [`DataLayout::init`] sweeps them on the next start.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use uuid::Uuid;

use crate::layout::{validate_saved_name, DataLayout};

/// One of the three resources a collection owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    File,
    VectorStore,
    ChatHistory,
}

impl Resource {
    const ALL: [Resource; 3] = [Resource::File, Resource::VectorStore, Resource::ChatHistory];

    fn staged_name(&self) -> &'static str {
        match self {
            Resource::File => "file",
            Resource::VectorStore => "vectorstore",
            Resource::ChatHistory => "chat_history",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::File => "uploaded file",
            Resource::VectorStore => "vector store",
            Resource::ChatHistory => "chat history",
        })
    }
}

/// Which resources existed and were removed by a deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub file: bool,
    pub vectorstore: bool,
    pub chat_history: bool,
}

impl DeletionReport {
    fn mark(&mut self, resource: Resource) {
        match resource {
            Resource::File => self.file = true,
            Resource::VectorStore => self.vectorstore = true,
            Resource::ChatHistory => self.chat_history = true,
        }
    }

    /// True when nothing existed under that name.
    pub fn is_noop(&self) -> bool {
        !(self.file || self.vectorstore || self.chat_history)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error("invalid collection name: '{0}'")]
    InvalidName(String),

    #[error("failed to stage {resource} for deletion: {source}")]
    Staging {
        resource: Resource,
        /// False when putting already-staged resources back also failed;
        /// they are then left under `staged`.
        rolled_back: bool,
        staged: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("collection removed, but staged files remain in {}: {source}", staged.display())]
    Purge {
        report: DeletionReport,
        staged: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeleteError {
    /// Whether the collection is still fully present after this error.
    pub fn collection_intact(&self) -> bool {
        match self {
            DeleteError::InvalidName(_) => true,
            DeleteError::Staging { rolled_back, .. } => *rolled_back,
            DeleteError::Purge { .. } => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionManager {
    layout: DataLayout,
}

impl CollectionManager {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    pub fn path_for(&self, saved_name: &str) -> PathBuf {
        self.layout.collection_path(saved_name)
    }

    pub fn vectorstore_dir_for(&self, saved_name: &str) -> PathBuf {
        self.layout.vectorstore_dir_for(saved_name)
    }

    pub fn chat_file_for(&self, saved_name: &str) -> PathBuf {
        self.layout.chat_file_for(saved_name)
    }

    fn resource_path(&self, saved_name: &str, resource: Resource) -> PathBuf {
        match resource {
            Resource::File => self.path_for(saved_name),
            Resource::VectorStore => self.vectorstore_dir_for(saved_name),
            Resource::ChatHistory => self.chat_file_for(saved_name),
        }
    }

    /// Removes the upload, vector index and chat history of `saved_name`.
    ///
    /// Deleting a collection that does not exist succeeds with an empty
    /// report.
    pub fn delete(&self, saved_name: &str) -> Result<DeletionReport, DeleteError> {
        validate_saved_name(saved_name)
            .map_err(|_| DeleteError::InvalidName(saved_name.to_string()))?;

        let present: Vec<(Resource, PathBuf)> = Resource::ALL
            .iter()
            .map(|r| (*r, self.resource_path(saved_name, *r)))
            .filter(|(_, path)| path.exists())
            .collect();

        let mut report = DeletionReport::default();
        if present.is_empty() {
            tracing::debug!(saved_name, "delete: nothing to remove");
            return Ok(report);
        }

        let staged = self.layout.trash_dir().join(Uuid::new_v4().to_string());
        if let Err(source) = std::fs::create_dir_all(&staged) {
            return Err(DeleteError::Staging {
                resource: present[0].0,
                rolled_back: true,
                staged,
                source,
            });
        }

        let mut moved: Vec<(PathBuf, PathBuf)> = Vec::new();
        for (resource, path) in &present {
            let target = staged.join(resource.staged_name());
            match std::fs::rename(path, &target) {
                Ok(()) => {
                    moved.push((path.clone(), target));
                    report.mark(*resource);
                }
                Err(source) => {
                    let rolled_back = restore(&moved);
                    if rolled_back {
                        let _ = std::fs::remove_dir_all(&staged);
                    }
                    tracing::warn!(
                        saved_name,
                        %resource,
                        rolled_back,
                        error = %source,
                        "delete aborted while staging"
                    );
                    return Err(DeleteError::Staging {
                        resource: *resource,
                        rolled_back,
                        staged,
                        source,
                    });
                }
            }
        }

        if let Err(source) = std::fs::remove_dir_all(&staged) {
            tracing::warn!(
                saved_name,
                staged = %staged.display(),
                error = %source,
                "delete staged but purge failed"
            );
            return Err(DeleteError::Purge {
                report,
                staged,
                source,
            });
        }

        tracing::info!(
            saved_name,
            file = report.file,
            vectorstore = report.vectorstore,
            chat_history = report.chat_history,
            "collection deleted"
        );
        Ok(report)
    }
}

/// Moves staged resources back to their original paths, newest first.
fn restore(moved: &[(PathBuf, PathBuf)]) -> bool {
    let mut ok = true;
    for (original, staged) in moved.iter().rev() {
        if let Err(e) = std::fs::rename(staged, original) {
            tracing::error!(
                original = %original.display(),
                staged = %staged.display(),
                error = %e,
                "failed to restore staged resource"
            );
            ok = false;
        }
    }
    ok
}
