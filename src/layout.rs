//! On-disk layout of the data root.
//!
//! ```text
//! <root>/
//!   uploaded_files/<saved_name>          raw uploads
//!   vectorstores/<saved_name>/           per-collection vector index
//!   chat_history/<saved_name>.md         persisted conversation
//!   .trash/<uuid>/                       resources staged for deletion
//! ```
//!
//! Path derivation is pure. Directories are only created by
//! [`DataLayout::init`], which the hosting process calls once at startup.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

pub const UPLOAD_DIR: &str = "uploaded_files";
pub const VECTORS_DIR: &str = "vectorstores";
pub const CHAT_DIR: &str = "chat_history";
pub const TRASH_DIR: &str = ".trash";

#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.root.join(UPLOAD_DIR)
    }

    pub fn vectors_root(&self) -> PathBuf {
        self.root.join(VECTORS_DIR)
    }

    pub fn chat_root(&self) -> PathBuf {
        self.root.join(CHAT_DIR)
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.root.join(TRASH_DIR)
    }

    /// Creates the data directories if absent and sweeps anything left in
    /// the trash by an interrupted deletion. Idempotent.
    pub fn init(&self) -> Result<()> {
        for dir in [
            self.upload_dir(),
            self.vectors_root(),
            self.chat_root(),
            self.trash_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        self.sweep_trash();
        Ok(())
    }

    fn sweep_trash(&self) {
        let entries = match std::fs::read_dir(self.trash_dir()) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => tracing::info!(path = %path.display(), "swept staged deletion"),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to sweep trash")
                }
            }
        }
    }

    pub fn collection_path(&self, saved_name: &str) -> PathBuf {
        self.upload_dir().join(saved_name)
    }

    pub fn vectorstore_dir_for(&self, saved_name: &str) -> PathBuf {
        self.vectors_root().join(saved_name)
    }

    pub fn chat_file_for(&self, saved_name: &str) -> PathBuf {
        let safe = saved_name.replace('/', "_");
        self.chat_root().join(format!("{}.md", safe))
    }
}

/// Rejects names that would escape their directory when joined onto a root.
pub fn validate_saved_name(saved_name: &str) -> Result<()> {
    if saved_name.is_empty() || saved_name == "." || saved_name == ".." {
        bail!("invalid collection name: '{}'", saved_name);
    }
    if saved_name.contains('/') || saved_name.contains('\\') || saved_name.contains('\0') {
        bail!("invalid collection name: '{}'", saved_name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn derived_paths_are_pure() {
        let layout = DataLayout::new("/srv/data");
        assert_eq!(
            layout.collection_path("a_12345.pdf"),
            PathBuf::from("/srv/data/uploaded_files/a_12345.pdf")
        );
        assert_eq!(
            layout.vectorstore_dir_for("a_12345.pdf"),
            PathBuf::from("/srv/data/vectorstores/a_12345.pdf")
        );
        assert_eq!(
            layout.chat_file_for("a_12345.pdf"),
            PathBuf::from("/srv/data/chat_history/a_12345.pdf.md")
        );
    }

    #[test]
    fn chat_file_flattens_slashes() {
        let layout = DataLayout::new("d");
        assert_eq!(
            layout.chat_file_for("x/y.txt"),
            PathBuf::from("d/chat_history/x_y.txt.md")
        );
    }

    #[test]
    fn init_is_idempotent_and_sweeps_trash() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path().join("data"));
        layout.init().unwrap();

        let leftover = layout.trash_dir().join("stale");
        std::fs::create_dir_all(&leftover).unwrap();
        std::fs::write(leftover.join("file.pdf"), b"x").unwrap();

        layout.init().unwrap();
        assert!(layout.upload_dir().is_dir());
        assert!(layout.vectors_root().is_dir());
        assert!(layout.chat_root().is_dir());
        assert!(!leftover.exists());
    }

    #[test]
    fn rejects_traversal_names() {
        assert!(validate_saved_name("..").is_err());
        assert!(validate_saved_name("").is_err());
        assert!(validate_saved_name("a/../b").is_err());
        assert!(validate_saved_name("report_5d414.pdf").is_ok());
    }
}
