//! Content-addressed store for uploaded documents.
//!
//! An upload named `My Report.PDF` with content `hello` is stored as
//! `uploaded_files/my_report_5d414.pdf`: the cleaned base name, the first
//! five hex digits of the content's MD5, and the lowercased extension.
//! The resulting `saved_name` identifies the collection everywhere else.

use anyhow::{Context, Result};

use crate::layout::DataLayout;
use crate::models::FileType;

/// Number of MD5 hex digits appended to the cleaned name.
pub const SHORT_HASH_LEN: usize = 5;

/// Base used when nothing of the original base survives cleaning, so the
/// extension is not mistaken for a dotfile name.
pub const PLACEHOLDER_BASE: &str = "file";

/// Splits `name` into `(base, extension)` the way a path's final
/// component is usually split: the extension starts at the last `.` of the
/// final component, and a component made only of leading dots has none.
pub fn split_extension(name: &str) -> (&str, &str) {
    let file_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let file = &name[file_start..];
    match file.rfind('.') {
        Some(dot) if file[..dot].chars().any(|c| c != '.') => {
            let at = file_start + dot;
            (&name[..at], &name[at..])
        }
        _ => (name, ""),
    }
}

/// Lowercases the name, turns spaces into underscores and drops every
/// character of the base that is neither alphanumeric nor `_`. A base that
/// cleans to nothing in front of an extension becomes [`PLACEHOLDER_BASE`].
///
/// Idempotent: `clean_filename(&clean_filename(f)) == clean_filename(f)`.
pub fn clean_filename(filename: &str) -> String {
    let (base, ext) = split_extension(filename);
    let base: String = base
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if base.is_empty() && !ext.is_empty() {
        return format!("{}{}", PLACEHOLDER_BASE, ext.to_lowercase());
    }
    format!("{}{}", base, ext.to_lowercase())
}

pub fn md5_hex(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}

pub fn short_hash(content: &[u8]) -> String {
    let mut hex = md5_hex(content);
    hex.truncate(SHORT_HASH_LEN);
    hex
}

/// The name under which `content` uploaded as `filename` is stored.
pub fn saved_name_for(filename: &str, content: &[u8]) -> String {
    let clean = clean_filename(filename);
    let (base, ext) = split_extension(&clean);
    format!("{}_{}{}", base, short_hash(content), ext)
}

/// The name to store an upload under: `filename` itself when its
/// extension names a known type, otherwise `filename` plus the declared
/// type's extension. `None` when neither gives a type, or when the type
/// would not survive into the `saved_name`.
pub fn typed_filename(filename: &str, declared: Option<FileType>) -> Option<String> {
    let name = match (FileType::from_name(filename), declared) {
        (Some(inferred), Some(declared)) if inferred != declared => {
            tracing::debug!(filename, %inferred, %declared, "declared file type differs from extension");
            filename.to_string()
        }
        (Some(_), _) => filename.to_string(),
        (None, Some(declared)) => format!("{}{}", filename, declared.extension()),
        (None, None) => return None,
    };
    FileType::from_name(&clean_filename(&name)).map(|_| name)
}

#[derive(Debug, Clone)]
pub struct FileStore {
    layout: DataLayout,
}

impl FileStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Stores `content` and returns its `saved_name`.
    ///
    /// The write is skipped when the target already exists; the existing
    /// bytes are not compared, so a short-hash collision keeps the first
    /// upload.
    pub fn save(&self, filename: &str, content: &[u8]) -> Result<String> {
        let saved_name = saved_name_for(filename, content);
        let path = self.layout.collection_path(&saved_name);

        if path.exists() {
            tracing::debug!(saved_name = %saved_name, "upload already stored, skipping write");
            return Ok(saved_name);
        }

        std::fs::create_dir_all(self.layout.upload_dir())?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write upload: {}", path.display()))?;
        tracing::info!(saved_name = %saved_name, bytes = content.len(), "stored upload");

        Ok(saved_name)
    }

    /// All stored `saved_name`s, sorted lexicographically.
    pub fn list(&self) -> Result<Vec<String>> {
        let dir = self.layout.upload_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
        {
            let entry = entry?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, saved_name: &str) -> bool {
        self.layout.collection_path(saved_name).is_file()
    }

    pub fn read(&self, saved_name: &str) -> Result<Vec<u8>> {
        let path = self.layout.collection_path(saved_name);
        std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path().join("data"));
        layout.init().unwrap();
        (tmp, FileStore::new(layout))
    }

    #[test]
    fn clean_filename_examples() {
        assert_eq!(clean_filename("My Report.PDF"), "my_report.pdf");
        assert_eq!(clean_filename("  Q3 (final) v2!.docx"), "q3_final_v2.docx");
        assert_eq!(clean_filename("remote.url"), "remote.url");
        assert_eq!(clean_filename(".bashrc"), "bashrc");
        assert_eq!(clean_filename("archive.tar.gz"), "archivetar.gz");
    }

    #[test]
    fn clean_filename_is_idempotent() {
        let inputs = [
            "My Report.PDF",
            "...hidden",
            "..a.b",
            "dir/sub dir/Name With Spaces.TXT",
            "Ünïcödé Ñame.Csv",
            "İstanbul.txt",
            "no_extension",
            "",
            "a. PDF",
            "!.txt",
            "---.pdf",
            "...",
        ];
        for f in inputs {
            let once = clean_filename(f);
            assert_eq!(clean_filename(&once), once, "not idempotent for {:?}", f);
        }
    }

    #[test]
    fn empty_base_keeps_its_extension() {
        assert_eq!(clean_filename("!.txt"), "file.txt");
        assert_eq!(clean_filename("---.PDF"), "file.pdf");
        assert_eq!(saved_name_for("!.txt", b"hello"), "file_5d414.txt");
        assert_eq!(
            FileType::from_name(&saved_name_for("---.pdf", b"x")),
            Some(FileType::Pdf)
        );
        assert_eq!(clean_filename("!!!"), "");
    }

    #[test]
    fn split_extension_follows_final_component() {
        assert_eq!(split_extension("a.b/c"), ("a.b/c", ""));
        assert_eq!(split_extension("a/b.txt"), ("a/b", ".txt"));
        assert_eq!(split_extension("..."), ("...", ""));
    }

    #[test]
    fn saved_name_example() {
        assert_eq!(md5_hex(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(
            saved_name_for("My Report.PDF", b"hello"),
            "my_report_5d414.pdf"
        );
    }

    #[test]
    fn typed_filename_appends_declared_extension() {
        assert_eq!(typed_filename("report.pdf", None).as_deref(), Some("report.pdf"));
        assert_eq!(
            typed_filename("README", Some(FileType::Txt)).as_deref(),
            Some("README.txt")
        );
        assert_eq!(
            typed_filename("data.csv", Some(FileType::Pdf)).as_deref(),
            Some("data.csv")
        );
        assert_eq!(typed_filename("README", None), None);
        // A bare ".txt" is a dotfile name, not an extension.
        assert_eq!(typed_filename("", Some(FileType::Txt)), None);
        assert_eq!(
            typed_filename("!", Some(FileType::Txt)).as_deref(),
            Some("!.txt")
        );
    }

    #[test]
    fn save_is_idempotent_and_listed() {
        let (_tmp, store) = store();
        let first = store.save("My Report.PDF", b"hello").unwrap();
        let second = store.save("My Report.PDF", b"hello").unwrap();
        assert_eq!(first, second);
        assert_eq!(store.read(&first).unwrap(), b"hello");
        assert_eq!(store.list().unwrap(), vec!["my_report_5d414.pdf".to_string()]);
    }

    #[test]
    fn existing_target_is_not_overwritten() {
        let (_tmp, store) = store();
        let name = store.save("notes.txt", b"original").unwrap();
        // Simulate a prefix collision: same target, different bytes.
        std::fs::write(store.layout.collection_path(&name), b"kept").unwrap();
        store.save("notes.txt", b"original").unwrap();
        assert_eq!(store.read(&name).unwrap(), b"kept");
    }

    #[test]
    fn list_is_sorted_and_empty_without_root() {
        let tmp = TempDir::new().unwrap();
        let missing = FileStore::new(DataLayout::new(tmp.path().join("absent")));
        assert!(missing.list().unwrap().is_empty());

        let (_tmp, store) = store();
        store.save("zeta.txt", b"z").unwrap();
        store.save("alpha.txt", b"a").unwrap();
        let names = store.list().unwrap();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), 2);
    }
}
