//! Document sources: anything that can present (id, text, metadata) once.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::types::Document;

pub trait DocumentSource {
    fn documents(&self) -> Box<dyn Iterator<Item = Result<Document>> + '_>;
}

impl DocumentSource for [Document] {
    fn documents(&self) -> Box<dyn Iterator<Item = Result<Document>> + '_> {
        Box::new(self.iter().cloned().map(Ok))
    }
}

impl DocumentSource for Vec<Document> {
    fn documents(&self) -> Box<dyn Iterator<Item = Result<Document>> + '_> {
        self.as_slice().documents()
    }
}

/// Every `*.txt` file under a root directory, in sorted path order.
///
/// The source id is the path relative to the root. Metadata carries
/// `source`, `file_name` and `category` (parent directory, `misc` at the root).
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn list_txt_files(&self) -> Vec<PathBuf> {
        let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
            .collect();
        txt_files.sort();
        txt_files
    }

    fn read_document(&self, file_path: &Path) -> Result<Document> {
        let text = match fs::read_to_string(file_path) {
            Ok(content) => content,
            Err(_) => String::from_utf8_lossy(&fs::read(file_path)?).to_string(),
        };
        let relative = file_path.strip_prefix(&self.root).unwrap_or(file_path);
        let source_id = relative.to_string_lossy().replace('\\', "/");
        let category = relative
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty())
            .unwrap_or("misc")
            .to_string();
        let file_name = file_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        debug!(source = %source_id, bytes = text.len(), "read document");
        Ok(Document::new(source_id.clone(), text)
            .with_metadata("source", source_id)
            .with_metadata("file_name", file_name)
            .with_metadata("category", category))
    }
}

impl DocumentSource for DirectorySource {
    fn documents(&self) -> Box<dyn Iterator<Item = Result<Document>> + '_> {
        let files = self.list_txt_files();
        info!(root = %self.root.display(), files = files.len(), "scanning corpus directory");
        Box::new(files.into_iter().map(move |p| self.read_document(&p)))
    }
}
