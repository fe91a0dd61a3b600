//! Tracked files: local persistence plus routing into the model-side
//! tools that can consume them.
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

/// Extensions accepted by the execution sandbox.
pub const CODE_INTERPRETER_EXTENSIONS: &[&str] = &[
    ".c", ".cs", ".cpp", ".csv", ".doc", ".docx", ".html", ".java", ".json", ".md", ".pdf",
    ".php", ".pptx", ".py", ".rb", ".tex", ".txt", ".css", ".js", ".sh", ".ts", ".jpeg", ".jpg",
    ".gif", ".pkl", ".png", ".tar", ".xlsx", ".xml", ".zip",
];

/// Extensions accepted by the retrieval index.
pub const FILE_SEARCH_EXTENSIONS: &[&str] = &[
    ".c", ".cpp", ".cs", ".css", ".doc", ".docx", ".go", ".html", ".java", ".js", ".json", ".md",
    ".pdf", ".php", ".pptx", ".py", ".rb", ".sh", ".tex", ".ts", ".txt",
];

/// Extensions accepted as vision inputs.
pub const VISION_EXTENSIONS: &[&str] = &[".png", ".jpeg", ".jpg", ".webp", ".gif"];

/// Where a tracked file comes from: a path already on disk, or named
/// bytes handed over by the embedding application (e.g. a UI upload).
#[derive(Clone, Debug)]
pub enum FileSource {
    Path(PathBuf),
    Memory { name: String, bytes: Vec<u8> },
}

impl FileSource {
    /// Compatibility constructor for callers holding two optional
    /// sources. Exactly one must be provided.
    pub fn from_options(
        path: Option<PathBuf>,
        upload: Option<(String, Vec<u8>)>,
    ) -> Result<Self> {
        match (path, upload) {
            (Some(path), None) => Ok(Self::Path(path)),
            (None, Some((name, bytes))) => Ok(Self::Memory { name, bytes }),
            _ => bail!("Exactly one of a file path or an in-memory upload must be provided"),
        }
    }
}

/// The remote handles a file picked up along the way: one per tool it
/// was registered with. A single upload can serve several tools.
#[derive(Clone, Debug, Default)]
pub struct TrackedFile {
    pub path: PathBuf,
    /// Set when the PDF direct-document probe succeeded.
    pub direct_input_file_id: Option<String>,
    pub vision_file_id: Option<String>,
    pub code_interpreter_file_id: Option<String>,
    pub file_search: Option<FileSearchHandle>,
    pub skip_retrieval: bool,
    pub is_container_file: bool,
}

#[derive(Clone, Debug)]
pub struct FileSearchHandle {
    pub file_id: String,
    pub vector_store_id: String,
}

impl TrackedFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }
}

/// The file's extension, lowercased and including the leading dot.
pub fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

pub fn is_code_interpreter_eligible(path: &Path) -> bool {
    CODE_INTERPRETER_EXTENSIONS.contains(&extension(path).as_str())
}

pub fn is_file_search_eligible(path: &Path) -> bool {
    FILE_SEARCH_EXTENSIONS.contains(&extension(path).as_str())
}

pub fn is_vision_eligible(path: &Path) -> bool {
    VISION_EXTENSIONS.contains(&extension(path).as_str())
}

pub fn is_pdf(path: &Path) -> bool {
    extension(path) == ".pdf"
}
