//! Rule sources. The builder only needs "give me the DSL text"; where the
//! text lives (memory, a file, a reader, a directory tree) is up to the
//! resource.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, RuleError};

/// Something that can produce rule source text.
pub trait Resource {
    /// Human-readable origin, used in logs and errors.
    fn origin(&self) -> String;

    /// Produce the source text.
    fn load(&mut self) -> Result<String>;
}


// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Rule text held in memory, from a string or raw bytes.
#[derive(Debug, Clone)]
pub struct TextResource {
    bytes: Vec<u8>,
}

impl TextResource {
    pub fn new(text: impl Into<String>) -> Self {
        TextResource {
            bytes: text.into().into_bytes(),
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        TextResource {
            bytes: bytes.into(),
        }
    }
}

impl Resource for TextResource {
    fn origin(&self) -> String {
        format!("<text {} bytes>", self.bytes.len())
    }

    fn load(&mut self) -> Result<String> {
        String::from_utf8(self.bytes.clone()).map_err(|e| RuleError::Resource {
            origin: self.origin(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })
    }
}


// ---------------------------------------------------------------------------
// File
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResource {
    path: PathBuf,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileResource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Resource for FileResource {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&mut self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|source| RuleError::Resource {
            origin: self.origin(),
            source,
        })
    }
}


// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Wraps any reader. The reader is consumed on the first `load`; later
/// loads return the text read the first time.
pub struct ReaderResource<R> {
    reader: Option<R>,
    text: Option<String>,
    label: String,
}

impl<R: Read> ReaderResource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_label(reader, "<reader>")
    }

    pub fn with_label(reader: R, label: impl Into<String>) -> Self {
        ReaderResource {
            reader: Some(reader),
            text: None,
            label: label.into(),
        }
    }
}

impl<R> fmt::Debug for ReaderResource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderResource")
            .field("label", &self.label)
            .field("consumed", &self.reader.is_none())
            .finish()
    }
}

impl<R: Read> Resource for ReaderResource<R> {
    fn origin(&self) -> String {
        self.label.clone()
    }

    fn load(&mut self) -> Result<String> {
        if let Some(mut reader) = self.reader.take() {
            let mut text = String::new();
            reader
                .read_to_string(&mut text)
                .map_err(|source| RuleError::Resource {
                    origin: self.origin(),
                    source,
                })?;
            self.text = Some(text);
        }
        Ok(self.text.clone().unwrap_or_default())
    }
}


// ---------------------------------------------------------------------------
// Directory bundle
// ---------------------------------------------------------------------------

/// A directory tree of rule files, selected by extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryBundle {
    root: PathBuf,
    extension: String,
}

impl DirectoryBundle {
    /// Bundle every `*.grl` file under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_extension(root, "grl")
    }

    pub fn with_extension(root: impl Into<PathBuf>, extension: &str) -> Self {
        DirectoryBundle {
            root: root.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Scan the tree and return one `FileResource` per matching file,
    /// sorted by path so build order is stable.
    pub fn load(&self) -> Result<Vec<FileResource>> {
        if !self.root.is_dir() {
            return Err(RuleError::Resource {
                origin: self.root.display().to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            });
        }
        let mut paths = Vec::new();
        self.scan_dir_recursive(&self.root, &mut paths)?;
        paths.sort();
        Ok(paths.into_iter().map(FileResource::new).collect())
    }

    fn scan_dir_recursive(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        let resource_error = |path: &Path, source: io::Error| RuleError::Resource {
            origin: path.display().to_string(),
            source,
        };
        let read_dir = fs::read_dir(dir).map_err(|e| resource_error(dir, e))?;
        for entry in read_dir {
            let entry = entry.map_err(|e| resource_error(dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| resource_error(&path, e))?;
            if file_type.is_dir() {
                self.scan_dir_recursive(&path, out)?;
            } else if file_type.is_symlink() && path.is_dir() {
                // Symlinked directories can form cycles.
                debug!(path = %path.display(), "skipping symlinked directory");
            } else if path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str()) {
                out.push(path);
            }
        }
        Ok(())
    }
}


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
