//! File system accessor.
//!
//! The pipeline reads sources and writes the bundled document through this
//! trait so builds can run against an in-memory tree in tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BuildError;

pub trait FileAccess {
    fn read(&self, path: &Path) -> Result<String, BuildError>;
    fn write(&self, path: &Path, data: &str) -> Result<(), BuildError>;
    fn exists(&self, path: &Path) -> bool;
}

/// Real disk access.
#[derive(Debug, Default)]
pub struct DiskAccess;

impl FileAccess for DiskAccess {
    fn read(&self, path: &Path) -> Result<String, BuildError> {
        fs::read_to_string(path).map_err(|e| BuildError::io(path, e))
    }

    fn write(&self, path: &Path, data: &str) -> Result<(), BuildError> {
        fs::write(path, data).map_err(|e| BuildError::io(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// In-memory tree keyed by normalized path strings.
#[derive(Debug, Default)]
pub struct MemAccess {
    files: RefCell<HashMap<PathBuf, String>>,
}

impl MemAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<String>) {
        self.files.borrow_mut().insert(path.into(), data.into());
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.files.borrow().get(path).cloned()
    }
}

impl FileAccess for MemAccess {
    fn read(&self, path: &Path) -> Result<String, BuildError> {
        self.get(path).ok_or_else(|| BuildError::Io {
            path: path.to_string_lossy().to_string(),
            message: "file not found".to_string(),
        })
    }

    fn write(&self, path: &Path, data: &str) -> Result<(), BuildError> {
        self.insert(path.to_path_buf(), data.to_string());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }
}
