//! Template sources

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::SystemTime,
};

use crate::error::{Error, Result};

/// Where template sources come from
pub trait Loader: Send + Sync {
    /// Location a template name stands for; `once` inclusions are keyed on it
    fn resolve_path(&self, name: &str) -> PathBuf;

    /// Source text, or [`Error::MissingTemplate`]
    fn read(&self, name: &str) -> Result<String>;

    /// Last modification time of the source, or [`Error::MissingTemplate`]
    fn last_modified(&self, name: &str) -> Result<SystemTime>;
}

/// Templates stored below a root directory
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn failure(&self, name: &str, path: &Path, error: io::Error) -> Error {
        match error.kind() {
            io::ErrorKind::NotFound => Error::MissingTemplate(name.to_string()),
            _ => Error::io(path, error),
        }
    }
}

impl Loader for FileLoader {
    fn resolve_path(&self, name: &str) -> PathBuf {
        self.root.join(name.trim_start_matches('/'))
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.resolve_path(name);
        fs::read_to_string(&path).map_err(|error| self.failure(name, &path, error))
    }

    fn last_modified(&self, name: &str) -> Result<SystemTime> {
        let path = self.resolve_path(name);
        fs::metadata(&path)
            .and_then(|metadata| metadata.modified())
            .map_err(|error| self.failure(name, &path, error))
    }
}

/// Templates held in memory, keyed by name
#[derive(Debug, Default)]
pub struct MemoryLoader {
    templates: Mutex<HashMap<String, (String, SystemTime)>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a template, modified now
    pub fn insert(&self, name: impl Into<String>, source: impl Into<String>) {
        self.insert_at(name, source, SystemTime::now());
    }

    /// Adds or replaces a template with an explicit modification time
    pub fn insert_at(&self, name: impl Into<String>, source: impl Into<String>, modified: SystemTime) {
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), (source.into(), modified));
    }

    fn entry(&self, name: &str) -> Result<(String, SystemTime)> {
        self.templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::MissingTemplate(name.to_string()))
    }
}

impl<K: Into<String>, S: Into<String>> FromIterator<(K, S)> for MemoryLoader {
    fn from_iter<T: IntoIterator<Item = (K, S)>>(iter: T) -> Self {
        let loader = MemoryLoader::new();
        for (name, source) in iter {
            loader.insert(name, source);
        }
        loader
    }
}

impl Loader for MemoryLoader {
    fn resolve_path(&self, name: &str) -> PathBuf {
        PathBuf::from(name)
    }

    fn read(&self, name: &str) -> Result<String> {
        self.entry(name).map(|(source, _)| source)
    }

    fn last_modified(&self, name: &str) -> Result<SystemTime> {
        self.entry(name).map(|(_, modified)| modified)
    }
}
