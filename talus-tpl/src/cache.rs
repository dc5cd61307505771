//! Compiled program stores
//!
//! A cache answers one question for the staleness gate, "was the program for
//! this template stored after its source last changed?", and stores or fetches
//! programs by template id.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
    time::SystemTime,
};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use talus_tpl_parser::Program;

use crate::error::{Error, Result};

pub trait Cache: Send + Sync {
    /// Returns true if a program for `id` was stored after `modified`. A store in
    /// the same clock tick as the change is stale.
    fn is_fresh(&self, id: &str, modified: SystemTime) -> bool;

    fn load(&self, id: &str) -> Result<Option<Program>>;

    fn store(&self, id: &str, program: &Program) -> Result<()>;
}

/// Programs kept for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryCache {
    programs: Mutex<HashMap<String, (SystemTime, Program)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Cache for MemoryCache {
    fn is_fresh(&self, id: &str, modified: SystemTime) -> bool {
        self.programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .is_some_and(|(stored, _)| *stored > modified)
    }

    fn load(&self, id: &str) -> Result<Option<Program>> {
        Ok(self
            .programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|(_, program)| program.clone()))
    }

    fn store(&self, id: &str, program: &Program) -> Result<()> {
        self.programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), (SystemTime::now(), program.clone()));
        Ok(())
    }
}

/// Bytes of an id kept as they are in artifact file names
const FILE_NAME: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_');

/// Programs stored as JSON files in a directory, fresh by file modification time
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    dir: PathBuf,
}

impl DirectoryCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<percent-encoded id>.json`, one distinct file per id
    fn file(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", utf8_percent_encode(id, FILE_NAME)))
    }
}

impl Cache for DirectoryCache {
    fn is_fresh(&self, id: &str, modified: SystemTime) -> bool {
        fs::metadata(self.file(id))
            .and_then(|metadata| metadata.modified())
            .is_ok_and(|stored| stored > modified)
    }

    fn load(&self, id: &str) -> Result<Option<Program>> {
        let file = self.file(id);
        match fs::read_to_string(&file) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(Error::io(&file, error)),
        }
    }

    fn store(&self, id: &str, program: &Program) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|error| Error::io(&self.dir, error))?;
        let file = self.file(id);
        let json = serde_json::to_string(program)?;
        fs::write(&file, json).map_err(|error| Error::io(&file, error))
    }
}
