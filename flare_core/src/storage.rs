/**
 * File-backed key/value storage for report lists.
 *
 * Each key maps to one JSON array file `<dir>/<key>.json`. Writes are
 * whole-file replacements through a temporary file and a rename, so a
 * crash mid-write leaves either the old list or the new one.
 */
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::Result;
use crate::protocol::types::ErrorReport;

#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /**
     * Reads the list stored under `key`. A missing file is an empty list.
     */
    pub fn read_list(&self, key: &str) -> Result<Vec<ErrorReport>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /**
     * Replaces the list stored under `key`, creating the directory if needed.
     */
    pub fn write_list(&self, key: &str, reports: &[ErrorReport]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(reports)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Deletes the list stored under `key`. Missing is fine.
    pub fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
