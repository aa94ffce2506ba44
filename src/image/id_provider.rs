use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Source of monotonically increasing ids for instance names
pub trait IdProvider: Send + Sync {
    fn next_id(&self) -> Result<u64>;
}

static ID_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// Keeps the last issued id in a file so names never repeat across restarts
#[derive(Debug, Clone)]
pub struct FileIdProvider {
    path: PathBuf,
}

impl FileIdProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_watermark(&self) -> Result<u64> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.trim().parse::<u64>().unwrap_or(0)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

impl IdProvider for FileIdProvider {
    fn next_id(&self) -> Result<u64> {
        let _guard = ID_LOCK.lock();
        let next = self.read_watermark()? + 1;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, next.to_string())?;
        fs::rename(&tmp, &self.path)?;
        Ok(next)
    }
}
