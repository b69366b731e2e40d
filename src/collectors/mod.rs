pub mod disk;
pub mod system;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PROC_ROOT: &str = "/proc";

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid metric: {0}")]
    InvalidMetric(String),
}

#[derive(Debug, Clone)]
pub struct Collector {
    proc_root: PathBuf,
    disk_path: Option<PathBuf>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT, None)
    }
}

impl Collector {
    /// `disk_path: None` measures the filesystem of the working directory at
    /// call time.
    pub fn new(proc_root: impl Into<PathBuf>, disk_path: Option<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            disk_path,
        }
    }

    pub fn cpu_usage(&self) -> Result<f64, CollectError> {
        let content = self.read_proc("stat")?;
        system::parse_cpu_usage(&content)
    }

    pub fn memory_usage(&self) -> Result<f64, CollectError> {
        let content = self.read_proc("self/status")?;
        system::parse_memory_usage(&content)
    }

    pub fn disk_usage(&self) -> Result<f64, CollectError> {
        disk::disk_usage(self.disk_path.as_deref())
    }

    pub fn load_averages(&self) -> Result<(f64, f64, f64), CollectError> {
        let content = self.read_proc("loadavg")?;
        system::parse_load_averages(&content)
    }

    fn read_proc(&self, name: &str) -> Result<String, CollectError> {
        let path = self.proc_root.join(name);
        read_to_string(&path)
    }
}

fn read_to_string(path: &Path) -> Result<String, CollectError> {
    fs::read_to_string(path).map_err(|source| CollectError::Io {
        path: path.display().to_string(),
        source,
    })
}
