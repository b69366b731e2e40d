use crate::collectors::CollectError;
use nix::sys::statvfs::statvfs;
use std::path::{Path, PathBuf};

pub fn disk_usage(path: Option<&Path>) -> Result<f64, CollectError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => current_dir()?,
    };
    let stat = statvfs(path.as_path()).map_err(|errno| CollectError::Io {
        path: path.display().to_string(),
        source: errno.into(),
    })?;
    usage_percent(stat.blocks() as u64, stat.blocks_free() as u64)
}

pub fn usage_percent(total_blocks: u64, free_blocks: u64) -> Result<f64, CollectError> {
    if total_blocks == 0 {
        return Err(CollectError::InvalidMetric(
            "total disk blocks is zero".to_string(),
        ));
    }
    let used = total_blocks.saturating_sub(free_blocks);
    Ok(used as f64 / total_blocks as f64 * 100.0)
}

fn current_dir() -> Result<PathBuf, CollectError> {
    std::env::current_dir().map_err(|source| CollectError::Io {
        path: "current working directory".to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_percent_of_blocks() {
        assert_eq!(usage_percent(1000, 250).unwrap(), 75.0);
        assert_eq!(usage_percent(1000, 1000).unwrap(), 0.0);
        assert_eq!(usage_percent(1000, 0).unwrap(), 100.0);
    }

    #[test]
    fn free_above_total_never_goes_negative() {
        assert_eq!(usage_percent(10, 20).unwrap(), 0.0);
    }

    #[test]
    fn zero_total_blocks_is_invalid_metric() {
        assert!(matches!(
            usage_percent(0, 0),
            Err(CollectError::InvalidMetric(_))
        ));
    }

    #[test]
    fn working_directory_filesystem_is_measured() {
        let usage = disk_usage(None).expect("statvfs on cwd");
        assert!((0.0..=100.0).contains(&usage));
    }
}
