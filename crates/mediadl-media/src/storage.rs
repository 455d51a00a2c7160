//! Artifact storage on the local filesystem.
//!
//! All job artifacts live directly under one root directory. File names
//! start with the owning job id (`<id>_<name>.<ext>`), which is what the
//! directory-scan fallback and the sweeper rely on.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sysinfo::Disks;
use tokio::fs;
use tracing::{debug, warn};

use mediadl_models::JobId;

use crate::error::{MediaError, MediaResult};

/// A regular file found under the artifact root.
#[derive(Debug, Clone)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

impl ArtifactEntry {
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Root directory holding job artifacts.
#[derive(Debug)]
pub struct ArtifactStorage {
    root: PathBuf,
}

impl ArtifactStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist.
    pub async fn ensure_root(&self) -> MediaResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Output path for a transform of `source` into `ext`.
    pub fn transform_output_path(&self, job_id: &JobId, source: &Path, ext: &str) -> PathBuf {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        self.root.join(format!("{}_{}.{}", job_id, stem, ext))
    }

    /// Size of a regular file, or `None` if it does not exist.
    pub async fn stat(&self, path: &Path) -> MediaResult<Option<u64>> {
        match fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MediaError::Io(e)),
        }
    }

    /// Remove a file. Returns `Ok(false)` if it was already gone.
    pub async fn delete(&self, path: &Path) -> MediaResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted artifact");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(MediaError::Io(e)),
        }
    }

    /// Remove a file, logging instead of failing.
    pub async fn delete_best_effort(&self, path: &Path) -> bool {
        match self.delete(path).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete artifact");
                false
            }
        }
    }

    /// List regular files directly under the root.
    pub async fn list(&self) -> MediaResult<Vec<ArtifactEntry>> {
        let mut entries = Vec::new();

        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(MediaError::Io(e)),
        };

        while let Some(entry) = dir.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                // Removed between listing and stat
                Err(_) => continue,
            };
            if !meta.is_file() {
                continue;
            }
            entries.push(ArtifactEntry {
                path: entry.path(),
                size: meta.len(),
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Files whose name starts with `<job_id>_`, in lexical order.
    pub async fn files_for_job(&self, job_id: &JobId) -> MediaResult<Vec<PathBuf>> {
        let prefix = format!("{}_", job_id);
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|e| e.file_name().starts_with(&prefix))
            .map(|e| e.path)
            .collect())
    }

    /// Find a file produced for `job_id` when the tool did not report one.
    ///
    /// Prefers files with `preferred_ext`; among equal candidates the first
    /// in lexical order wins.
    pub async fn find_for_job(
        &self,
        job_id: &JobId,
        preferred_ext: Option<&str>,
    ) -> MediaResult<Option<PathBuf>> {
        let candidates = self.files_for_job(job_id).await?;

        if candidates.len() > 1 {
            warn!(
                job_id = %job_id,
                count = candidates.len(),
                "Multiple artifacts match job, picking first"
            );
        }

        let preferred = preferred_ext.and_then(|ext| {
            candidates.iter().find(|p| {
                p.extension()
                    .and_then(|x| x.to_str())
                    .is_some_and(|x| x.eq_ignore_ascii_case(ext))
            })
        });

        Ok(preferred.or(candidates.first()).cloned())
    }

    /// Used space of the disk holding the root, in percent.
    ///
    /// The disk is the one with the longest mount point containing the root.
    pub fn disk_usage_percent(&self) -> Option<f64> {
        let root = std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        let disks = Disks::new_with_refreshed_list();

        let disk = disks
            .list()
            .iter()
            .filter(|d| root.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())?;

        let total = disk.total_space();
        if total == 0 {
            return None;
        }
        let used = total.saturating_sub(disk.available_space());
        Some(used as f64 / total as f64 * 100.0)
    }
}
