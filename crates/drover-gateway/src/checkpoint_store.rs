//! File-backed checkpoint store using JSONL, one file per thread.
//!
//! Saves replace the whole file through a temp-file rename, so a crash
//! mid-save leaves the previous checkpoint intact and the next load sees
//! only fully-committed cycles.

use anyhow::{Context, Result};
use async_trait::async_trait;
use drover_core::traits::CheckpointStore;
use drover_core::transcript::Transcript;
use drover_core::types::Entry;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub(crate) struct DiskCheckpointStore {
    dir: PathBuf,
}

impl DiskCheckpointStore {
    pub(crate) fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create checkpoint dir: {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path(&self, thread_id: &str) -> PathBuf {
        let slug = thread_id.replace(['/', ':', '+'], "_");
        self.dir.join(format!("{slug}.jsonl"))
    }

    fn read(&self, thread_id: &str) -> Result<Transcript> {
        let path = self.path(thread_id);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let mut entries = Vec::new();
                for (i, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Entry>(line) {
                        Ok(entry) => entries.push(entry),
                        Err(e) => {
                            warn!(
                                path = %path.display(),
                                line = i + 1,
                                error = %e,
                                "skipping corrupt entry in checkpoint file"
                            );
                        }
                    }
                }
                debug!(thread = thread_id, count = entries.len(), "loaded checkpoint");
                Ok(Transcript::from_entries(entries))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Transcript::new()),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn write(&self, thread_id: &str, transcript: &Transcript) -> Result<()> {
        let path = self.path(thread_id);
        let mut content = String::new();
        for entry in transcript.entries() {
            content.push_str(&serde_json::to_string(entry)?);
            content.push('\n');
        }

        let tmp = path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, &content)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        debug!(thread = thread_id, count = transcript.len(), "saved checkpoint");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for DiskCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Transcript> {
        self.read(thread_id)
    }

    async fn save(&self, thread_id: &str, transcript: &Transcript) -> Result<()> {
        self.write(thread_id, transcript)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut threads = Vec::new();
        for dirent in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?
        {
            let path = dirent?.path();
            if path.extension().is_some_and(|ext| ext == "jsonl")
                && let Some(stem) = path.file_stem()
            {
                threads.push(stem.to_string_lossy().into_owned());
            }
        }
        Ok(threads)
    }
}
