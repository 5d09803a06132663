use crate::config::BatchConfig;
use session::{BatchInfo, FrameStore, SessionError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct OpenBatch {
    label: String,
    path: PathBuf,
    /// Committed files of this batch, oldest first.
    files: Vec<PathBuf>,
}

/// Numbered batch directories holding numbered frames.
#[derive(Debug)]
pub struct BatchStore {
    config: BatchConfig,
    current: Option<OpenBatch>,
    next_file_index: u32,
}

impl BatchStore {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            current: None,
            next_file_index: 0,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    fn open_batch(&self) -> Result<&OpenBatch, SessionError> {
        self.current
            .as_ref()
            .ok_or_else(|| SessionError::Persistence("no batch is open".into()))
    }
}

impl FrameStore for BatchStore {
    fn has_open_batch(&self) -> bool {
        self.current.is_some()
    }

    fn current_batch(&self) -> Option<BatchInfo> {
        self.current.as_ref().map(|batch| BatchInfo {
            label: batch.label.clone(),
            path: batch.path.clone(),
            frame_count: batch.files.len(),
        })
    }

    /// Create the first directory index (from 1) not yet on disk.
    fn open_new_batch(&mut self) -> Result<BatchInfo, SessionError> {
        fs::create_dir_all(&self.config.base_directory)?;

        let mut index = 1u32;
        let path = loop {
            let candidate = self
                .config
                .base_directory
                .join(self.config.directory_name(index));
            match fs::create_dir(&candidate) {
                Ok(()) => break candidate,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => index += 1,
                Err(e) => {
                    return Err(SessionError::Persistence(format!(
                        "cannot create {}: {}",
                        candidate.display(),
                        e
                    )));
                }
            }
        };

        if self.config.restart_file_index_with_new_directory {
            self.next_file_index = 0;
        }

        let label = self.config.directory_name(index);
        tracing::info!(batch = %label, path = %path.display(), "Batch directory created");
        self.current = Some(OpenBatch {
            label: label.clone(),
            path: path.clone(),
            files: Vec::new(),
        });

        Ok(BatchInfo {
            label,
            path,
            frame_count: 0,
        })
    }

    /// The slot stays free until committed, so asking twice yields the same
    /// path. An existing file with that name is removed first.
    fn next_output_path(&mut self) -> Result<PathBuf, SessionError> {
        let dir = self.open_batch()?.path.clone();
        let path = dir.join(self.config.file_name(self.next_file_index));

        match fs::remove_file(&path) {
            Ok(()) => tracing::warn!(file = %path.display(), "Overwriting existing file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(SessionError::Persistence(format!(
                    "{} already exists and cannot be removed: {}",
                    path.display(),
                    e
                )));
            }
        }

        Ok(path)
    }

    fn commit_output(&mut self, path: &Path) -> Result<(), SessionError> {
        let Some(batch) = self.current.as_mut() else {
            return Err(SessionError::Persistence("no batch is open".into()));
        };
        batch.files.push(path.to_path_buf());
        self.next_file_index += 1;
        Ok(())
    }

    fn remove_last(&mut self) -> Result<Option<String>, SessionError> {
        let Some(path) = self.current.as_mut().and_then(|batch| batch.files.pop()) else {
            return Ok(None);
        };
        self.next_file_index = self.next_file_index.saturating_sub(1);
        let name = self.display_name(&path);

        match fs::remove_file(&path) {
            Ok(()) => {}
            // Deleted behind our back; the slot is freed either way.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(file = %path.display(), "Removed slot had no file")
            }
            Err(e) => {
                return Err(SessionError::Persistence(format!(
                    "cannot remove {}: {}",
                    path.display(),
                    e
                )));
            }
        }
        Ok(Some(name))
    }

    fn display_name(&self, path: &Path) -> String {
        let file = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        match &self.current {
            Some(batch) => format!("{}/{}", batch.label, file),
            None => file,
        }
    }
}
