//! Output-file lifecycle: resume detection, append writes, fsync.
//!
//! The file is opened before the request goes out. An existing regular
//! file is reused in append mode and its size becomes the resume offset;
//! anything else gets a fresh empty file and offset 0.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only writer for one task's local file.
#[derive(Debug)]
pub struct OutputFile {
    file: File,
    path: PathBuf,
}

/// Result of opening the local path: the writer plus how many bytes were
/// already on disk before this run.
#[derive(Debug)]
pub struct OpenedOutput {
    pub output: OutputFile,
    pub restart_offset: u64,
    /// True when an existing regular file is being appended to.
    pub resumed: bool,
}

impl OutputFile {
    /// Open `path` for this task. Existing regular file: append mode,
    /// `restart_offset` = current size. Missing or non-regular path:
    /// create/truncate, offset 0.
    pub fn open(path: &Path) -> Result<OpenedOutput> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => {
                let size = meta.len();
                let file = OpenOptions::new()
                    .append(true)
                    .open(path)
                    .with_context(|| format!("failed to open {} for append", path.display()))?;
                tracing::debug!("reusing {} at offset {}", path.display(), size);
                Ok(OpenedOutput {
                    output: OutputFile {
                        file,
                        path: path.to_path_buf(),
                    },
                    restart_offset: size,
                    resumed: true,
                })
            }
            _ => {
                let file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                Ok(OpenedOutput {
                    output: OutputFile {
                        file,
                        path: path.to_path_buf(),
                    },
                    restart_offset: 0,
                    resumed: false,
                })
            }
        }
    }

    /// Append `data` at the end of the file.
    pub fn append(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.file.write_all(data)
    }

    /// Flush file data to disk.
    pub fn sync(&self) -> std::io::Result<()> {
        self.file.sync_all()
    }

    /// Path this writer was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
