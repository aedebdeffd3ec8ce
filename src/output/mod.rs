//! Append-mode output file, one address per line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::OutputConfig;
use crate::extractor::EmailSet;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// Writes each address at most once per run, whatever Target it came from.
pub struct EmailSink {
    path: PathBuf,
    file: File,
    written: HashSet<String>,
}

impl EmailSink {
    pub async fn open(config: &OutputConfig) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .await
            .map_err(|source| SinkError::Open {
                path: config.path.clone(),
                source,
            })?;
        Ok(Self {
            path: config.path.clone(),
            file,
            written: HashSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the addresses not written yet. Returns how many were new.
    pub async fn write(&mut self, emails: &EmailSet) -> Result<usize, SinkError> {
        let mut chunk = String::new();
        let mut fresh = 0;
        for record in emails {
            if self.written.insert(record.address.clone()) {
                chunk.push_str(&record.address);
                chunk.push('\n');
                fresh += 1;
            }
        }
        if fresh > 0 {
            self.file.write_all(chunk.as_bytes()).await?;
            self.file.flush().await?;
        }
        debug!(path = %self.path.display(), fresh, "emails written");
        Ok(fresh)
    }
}
