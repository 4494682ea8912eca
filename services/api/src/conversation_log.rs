//! File-backed conversation log.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use phonebridge_core::conversation::{ConversationLog, Role, format_record};
use std::path::{Path, PathBuf};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};

/// Appends turns to a text file shared by every call.
///
/// Writes are serialized through a mutex so records from concurrent calls
/// never interleave.
pub struct FileConversationLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConversationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConversationLog for FileConversationLog {
    async fn append(&self, role: Role, text: &str) -> Result<()> {
        let record = format_record(Utc::now(), role, text);
        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(record.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
