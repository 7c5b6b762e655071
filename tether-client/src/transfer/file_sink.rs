use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tether_core::TransferId;
use tracing::info;

/// A fully reassembled incoming file.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub id: TransferId,
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// Where completed incoming files go.
#[async_trait]
pub trait FileSink: Send + Sync {
    async fn store(&self, file: ReceivedFile) -> std::io::Result<()>;
}

/// Writes files into a download directory without overwriting existing ones.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn free_path(&self, name: &str) -> PathBuf {
        let name = sanitize(name);
        let candidate = self.dir.join(&name);
        if !exists(&candidate).await {
            return candidate;
        }

        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_owned(), format!(".{ext}")),
            _ => (name.clone(), String::new()),
        };
        let mut n = 1;
        loop {
            let candidate = self.dir.join(format!("{stem} ({n}){ext}"));
            if !exists(&candidate).await {
                return candidate;
            }
            n += 1;
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Keeps only the final path component and drops characters that are unsafe in file names.
fn sanitize(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "download".to_owned()
    } else {
        cleaned.to_owned()
    }
}

#[async_trait]
impl FileSink for DirectorySink {
    async fn store(&self, file: ReceivedFile) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.free_path(&file.name).await;
        tokio::fs::write(&path, &file.data).await?;
        info!(transfer = %file.id, "Saved {} bytes to {}", file.data.len(), path.display());
        Ok(())
    }
}
