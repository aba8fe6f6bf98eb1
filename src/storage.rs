//! 上传文件的本地磁盘存储。

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

/// 为每次上传创建唯一命名的文件。
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// 新建空文件，`extension` 仅作为命名提示（如 `.png`）。
    async fn create(&self, extension: &str) -> Result<Box<dyn BlobWriter>, StorageError>;
}

/// [`BlobStore::create`] 返回的写入句柄。
#[async_trait]
pub trait BlobWriter: Send {
    /// 与图片元数据一同记录的稳定路径。
    fn location(&self) -> &str;

    async fn write(&mut self, bytes: &[u8]) -> Result<(), StorageError>;

    /// 刷新并关闭写入句柄；失败时自行删除未完成的文件。
    async fn close(self: Box<Self>) -> Result<(), StorageError>;

    /// 放弃并删除未完成的文件。
    async fn discard(self: Box<Self>);
}

#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn create(&self, extension: &str) -> Result<Box<dyn BlobWriter>, StorageError> {
        let name = format!("upload-{}{}", Uuid::new_v4().simple(), blob_suffix(extension));
        let path = self.root.join(name);
        // create_new 保证不会覆盖已有文件。
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        let location = path
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        Ok(Box::new(LocalBlob {
            path,
            location,
            file,
        }))
    }
}

struct LocalBlob {
    path: PathBuf,
    location: String,
    file: File,
}

#[async_trait]
impl BlobWriter for LocalBlob {
    fn location(&self) -> &str {
        &self.location
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        self.file.write_all(bytes).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), StorageError> {
        let LocalBlob { path, mut file, .. } = *self;
        // 写入错误（如 ENOSPC）通常在 flush/sync 时才暴露。
        let synced = match file.flush().await {
            Ok(()) => file.sync_all().await,
            Err(err) => Err(err),
        };
        if let Err(err) = synced {
            drop(file);
            remove_blob(&path).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn discard(self: Box<Self>) {
        let LocalBlob { path, file, .. } = *self;
        drop(file);
        remove_blob(&path).await;
    }
}

async fn remove_blob(path: &Path) {
    if let Err(err) = fs::remove_file(path).await {
        warn!(path = ?path, error = %err, "failed to remove unfinished upload");
    }
}

/// 仅当扩展名为 `.` 加 ASCII 字母数字时才写入文件名。
fn blob_suffix(extension: &str) -> &str {
    match extension.strip_prefix('.') {
        Some(rest) if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()) => {
            extension
        }
        _ => "",
    }
}

#[derive(Debug)]
pub enum StorageError {
    Io(io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "blob storage: {err}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
