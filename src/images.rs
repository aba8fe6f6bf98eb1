//! 基于 SQLite 的图片元数据存储。

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::fmt;
use std::path::Path;

/// 一条已持久化的上传记录，字段顺序即列表 JSON 的顺序。
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Image {
    pub id: i64,
    #[serde(rename = "path")]
    #[sqlx(rename = "path")]
    pub storage_path: String,
    pub filename: String,
    #[serde(rename = "size")]
    #[sqlx(rename = "size")]
    pub size_bytes: i64,
    #[serde(rename = "mimetype")]
    #[sqlx(rename = "mimetype")]
    pub mime_type: String,
    pub extension: String,
    pub created_at: String,
}

/// 尚未分配 id 的图片记录。
#[derive(Clone, Debug)]
pub struct NewImage {
    pub storage_path: String,
    pub filename: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub extension: String,
    pub created_at: String,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// 追加一条记录并返回分配的 id。
    async fn insert(&self, image: NewImage) -> Result<i64, StoreError>;

    /// 全部记录，最新的在前。
    async fn list_recent(&self) -> Result<Vec<Image>, StoreError>;
}

pub struct SqliteImageStore {
    pool: SqlitePool,
}

impl SqliteImageStore {
    /// 打开（必要时创建）数据库文件并执行建表。
    pub async fn open(path: &Path, max_connections: u32) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(StoreError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// 内存数据库：单个永不过期的连接保证数据随连接池存活。
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        // AUTOINCREMENT 保证 id 不被复用。
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                filename TEXT NOT NULL,
                size INTEGER NOT NULL,
                mimetype TEXT NOT NULL,
                extension TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_created_at ON images(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ImageStore for SqliteImageStore {
    async fn insert(&self, image: NewImage) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO images (path, filename, size, mimetype, extension, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&image.storage_path)
        .bind(&image.filename)
        .bind(image.size_bytes)
        .bind(&image.mime_type)
        .bind(&image.extension)
        .bind(&image.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn list_recent(&self) -> Result<Vec<Image>, StoreError> {
        let images = sqlx::query_as::<_, Image>(
            "SELECT id, path, filename, size, mimetype, extension, created_at \
             FROM images ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(images)
    }
}

#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
    Io(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(err) => write!(f, "metadata store: {err}"),
            StoreError::Io(err) => write!(f, "metadata store: {err}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_image(name: &str, created_at: &str) -> NewImage {
        NewImage {
            storage_path: format!("uploaded/upload-{name}"),
            filename: name.to_string(),
            size_bytes: 2048,
            mime_type: "image/jpeg".to_string(),
            extension: ".jpg".to_string(),
            created_at: created_at.to_string(),
        }
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let store = SqliteImageStore::open_in_memory().await.expect("open store");
        let images = store.list_recent().await.expect("list");
        assert!(images.is_empty());
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let store = SqliteImageStore::open_in_memory().await.expect("open store");
        let first = store
            .insert(new_image("a.jpg", "2024-01-01 10:00:00"))
            .await
            .expect("insert a");
        let second = store
            .insert(new_image("b.jpg", "2024-01-01 10:00:00"))
            .await
            .expect("insert b");
        assert!(second > first);
    }

    #[tokio::test]
    async fn list_recent_orders_newest_first() {
        let store = SqliteImageStore::open_in_memory().await.expect("open store");
        store
            .insert(new_image("old.jpg", "2024-01-01 09:00:00"))
            .await
            .expect("insert old");
        store
            .insert(new_image("new.jpg", "2024-03-01 09:00:00"))
            .await
            .expect("insert new");
        store
            .insert(new_image("mid.jpg", "2024-02-01 09:00:00"))
            .await
            .expect("insert mid");
        // 与 "new.jpg" 同一秒：后插入的排在前面。
        store
            .insert(new_image("tie.jpg", "2024-03-01 09:00:00"))
            .await
            .expect("insert tie");

        let names: Vec<String> = store
            .list_recent()
            .await
            .expect("list")
            .into_iter()
            .map(|image| image.filename)
            .collect();
        assert_eq!(names, ["tie.jpg", "new.jpg", "mid.jpg", "old.jpg"]);
    }

    #[tokio::test]
    async fn record_round_trips_all_fields() {
        let store = SqliteImageStore::open_in_memory().await.expect("open store");
        let id = store
            .insert(new_image("cat.jpg", "2024-05-05 05:05:05"))
            .await
            .expect("insert");
        let images = store.list_recent().await.expect("list");
        assert_eq!(
            images,
            vec![Image {
                id,
                storage_path: "uploaded/upload-cat.jpg".to_string(),
                filename: "cat.jpg".to_string(),
                size_bytes: 2048,
                mime_type: "image/jpeg".to_string(),
                extension: ".jpg".to_string(),
                created_at: "2024-05-05 05:05:05".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("db").join("images.db");
        {
            let store = SqliteImageStore::open(&path, 2).await.expect("open store");
            store
                .insert(new_image("dog.png", "2024-01-01 00:00:00"))
                .await
                .expect("insert");
        }
        let store = SqliteImageStore::open(&path, 2).await.expect("reopen store");
        let images = store.list_recent().await.expect("list");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].filename, "dog.png");
    }

    #[test]
    fn image_serializes_fields_in_listing_order() {
        let image = Image {
            id: 7,
            storage_path: "uploaded/upload-x.png".to_string(),
            filename: "x.png".to_string(),
            size_bytes: 10,
            mime_type: "image/png".to_string(),
            extension: ".png".to_string(),
            created_at: "2024-01-01 00:00:00".to_string(),
        };
        let json = serde_json::to_string(&image).expect("serialize");
        assert_eq!(
            json,
            r#"{"id":7,"path":"uploaded/upload-x.png","filename":"x.png","size":10,"mimetype":"image/png","extension":".png","created_at":"2024-01-01 00:00:00"}"#
        );
    }
}
