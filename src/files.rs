//! 图片列表处理器。

use axum::extract::Extension;
use axum::response::Json as JsonResponse;
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::images::{Image, ImageStore};

/// 按上传时间倒序列出全部图片记录。
pub async fn list_images(
    Extension(images): Extension<Arc<dyn ImageStore>>,
) -> Result<JsonResponse<Vec<Image>>, ApiError> {
    let entries = images.list_recent().await?;
    info!(count = entries.len(), "list images");
    Ok(JsonResponse(entries))
}
