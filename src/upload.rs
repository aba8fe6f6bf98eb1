//! 图片上传处理器：校验、落盘并写入元数据。

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Extension, Multipart};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::IMAGE_FIELD;
use crate::error::ApiError;
use crate::images::{ImageStore, NewImage};
use crate::storage::BlobStore;

pub const TOO_LARGE_MESSAGE: &str = "The uploaded file is too big (max: 8M)";
pub const MISSING_FILE_MESSAGE: &str = "no such file: the form has no `imageFile` file field";
pub const FORMAT_NOT_ALLOWED_MESSAGE: &str =
    "The provided file format is not allowed. Please upload a JPEG or PNG image";

/// 完整读取的 `imageFile` 表单项。
#[derive(Debug)]
struct ImagePart {
    filename: String,
    content_type: Option<String>,
    data: Bytes,
}

/// 接收单个图片上传，成功后重定向回来源页面。
pub async fn upload_image(
    Extension(blobs): Extension<Arc<dyn BlobStore>>,
    Extension(images): Extension<Arc<dyn ImageStore>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let multipart = multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let part = read_image_part(multipart).await?;

    let mime_type = match part.content_type.as_deref() {
        Some(value) if is_allowed_mime(value) => value.to_string(),
        other => {
            warn!(
                filename = part.filename,
                content_type = other.unwrap_or(""),
                "rejected upload with disallowed type"
            );
            return Err(ApiError::BadRequest(FORMAT_NOT_ALLOWED_MESSAGE.into()));
        }
    };
    let extension = file_extension(&part.filename).to_string();

    let mut blob = blobs.create(&extension).await?;
    if let Err(err) = blob.write(&part.data).await {
        warn!(location = blob.location(), error = %err, "blob write failed, discarding");
        blob.discard().await;
        return Err(err.into());
    }
    let storage_path = blob.location().to_string();
    // close 失败时已自行删除文件。
    blob.close().await?;

    let record = NewImage {
        storage_path: storage_path.clone(),
        filename: part.filename,
        size_bytes: i64::try_from(part.data.len()).unwrap_or(i64::MAX),
        mime_type,
        extension,
        created_at: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };
    let filename = record.filename.clone();
    let size = record.size_bytes;
    let id = match images.insert(record).await {
        Ok(id) => id,
        Err(err) => {
            warn!(path = storage_path, "image record insert failed, blob left orphaned");
            return Err(err.into());
        }
    };

    info!(id, filename, size, path = storage_path, "image uploaded");

    let location = headers
        .get(header::REFERER)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""));
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// 读完整个 multipart 请求体，保留第一个带文件名的 `imageFile` 项。
/// 返回之前不落盘。
async fn read_image_part(mut multipart: Multipart) -> Result<ImagePart, ApiError> {
    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if image.is_some() || field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_owned);
        let data = field.bytes().await.map_err(multipart_error)?;
        image = Some(ImagePart {
            filename,
            content_type,
            data,
        });
    }
    image.ok_or_else(|| ApiError::BadRequest(MISSING_FILE_MESSAGE.into()))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("rejected oversized upload");
        return ApiError::BadRequest(TOO_LARGE_MESSAGE.into());
    }
    ApiError::BadRequest(err.body_text())
}

/// 取最后一段路径中最后一个 `.` 起的后缀，没有则为空。
pub fn file_extension(filename: &str) -> &str {
    let base_start = filename.rfind('/').map(|index| index + 1).unwrap_or(0);
    let base = &filename[base_start..];
    match base.rfind('.') {
        Some(index) => &base[index..],
        None => "",
    }
}

/// 与允许的类型精确匹配，不剥离参数。
fn is_allowed_mime(value: &str) -> bool {
    [mime::IMAGE_JPEG, mime::IMAGE_PNG]
        .iter()
        .any(|allowed| allowed.essence_str() == value)
}
