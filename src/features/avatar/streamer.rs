use std::path::Path;

use axum::{
    body::Body,
    http::{
        StatusCode,
        header::{CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use tokio_util::io::ReaderStream;

use crate::error::AppError;

pub const PNG_CONTENT_TYPE: &str = "image/png";

/// 以流的方式返回已落盘的图片。
///
/// 打开/读取元数据失败直接返回错误；传输中途的读错误会终止响应体，不会挂起请求。
pub async fn stream_image(path: &Path, status: StatusCode) -> Result<Response, AppError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| AppError::Stream(format!("Unable to open {}: {e}", path.display())))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| AppError::Stream(format!("Unable to stat {}: {e}", path.display())))?
        .len();

    let shown = path.display().to_string();
    let stream = ReaderStream::new(file).inspect_err(move |e| {
        tracing::error!(path = %shown, error = %e, "图片流传输中断");
    });

    Ok((
        status,
        [
            (CONTENT_TYPE, PNG_CONTENT_TYPE.to_string()),
            (CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
