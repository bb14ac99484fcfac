use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// 应用统一错误类型
///
/// 所有错误都在请求边界被转换为 HTTP 状态码 + 纯文本消息。
/// 需要 `Clone`：同一个渲染 flight 的失败结果会分发给所有等待者。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// 路径参数校验失败（avatar/network/collectionId/tokenId）
    #[error("参数校验错误 [{field}={value}]: {reason}")]
    InvalidParameter {
        field: &'static str,
        value: String,
        /// 面向调用方的错误描述
        reason: String,
    },

    /// 存储路径构造失败（存储根目录缺失、不是目录或不可写）
    #[error("存储路径错误: {0}")]
    PathConstruction(String),

    /// 链上数据解析失败
    #[error("链上数据解析错误: {0}")]
    Resolution(String),

    /// 图层获取/合成/编码/落盘失败
    #[error("图像合成错误: {0}")]
    Composition(String),

    /// 读取已渲染图片失败
    #[error("图片读取错误: {0}")]
    Stream(String),

    /// 内部服务器错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid_parameter(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AppError::InvalidParameter {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidParameter { .. } | AppError::PathConstruction(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Resolution(_)
            | AppError::Composition(_)
            | AppError::Stream(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回给调用方的消息正文。
    ///
    /// 服务端错误原样透传协作方的错误文本（会暴露内部信息，见 DESIGN.md）。
    pub fn client_message(&self) -> &str {
        match self {
            AppError::InvalidParameter { reason, .. } => reason,
            AppError::PathConstruction(m)
            | AppError::Resolution(m)
            | AppError::Composition(m)
            | AppError::Stream(m)
            | AppError::Internal(m) => m,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "{}", self);
        }

        let mut res = self.client_message().to_string().into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        res
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};

    #[test]
    fn client_errors_map_to_bad_request() {
        let e = AppError::invalid_parameter("avatar", "x", "Unknown avatar (x)");
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::PathConstruction("root".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn collaborator_errors_map_to_internal_server_error() {
        for e in [
            AppError::Resolution("rpc down".into()),
            AppError::Composition("decode".into()),
            AppError::Stream("eof".into()),
        ] {
            assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[tokio::test]
    async fn response_body_is_raw_message_text() {
        let resp = AppError::Resolution("token 7 not found".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            resp.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        let body = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        assert_eq!(&body[..], b"token 7 not found");
    }
}
