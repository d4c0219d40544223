use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// 应用统一错误类型（仅在 HTTP 处理边界转换为响应）
#[derive(Error, Debug)]
pub enum AppError {
    /// 请求参数错误（缺少 data 或 data 无法解码）
    #[error("{0}")]
    BadRequest(String),

    /// size 超出允许区间
    ///
    /// 沿用既有客户端依赖的行为：以 500 返回，而非 400。
    #[error("{0}")]
    SizeOutOfRange(String),

    /// 二维码或 PNG 编码失败
    #[error("编码失败: {0}")]
    Encoding(String),

    /// 模块矩阵无法缩放到目标尺寸
    #[error("缩放失败: {0}")]
    Scaling(String),

    /// 内部服务器错误（阻塞任务异常、信号量关闭等）
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::SizeOutOfRange(_)
            | AppError::Encoding(_)
            | AppError::Scaling(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回给调用方的简短文本；内部细节只进日志。
    fn public_message(&self) -> String {
        match self {
            AppError::BadRequest(msg) | AppError::SizeOutOfRange(msg) => msg.clone(),
            _ => self
                .status_code()
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "请求处理失败: {}", self);
        } else {
            tracing::debug!(status = status.as_u16(), "请求被拒绝: {}", self);
        }

        let mut body = self.public_message();
        body.push('\n');

        let mut res = (status, body).into_response();
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        res.headers_mut().insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        res
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("阻塞任务执行失败: {err}"))
    }
}
