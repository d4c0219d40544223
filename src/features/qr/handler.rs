use std::time::Instant;

use axum::body::Bytes;
use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
    routing::any,
};
use tracing::debug;

use crate::{error::AppError, state::AppState};

use super::{
    encoder,
    output::{self, QrRaster},
    params::{QrQuery, QrRequest},
};

#[utoipa::path(
    get,
    path = "/qr",
    summary = "生成二维码图片",
    description = "将 data 编码为 L 级纠错的二维码并缩放到 size x size（默认 250，允许 21-500）。可选 logo 参数指定远程 png/jpeg/gif，按二维码宽度 20% 缩放后居中叠加；Logo 回源或解码失败时静默返回不带 Logo 的二维码。该路径接受任意 HTTP 方法。",
    params(QrQuery),
    responses(
        (status = 200, description = "PNG 图片", content_type = "image/png", body = Vec<u8>),
        (status = 400, description = "缺少 data 或 data 无法解码", content_type = "text/plain", body = String),
        (status = 500, description = "size 越界或编码失败", content_type = "text/plain", body = String)
    ),
    tag = "QR"
)]
pub async fn generate_qr(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let t_total = Instant::now();
    let req = QrRequest::from_query(QrQuery::from_pairs(pairs), &state.config.qr)?;
    tracing::info!(size = req.size, logo = req.logo.is_some(), "开始生成二维码: {}", req.data);

    let QrRequest { data, size, logo } = req;
    let qr = run_render(&state, move || encoder::render(&data, size)).await?;

    let raster = match logo {
        Some(url) if state.config.logo.enabled => {
            state
                .logo
                .try_overlay(qr, &url, &state.render_semaphore)
                .await
        }
        Some(_) => {
            debug!("Logo 叠加已在配置中关闭，忽略 logo 参数");
            QrRaster::Gray(qr)
        }
        None => QrRaster::Gray(qr),
    };

    let optimize_speed = state.config.image.optimize_speed;
    let png = run_render(&state, move || output::encode_png(&raster, optimize_speed)).await?;

    debug!(
        total_ms = t_total.elapsed().as_millis() as u64,
        bytes = png.len(),
        "二维码生成完成"
    );

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(png.len()));
    Ok((StatusCode::OK, headers, Bytes::from(png)))
}

/// 在阻塞线程池中执行 CPU 密集型任务，受渲染信号量限流。
async fn run_render<T, F>(state: &AppState, task: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    let _permit = state
        .render_semaphore
        .acquire()
        .await
        .map_err(|e| AppError::Internal(format!("获取渲染信号量失败: {e}")))?;
    tokio::task::spawn_blocking(task).await?
}

/// `/qr` 路由（方法无关）
pub fn create_qr_router() -> Router<AppState> {
    Router::new().route("/qr", any(generate_qr))
}
