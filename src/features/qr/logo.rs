use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, RgbaImage};
use reqwest::{Client, StatusCode, header};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::config::LogoConfig;

use super::output::QrRaster;

/// 允许的 Logo Content-Type（按 mime 主体比较，忽略参数）
const SUPPORTED_CONTENT_TYPES: [&str; 4] = ["image/jpeg", "image/jpg", "image/png", "image/gif"];

/// 解码时允许的最大边长，防止小体积大尺寸的"解压炸弹"
const MAX_LOGO_DIMENSION: u32 = 4096;

/// Logo 处理错误：只记录日志，不会返回给调用方
#[derive(Error, Debug)]
pub enum LogoError {
    #[error("网络错误: {0}")]
    Network(String),
    #[error("回源超时")]
    Timeout,
    #[error("回源状态码异常: {0}")]
    Status(StatusCode),
    #[error("不支持的 Logo 类型: {0:?}")]
    UnsupportedType(String),
    #[error("Logo 超过大小上限 {0} 字节")]
    TooLarge(u64),
    #[error("不支持的 Logo 图片格式")]
    UnsupportedFormat,
    #[error("Logo 解码失败: {0}")]
    Decode(String),
    #[error("Logo 缩放后尺寸 {width}x{height} 超出二维码范围")]
    Oversized { width: u32, height: u32 },
}

impl From<reqwest::Error> for LogoError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LogoError::Timeout
        } else {
            LogoError::Network(err.to_string())
        }
    }
}

/// 回源得到的 Logo 原始数据
#[derive(Debug, Clone)]
pub struct FetchedLogo {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// 判断 Content-Type 是否为支持的 Logo 类型
pub fn is_supported_content_type(raw: &str) -> bool {
    let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    SUPPORTED_CONTENT_TYPES.contains(&essence.as_str())
}

/// Logo 回源与叠加
#[derive(Debug, Clone)]
pub struct LogoOverlay {
    client: Client,
    max_bytes: u64,
    width_ratio: f64,
}

impl LogoOverlay {
    pub fn new(client: Client, cfg: &LogoConfig) -> Self {
        Self {
            client,
            max_bytes: cfg.max_bytes,
            width_ratio: cfg.width_ratio,
        }
    }

    /// GET Logo：仅接受 200、受支持的 Content-Type 且不超过大小上限的响应。
    pub async fn fetch(&self, url: &str) -> Result<FetchedLogo, LogoError> {
        let mut resp = self.client.get(url).send().await?;

        if resp.status() != StatusCode::OK {
            return Err(LogoError::Status(resp.status()));
        }

        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_supported_content_type(&content_type) {
            return Err(LogoError::UnsupportedType(content_type));
        }

        if resp.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(LogoError::TooLarge(self.max_bytes));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(LogoError::TooLarge(self.max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedLogo {
            content_type,
            bytes,
        })
    }

    /// 尽力叠加 Logo：任何失败都记录日志并原样返回二维码。
    ///
    /// 解码/缩放/合成在阻塞线程池中执行，并占用一个渲染许可。
    pub async fn try_overlay(&self, qr: GrayImage, url: &str, permits: &Semaphore) -> QrRaster {
        tracing::info!(logo = url, "开始叠加 Logo");

        let logo = match self.fetch(url).await {
            Ok(logo) => logo,
            Err(e) => {
                tracing::warn!(logo = url, error = %e, "Logo 回源失败，返回原始二维码");
                return QrRaster::Gray(qr);
            }
        };
        tracing::debug!(
            logo = url,
            content_type = %logo.content_type,
            bytes = logo.bytes.len(),
            "Logo 回源完成"
        );

        let _permit = match permits.acquire().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "获取渲染许可失败，跳过 Logo 叠加");
                return QrRaster::Gray(qr);
            }
        };

        let ratio = self.width_ratio;
        let base = qr.clone();
        let composed = tokio::task::spawn_blocking(move || {
            let decoded = decode_logo(&logo.bytes)?;
            compose(&base, &decoded, ratio)
        })
        .await;

        match composed {
            Ok(Ok(rgba)) => QrRaster::Rgba(rgba),
            Ok(Err(e)) => {
                tracing::warn!(logo = url, error = %e, "Logo 处理失败，返回原始二维码");
                QrRaster::Gray(qr)
            }
            Err(e) => {
                tracing::warn!(logo = url, error = %e, "Logo 合成任务异常，返回原始二维码");
                QrRaster::Gray(qr)
            }
        }
    }
}

/// 按内容嗅探格式解码，仅接受 PNG/JPEG/GIF。
pub fn decode_logo(bytes: &[u8]) -> Result<DynamicImage, LogoError> {
    let format = image::guess_format(bytes).map_err(|_| LogoError::UnsupportedFormat)?;
    if !matches!(
        format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif
    ) {
        return Err(LogoError::UnsupportedFormat);
    }

    let mut limits = image::Limits::default();
    limits.max_image_width = Some(MAX_LOGO_DIMENSION);
    limits.max_image_height = Some(MAX_LOGO_DIMENSION);

    let mut reader = image::ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);
    let img = reader
        .decode()
        .map_err(|e| LogoError::Decode(e.to_string()))?;
    if img.width() == 0 || img.height() == 0 {
        return Err(LogoError::Decode("empty image".to_string()));
    }
    Ok(img)
}

/// 计算 Logo 缩放后的尺寸：宽为二维码宽的 `ratio` 倍，高按原比例。
pub fn logo_dimensions(qr_width: u32, logo_width: u32, logo_height: u32, ratio: f64) -> (u32, u32) {
    let width = ((f64::from(qr_width) * ratio) as u32).max(1);
    let height =
        (0.7 + f64::from(logo_height) / f64::from(logo_width) * f64::from(width)) as u32;
    (width, height.max(1))
}

/// Lanczos3 缩放后居中 source-over 合成到二维码上。
///
/// 缩放后高度超过二维码的 Logo（细长图）直接拒绝，避免为被裁掉的像素分配内存。
pub fn compose(qr: &GrayImage, logo: &DynamicImage, ratio: f64) -> Result<RgbaImage, LogoError> {
    let (qr_w, qr_h) = qr.dimensions();
    let (w, h) = logo_dimensions(qr_w, logo.width(), logo.height(), ratio);
    if w > qr_w || h > qr_h {
        return Err(LogoError::Oversized {
            width: w,
            height: h,
        });
    }
    let resized = imageops::resize(logo, w, h, FilterType::Lanczos3);

    let offset_x = (i64::from(qr_w) - i64::from(w)) / 2;
    let offset_y = (i64::from(qr_h) - i64::from(h)) / 2;

    let mut canvas = DynamicImage::ImageLuma8(qr.clone()).to_rgba8();
    imageops::overlay(&mut canvas, &resized, offset_x, offset_y);
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};
    use std::time::Duration;

    async fn start_hanging_http_server() -> std::net::SocketAddr {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind tcp listener");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(v) => v,
                    Err(_) => break,
                };
                tokio::spawn(async move {
                    // 不返回任何 HTTP 响应，触发客户端 read timeout。
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    drop(socket);
                });
            }
        });

        addr
    }

    fn encode_test_png(img: &RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).expect("encode png");
        out.into_inner()
    }

    #[tokio::test]
    async fn fetch_timeout_maps_to_timeout_error() {
        let addr = start_hanging_http_server().await;
        let client = crate::http::client_with_timeout(Duration::from_millis(100))
            .expect("build reqwest client");
        let overlay = LogoOverlay::new(client, &LogoConfig::default());

        let err = overlay
            .fetch(&format!("http://{addr}/logo.png"))
            .await
            .expect_err("expected timeout");
        assert!(
            matches!(err, LogoError::Timeout),
            "expected LogoError::Timeout, got: {err:?}"
        );
    }

    #[test]
    fn content_type_check_ignores_case_and_params() {
        assert!(is_supported_content_type("image/png"));
        assert!(is_supported_content_type("IMAGE/JPEG"));
        assert!(is_supported_content_type("image/jpg"));
        assert!(is_supported_content_type("image/gif; charset=binary"));
        assert!(!is_supported_content_type("image/webp"));
        assert!(!is_supported_content_type("text/plain"));
        assert!(!is_supported_content_type(""));
    }

    #[test]
    fn logo_dimensions_preserve_aspect_ratio() {
        assert_eq!(logo_dimensions(250, 100, 100, 0.2), (50, 50));
        assert_eq!(logo_dimensions(250, 200, 100, 0.2), (50, 25));
        assert_eq!(logo_dimensions(21, 10, 10, 0.2), (4, 4));
        assert_eq!(logo_dimensions(21, 1000, 1, 0.2), (4, 1));
    }

    #[test]
    fn decode_rejects_unsupported_formats() {
        assert!(matches!(
            decode_logo(b"definitely not an image"),
            Err(LogoError::UnsupportedFormat)
        ));
        // BMP 魔数
        assert!(matches!(
            decode_logo(b"BM\0\0\0\0\0\0\0\0\0\0\0\0"),
            Err(LogoError::UnsupportedFormat)
        ));
        // PNG 魔数但内容残缺
        assert!(matches!(
            decode_logo(b"\x89PNG\r\n\x1a\n\0\0"),
            Err(LogoError::Decode(_))
        ));
    }

    #[test]
    fn decode_accepts_png() {
        let logo = RgbaImage::from_pixel(8, 4, Rgba([255, 0, 0, 255]));
        let img = decode_logo(&encode_test_png(&logo)).unwrap();
        assert_eq!((img.width(), img.height()), (8, 4));
    }

    #[test]
    fn compose_centers_logo_and_keeps_bounds() {
        let qr = GrayImage::from_pixel(100, 100, Luma([255]));
        let logo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            40,
            40,
            Rgba([255, 0, 0, 255]),
        ));
        let out = compose(&qr, &logo, 0.2).expect("compose");

        assert_eq!(out.dimensions(), (100, 100));
        // 20x20 的 Logo 位于 (40,40)..(60,60)；Lanczos 允许 ±1 的舍入误差
        for (x, y) in [(50, 50), (45, 45), (58, 41)] {
            let px = out.get_pixel(x, y);
            assert!(px[0] >= 254 && px[1] <= 1 && px[2] <= 1, "({x},{y}) = {px:?}");
        }
        assert_eq!(out.get_pixel(39, 50), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(60, 50), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn compose_respects_logo_alpha() {
        let qr = GrayImage::from_pixel(100, 100, Luma([0]));
        let logo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            40,
            40,
            Rgba([255, 255, 255, 0]),
        ));
        let out = compose(&qr, &logo, 0.2).expect("compose");
        // 完全透明的 Logo 不改变底图
        let px = out.get_pixel(50, 50);
        assert!(px[0] <= 1 && px[3] == 255, "{px:?}");
    }

    #[test]
    fn compose_rejects_logo_taller_than_qr() {
        let qr = GrayImage::from_pixel(500, 500, Luma([255]));
        let logo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            1,
            4096,
            Rgba([0, 0, 0, 255]),
        ));
        let err = compose(&qr, &logo, 0.2).expect_err("tall logo should be rejected");
        assert!(
            matches!(err, LogoError::Oversized { width: 100, height } if height > 500),
            "{err:?}"
        );

        // 恰好等高时仍然合成
        let logo = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            10,
            50,
            Rgba([0, 0, 0, 255]),
        ));
        let out = compose(&qr, &logo, 0.2).expect("logo as tall as qr");
        assert_eq!(out.dimensions(), (500, 500));
    }
}
