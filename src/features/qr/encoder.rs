use image::{GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};

use crate::error::AppError;

const DARK: Luma<u8> = Luma([0]);
const LIGHT: Luma<u8> = Luma([255]);

/// 固有分辨率的二维码模块矩阵（不含静区）
#[derive(Debug, Clone)]
pub struct QrMatrix {
    width: usize,
    dark: Vec<bool>,
}

impl QrMatrix {
    /// 每边模块数
    pub fn width(&self) -> usize {
        self.width
    }

    /// (x, y) 处是否为深色模块
    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.dark[y * self.width + x]
    }

    /// 按整数倍块复制放大到 `width x height`，居中放置，其余补白。
    pub fn scale(&self, width: u32, height: u32) -> Result<GrayImage, AppError> {
        let modules = self.width as u32;
        let factor = (width / modules).min(height / modules);
        if factor == 0 {
            return Err(AppError::Scaling(format!(
                "can not scale barcode to an image smaller than {modules}x{modules}"
            )));
        }

        let offset_x = (width - modules * factor) / 2;
        let offset_y = (height - modules * factor) / 2;

        let mut img = GrayImage::from_pixel(width, height, LIGHT);
        for my in 0..self.width {
            for mx in 0..self.width {
                if !self.is_dark(mx, my) {
                    continue;
                }
                let x0 = offset_x + mx as u32 * factor;
                let y0 = offset_y + my as u32 * factor;
                for y in y0..y0 + factor {
                    for x in x0..x0 + factor {
                        img.put_pixel(x, y, DARK);
                    }
                }
            }
        }
        Ok(img)
    }
}

/// 以 L 级纠错、自动模式选择（数字/字母数字/字节混合分段）编码文本。
pub fn encode(data: &str) -> Result<QrMatrix, AppError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .map_err(|e| AppError::Encoding(format!("生成二维码失败: {e}")))?;
    let width = code.width();
    let dark = code
        .to_colors()
        .into_iter()
        .map(|c| c == Color::Dark)
        .collect();
    Ok(QrMatrix { width, dark })
}

/// 编码并缩放为 `size x size` 的灰度图。
pub fn render(data: &str, size: u32) -> Result<GrayImage, AppError> {
    encode(data)?.scale(size, size)
}
