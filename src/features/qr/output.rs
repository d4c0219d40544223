use image::{GrayImage, RgbaImage};

use crate::error::AppError;

/// 最终输出的栅格：纯二维码为灰度，叠加 Logo 后为 RGBA
#[derive(Debug, Clone)]
pub enum QrRaster {
    Gray(GrayImage),
    Rgba(RgbaImage),
}

impl QrRaster {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            QrRaster::Gray(img) => img.dimensions(),
            QrRaster::Rgba(img) => img.dimensions(),
        }
    }

    fn color_type(&self) -> png::ColorType {
        match self {
            QrRaster::Gray(_) => png::ColorType::Grayscale,
            QrRaster::Rgba(_) => png::ColorType::Rgba,
        }
    }

    fn as_raw(&self) -> &[u8] {
        match self {
            QrRaster::Gray(img) => img.as_raw(),
            QrRaster::Rgba(img) => img.as_raw(),
        }
    }
}

/// 使用 png crate 编码到内存缓冲区。
///
/// `optimize_speed` 为 true 时使用 Fast 压缩 + 无滤波，否则 Default + Paeth。
pub fn encode_png(raster: &QrRaster, optimize_speed: bool) -> Result<Vec<u8>, AppError> {
    let (width, height) = raster.dimensions();
    let data = raster.as_raw();

    let mut out = Vec::with_capacity(data.len() / 4 + 64);
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(raster.color_type());
        encoder.set_depth(png::BitDepth::Eight);
        if optimize_speed {
            encoder.set_compression(png::Compression::Fast);
            encoder.set_filter(png::FilterType::NoFilter);
        } else {
            encoder.set_compression(png::Compression::Default);
            encoder.set_filter(png::FilterType::Paeth);
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| AppError::Encoding(format!("PNG write_header error: {e}")))?;
        writer
            .write_image_data(data)
            .map_err(|e| AppError::Encoding(format!("PNG write_image_data error: {e}")))?;
        writer
            .finish()
            .map_err(|e| AppError::Encoding(format!("PNG finish error: {e}")))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    #[test]
    fn gray_raster_round_trips_through_png() {
        let mut img = GrayImage::from_pixel(30, 30, Luma([255]));
        img.put_pixel(3, 4, Luma([0]));
        let bytes = encode_png(&QrRaster::Gray(img.clone()), false).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&bytes).unwrap().to_luma8();
        assert_eq!(decoded.as_raw(), img.as_raw());
    }

    #[test]
    fn rgba_raster_keeps_dimensions_in_fast_mode() {
        let img = RgbaImage::from_pixel(40, 25, Rgba([10, 20, 30, 255]));
        let bytes = encode_png(&QrRaster::Rgba(img), true).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 25));
        assert_eq!(decoded.to_rgba8().get_pixel(7, 7), &Rgba([10, 20, 30, 255]));
    }
}
