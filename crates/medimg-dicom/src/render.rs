//! 影像渲染

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tracing::debug;

use crate::error::DicomError;
use crate::parser::DicomImage;
use crate::windowing::{apply_window_level, WindowParams};

/// 按给定窗口参数渲染为 RGBA 缓冲区
pub fn render_rgba(image: &DicomImage, params: &WindowParams) -> Vec<u8> {
    let mut rgba = vec![0u8; image.pixels.len() * 4];
    apply_window_level(&mut rgba, &image.pixels, params);
    rgba
}

/// 将 RGBA 缓冲区编码为 PNG
pub fn encode_png(width: u32, height: u32, rgba: &[u8]) -> Result<Vec<u8>, DicomError> {
    let expected = (width as usize) * (height as usize) * 4;
    if rgba.len() != expected {
        return Err(DicomError::Render(format!(
            "tamaño de búfer {} distinto de {}x{}x4",
            rgba.len(),
            width,
            height
        )));
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(rgba, width, height, ExtendedColorType::Rgba8)
        .map_err(|e| DicomError::Render(e.to_string()))?;
    debug!("Encoded {}x{} PNG, {} bytes", width, height, png.len());
    Ok(png)
}

/// 渲染并编码为 PNG
pub fn render_png(image: &DicomImage, params: &WindowParams) -> Result<Vec<u8>, DicomError> {
    let rgba = render_rgba(image, params);
    encode_png(image.width, image.height, &rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DicomParser;
    use crate::testing::TestDicomBuilder;

    const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_render_png() {
        let data = TestDicomBuilder::new()
            .dimensions(2, 2)
            .pixels_u16(vec![0, 100, 200, 300])
            .build();
        let image = DicomParser::parse_bytes(&data).unwrap();

        let rgba = render_rgba(&image, &image.window);
        assert_eq!(rgba.len(), 16);
        assert_eq!(&rgba[8..12], &[223, 223, 223, 255]);

        let png = render_png(&image, &image.window).unwrap();
        assert!(png.starts_with(PNG_SIGNATURE));
    }

    #[test]
    fn test_encode_png_rejects_mismatched_buffer() {
        assert!(matches!(
            encode_png(4, 4, &[0u8; 8]),
            Err(DicomError::Render(_))
        ));
    }
}
