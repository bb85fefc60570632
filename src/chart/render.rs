use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{imageops, ColorType, ImageBuffer, ImageEncoder, Rgb, RgbImage};

use crate::error::{ChartError, Result};
use crate::normalize::{normalize, to_u8, ScaleConvention};

/// Normalized grey raster of the survey image on a square canvas, north up.
///
/// Row 0 of `data` is the first FITS row, which ends up at the bottom of the
/// canvas.
pub fn render_raster(
    data: &[f64],
    width: usize,
    height: usize,
    canvas_size: u32,
    clip: (f64, f64),
    convention: ScaleConvention,
) -> Result<RgbImage> {
    if width == 0 || height == 0 || data.len() < width * height {
        return Err(ChartError::Processing(format!(
            "cannot render a {}x{} image from {} pixels",
            width,
            height,
            data.len()
        )));
    }
    if canvas_size == 0 {
        return Err(ChartError::Processing("canvas size must be positive".to_string()));
    }

    let grey = to_u8(&normalize(&data[..width * height], clip.0, clip.1, convention));

    // Grayscale to RGB so overlays can be coloured
    let mut rgb_image = ImageBuffer::<Rgb<u8>, Vec<u8>>::new(width as u32, height as u32);
    for (x, y, pixel) in rgb_image.enumerate_pixels_mut() {
        let value = grey[y as usize * width + x as usize];
        *pixel = Rgb([value, value, value]);
    }

    let resized = imageops::resize(
        &rgb_image,
        canvas_size,
        canvas_size,
        imageops::FilterType::CatmullRom,
    );
    Ok(imageops::flip_vertical(&resized))
}

/// Encode an RGB raster as PNG bytes
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut png, CompressionType::Default, FilterType::Adaptive);
    let (width, height) = image.dimensions();
    encoder.write_image(image.as_raw(), width, height, ColorType::Rgb8.into())?;
    Ok(png)
}
