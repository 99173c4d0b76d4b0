use anyhow::{Context, Result};
use fast_image_resize::{images::Image, FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{imageops, RgbImage};
use std::num::NonZeroU32;

/// Crop an image to the given rectangle
pub fn crop_image(img: &RgbImage, x: u32, y: u32, width: u32, height: u32) -> Result<RgbImage> {
    let (img_width, img_height) = img.dimensions();

    if width == 0 || height == 0 {
        return Err(anyhow::anyhow!(
            "Empty crop ({},{},{}x{}) requested on {}x{} image",
            x, y, width, height, img_width, img_height
        ));
    }

    if x + width > img_width || y + height > img_height {
        return Err(anyhow::anyhow!(
            "Crop dimensions exceed image bounds: crop({},{},{}x{}) on {}x{} image",
            x, y, width, height, img_width, img_height
        ));
    }

    Ok(imageops::crop_imm(img, x, y, width, height).to_image())
}

/// Scale both dimensions by `factor` (truncating, never below one pixel)
pub fn zoom_image(img: &RgbImage, factor: f64) -> Result<RgbImage> {
    if factor == 1.0 {
        return Ok(img.clone());
    }

    let (width, height) = img.dimensions();
    let zoomed_width = ((width as f64 * factor) as u32).max(1);
    let zoomed_height = ((height as f64 * factor) as u32).max(1);

    resize_image(img, zoomed_width, zoomed_height)
}

/// Resize an image to exact dimensions with a Lanczos3 convolution
pub fn resize_image(img: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    let (src_width, src_height) = img.dimensions();

    if src_width == width && src_height == height {
        return Ok(img.clone());
    }

    let src_width_nz = NonZeroU32::new(src_width).ok_or_else(|| anyhow::anyhow!("Source width is zero"))?;
    let src_height_nz = NonZeroU32::new(src_height).ok_or_else(|| anyhow::anyhow!("Source height is zero"))?;
    let dst_width_nz = NonZeroU32::new(width).ok_or_else(|| anyhow::anyhow!("Target width is zero"))?;
    let dst_height_nz = NonZeroU32::new(height).ok_or_else(|| anyhow::anyhow!("Target height is zero"))?;

    let src_image = Image::from_vec_u8(
        src_width_nz.get(),
        src_height_nz.get(),
        img.as_raw().clone(),
        PixelType::U8x3,
    )
    .context("Failed to wrap source pixels for resizing")?;

    let mut dst_image = Image::new(dst_width_nz.get(), dst_height_nz.get(), PixelType::U8x3);

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3));
    let mut resizer = Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .with_context(|| {
            format!(
                "Failed to resize {}x{} image to {}x{}",
                src_width, src_height, width, height
            )
        })?;

    RgbImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| anyhow::anyhow!("Resized buffer does not match {}x{}", width, height))
}
