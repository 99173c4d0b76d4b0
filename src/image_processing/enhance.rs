use image::{Rgb, RgbImage};
use imageproc::filter::median_filter;

/// Percentage of pixels ignored at each end of every channel histogram
pub const AUTOCONTRAST_CUTOFF_PCT: u64 = 1;
/// 3x3 median window
pub const MEDIAN_RADIUS: u32 = 1;
pub const CONTRAST_FACTOR: f32 = 1.15;
pub const SHARPNESS_FACTOR: f32 = 1.35;

type ChannelLut = [u8; 256];

/// Readability pipeline for a zoomed right-hand crop
///
/// Order matters: autocontrast, histogram equalization, 3x3 median,
/// then contrast and sharpness boosts.
pub fn enhance_right_crop(img: &RgbImage) -> RgbImage {
    let stretched = apply_autocontrast(img, AUTOCONTRAST_CUTOFF_PCT);
    let equalized = apply_equalize(&stretched);
    let denoised = median_filter(&equalized, MEDIAN_RADIUS, MEDIAN_RADIUS);
    let contrasted = adjust_contrast(&denoised, CONTRAST_FACTOR);
    adjust_sharpness(&contrasted, SHARPNESS_FACTOR)
}

/// Stretch each channel so that its histogram spans 0-255
///
/// `cutoff_pct` percent of the pixels are discarded from the dark and the
/// bright end before looking for the channel minimum and maximum.
pub fn apply_autocontrast(img: &RgbImage, cutoff_pct: u64) -> RgbImage {
    let histograms = channel_histograms(img);
    let luts = [
        autocontrast_lut(&histograms[0], cutoff_pct),
        autocontrast_lut(&histograms[1], cutoff_pct),
        autocontrast_lut(&histograms[2], cutoff_pct),
    ];
    apply_luts(img, &luts)
}

/// Per-channel histogram equalization
pub fn apply_equalize(img: &RgbImage) -> RgbImage {
    let histograms = channel_histograms(img);
    let luts = [
        equalize_lut(&histograms[0]),
        equalize_lut(&histograms[1]),
        equalize_lut(&histograms[2]),
    ];
    apply_luts(img, &luts)
}

/// Scale the distance of every pixel from the mean gray level by `factor`
pub fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let pixel_count = img.width() as u64 * img.height() as u64;
    if pixel_count == 0 {
        return img.clone();
    }

    let luma_sum: u64 = img.pixels().map(|p| luma(p) as u64).sum();
    let mean = ((luma_sum as f64 / pixel_count as f64) + 0.5) as u8;

    let degenerate = RgbImage::from_pixel(img.width(), img.height(), Rgb([mean, mean, mean]));
    blend(&degenerate, img, factor)
}

/// Push every pixel away from its smoothed neighbourhood by `factor`
pub fn adjust_sharpness(img: &RgbImage, factor: f32) -> RgbImage {
    let degenerate = smooth(img);
    blend(&degenerate, img, factor)
}

fn channel_histograms(img: &RgbImage) -> [[u64; 256]; 3] {
    let mut histograms = [[0u64; 256]; 3];
    for pixel in img.pixels() {
        for (channel, histogram) in histograms.iter_mut().enumerate() {
            histogram[pixel[channel] as usize] += 1;
        }
    }
    histograms
}

fn identity_lut() -> ChannelLut {
    let mut lut = [0u8; 256];
    for (i, value) in lut.iter_mut().enumerate() {
        *value = i as u8;
    }
    lut
}

fn apply_luts(img: &RgbImage, luts: &[ChannelLut; 3]) -> RgbImage {
    let mut output = img.clone();
    for pixel in output.pixels_mut() {
        for channel in 0..3 {
            pixel[channel] = luts[channel][pixel[channel] as usize];
        }
    }
    output
}

fn autocontrast_lut(histogram: &[u64; 256], cutoff_pct: u64) -> ChannelLut {
    let mut trimmed = *histogram;
    let total: u64 = trimmed.iter().sum();

    // Drop the darkest pixels
    let mut cut = total * cutoff_pct / 100;
    for bin in trimmed.iter_mut() {
        if cut == 0 {
            break;
        }
        let taken = cut.min(*bin);
        *bin -= taken;
        cut -= taken;
    }

    // Drop the brightest pixels
    let mut cut = total * cutoff_pct / 100;
    for bin in trimmed.iter_mut().rev() {
        if cut == 0 {
            break;
        }
        let taken = cut.min(*bin);
        *bin -= taken;
        cut -= taken;
    }

    let lo = trimmed.iter().position(|&count| count > 0);
    let hi = trimmed.iter().rposition(|&count| count > 0);

    match (lo, hi) {
        (Some(lo), Some(hi)) if hi > lo => {
            let scale = 255.0 / (hi - lo) as f64;
            let offset = -(lo as f64) * scale;
            let mut lut = [0u8; 256];
            for (i, value) in lut.iter_mut().enumerate() {
                *value = ((i as f64 * scale + offset) as i32).clamp(0, 255) as u8;
            }
            lut
        }
        _ => identity_lut(),
    }
}

fn equalize_lut(histogram: &[u64; 256]) -> ChannelLut {
    let used: Vec<u64> = histogram.iter().copied().filter(|&count| count > 0).collect();
    if used.len() <= 1 {
        return identity_lut();
    }

    let total: u64 = used.iter().sum();
    let last = used[used.len() - 1];
    let step = (total - last) / 255;
    if step == 0 {
        return identity_lut();
    }

    let mut lut = [0u8; 256];
    let mut n = step / 2;
    for (i, value) in lut.iter_mut().enumerate() {
        *value = (n / step).min(255) as u8;
        n += histogram[i];
    }
    lut
}

/// ITU-R 601-2 luma with 16-bit fixed point rounding
fn luma(pixel: &Rgb<u8>) -> u8 {
    let value = pixel[0] as u32 * 19595 + pixel[1] as u32 * 38470 + pixel[2] as u32 * 7471 + 0x8000;
    (value >> 16) as u8
}

/// `degenerate + factor * (img - degenerate)`, per channel, clipped to 0-255
fn blend(degenerate: &RgbImage, img: &RgbImage, factor: f32) -> RgbImage {
    let mut output = img.clone();
    for (out, base) in output.pixels_mut().zip(degenerate.pixels()) {
        for channel in 0..3 {
            let from = base[channel] as f32;
            let to = out[channel] as f32;
            out[channel] = ((from + factor * (to - from)) as i32).clamp(0, 255) as u8;
        }
    }
    output
}

/// 3x3 smoothing kernel (center weight 5, total 13). Edge rows and columns are copied unchanged.
fn smooth(img: &RgbImage) -> RgbImage {
    const KERNEL: [[u32; 3]; 3] = [[1, 1, 1], [1, 5, 1], [1, 1, 1]];
    const KERNEL_SUM: f32 = 13.0;

    let (width, height) = img.dimensions();
    let mut output = img.clone();
    if width < 3 || height < 3 {
        return output;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut sums = [0u32; 3];
            for (ky, row) in KERNEL.iter().enumerate() {
                for (kx, weight) in row.iter().enumerate() {
                    let src = img.get_pixel(x + kx as u32 - 1, y + ky as u32 - 1);
                    for channel in 0..3 {
                        sums[channel] += src[channel] as u32 * weight;
                    }
                }
            }
            let pixel = output.get_pixel_mut(x, y);
            for channel in 0..3 {
                pixel[channel] = (sums[channel] as f32 / KERNEL_SUM + 0.5).min(255.0) as u8;
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageBuffer;

    fn create_gradient_image(width: u32, height: u32, low: u8, high: u8) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, _y| {
            let span = (high - low) as u32;
            let v = low + (x * span / (width - 1)) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_autocontrast_stretches_range() {
        let img = create_gradient_image(256, 4, 100, 151);
        let stretched = apply_autocontrast(&img, 0);

        let min = stretched.pixels().map(|p| p[0]).min().unwrap();
        let max = stretched.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn test_autocontrast_cutoff_ignores_outliers() {
        // 1 bright outlier among 199 mid-gray pixels, with a small dark tail
        let mut img = RgbImage::from_pixel(200, 1, Rgb([120, 120, 120]));
        for x in 0..100 {
            img.put_pixel(x, 0, Rgb([80, 80, 80]));
        }
        img.put_pixel(199, 0, Rgb([250, 250, 250]));

        let stretched = apply_autocontrast(&img, 1);
        // The outlier is cut away, so mid-gray now maps to white
        assert_eq!(stretched.get_pixel(150, 0)[0], 255);
        assert_eq!(stretched.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_autocontrast_flat_channel_is_identity() {
        let img = RgbImage::from_pixel(10, 10, Rgb([42, 42, 42]));
        assert_eq!(apply_autocontrast(&img, 1), img);
    }

    #[test]
    fn test_equalize_spreads_two_levels() {
        let img = ImageBuffer::from_fn(40, 20, |x, _y| {
            if x < 20 {
                Rgb([10u8, 10, 10])
            } else {
                Rgb([20u8, 20, 20])
            }
        });
        let equalized = apply_equalize(&img);

        // Dark half goes to black, bright half lands around the middle of the range
        assert_eq!(equalized.get_pixel(0, 0)[0], 0);
        assert!(equalized.get_pixel(39, 0)[0] > 100);
    }

    #[test]
    fn test_equalize_single_level_is_identity() {
        let img = RgbImage::from_pixel(8, 8, Rgb([200, 10, 90]));
        assert_eq!(apply_equalize(&img), img);
    }

    #[test]
    fn test_contrast_factor_one_is_identity() {
        let img = create_gradient_image(64, 4, 0, 255);
        assert_eq!(adjust_contrast(&img, 1.0), img);
    }

    #[test]
    fn test_contrast_moves_pixels_away_from_mean() {
        let img = create_gradient_image(64, 4, 50, 200);
        let boosted = adjust_contrast(&img, 1.5);

        assert!(boosted.get_pixel(0, 0)[0] < img.get_pixel(0, 0)[0]);
        assert!(boosted.get_pixel(63, 0)[0] > img.get_pixel(63, 0)[0]);
    }

    #[test]
    fn test_sharpness_keeps_borders_and_flat_areas() {
        let img = RgbImage::from_pixel(5, 5, Rgb([77, 77, 77]));
        assert_eq!(adjust_sharpness(&img, SHARPNESS_FACTOR), img);
    }

    #[test]
    fn test_sharpness_amplifies_a_spike() {
        let mut img = RgbImage::from_pixel(5, 5, Rgb([100, 100, 100]));
        img.put_pixel(2, 2, Rgb([200, 200, 200]));

        let sharpened = adjust_sharpness(&img, 2.0);
        assert!(sharpened.get_pixel(2, 2)[0] > 200);
        // Neighbours are pulled the other way
        assert!(sharpened.get_pixel(1, 2)[0] < 100);
    }

    #[test]
    fn test_pipeline_preserves_flat_image() {
        let img = RgbImage::from_pixel(40, 12, Rgb([100, 100, 100]));
        let enhanced = enhance_right_crop(&img);

        assert_eq!(enhanced.dimensions(), img.dimensions());
        assert_eq!(enhanced, img);
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(&Rgb([255, 255, 255])), 255);
        assert_eq!(luma(&Rgb([0, 0, 0])), 0);
        assert_eq!(luma(&Rgb([255, 0, 0])), 76);
    }
}
