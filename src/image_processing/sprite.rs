use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, Rgb, RgbImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

use super::annotate::LabelRenderer;
use super::enhance::enhance_right_crop;
use super::geometry::{RowBand, SpriteGeometry, ROW_COUNT};
use super::resize::{crop_image, resize_image, zoom_image};

/// Zoom applied to each right-hand crop before enhancement
pub const RIGHT_ZOOM: f64 = 1.6;
/// Width of each row tile in the sprite
pub const SPRITE_W: u32 = 1000;
/// Height of each row tile in the sprite
pub const SPRITE_H: u32 = 130;
/// Width of the row-number column on the left of the sprite
pub const LABEL_W: u32 = 120;
/// Quality used for every JPEG written by the sprite pipeline
pub const JPEG_QUALITY: u8 = 92;

const LABEL_OFFSET_X: i32 = 10;
const LABEL_OFFSET_Y: i32 = 8;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Composite of all ten right-hand crops plus the pieces it was built from
#[derive(Debug)]
pub struct Sprite {
    pub image: RgbImage,
    /// Enhanced tiles in row order, kept for diagnostics
    pub tiles: Vec<RgbImage>,
    pub geometry: SpriteGeometry,
}

/// Builds the "right side only" sprite for one abacus photo
pub struct SpriteBuilder {
    labels: LabelRenderer,
}

impl SpriteBuilder {
    pub fn new(labels: LabelRenderer) -> Self {
        Self { labels }
    }

    /// Canvas size of every sprite: label column plus tile width, ten tiles tall
    pub fn canvas_dimensions() -> (u32, u32) {
        (LABEL_W + SPRITE_W, SPRITE_H * ROW_COUNT)
    }

    pub fn build(&self, img: &RgbImage) -> Result<Sprite> {
        let (width, height) = img.dimensions();
        let geometry = SpriteGeometry::compute(width, height)?;

        if geometry.margins_discarded {
            warn!(
                "Trimmed region too short on {}x{} image, rows span the full height",
                width, height
            );
        }
        debug!(
            "Sprite geometry: rows {}..{} (band {}px), right crop from x={}",
            geometry.top, geometry.bottom, geometry.band_height, geometry.right_x0
        );

        let (canvas_width, canvas_height) = Self::canvas_dimensions();
        let mut canvas = RgbImage::from_pixel(canvas_width, canvas_height, BACKGROUND);
        let mut tiles = Vec::with_capacity(ROW_COUNT as usize);

        for band in geometry.bands() {
            let tile = self
                .build_tile(img, &geometry, &band)
                .with_context(|| format!("Failed to build tile for row {}", band.index))?;

            let y_off = (band.index - 1) * SPRITE_H;
            imageops::replace(&mut canvas, &tile, LABEL_W as i64, y_off as i64);
            self.labels.draw(
                &mut canvas,
                LABEL_OFFSET_X,
                y_off as i32 + LABEL_OFFSET_Y,
                &band.index.to_string(),
                LABEL_COLOR,
            );

            tiles.push(tile);
        }

        Ok(Sprite {
            image: canvas,
            tiles,
            geometry,
        })
    }

    /// Crop the right-hand side of one band, zoom, enhance and fit it to the tile size
    fn build_tile(&self, img: &RgbImage, geometry: &SpriteGeometry, band: &RowBand) -> Result<RgbImage> {
        let right = crop_image(
            img,
            geometry.right_x0,
            band.y1,
            geometry.right_width(),
            band.height(),
        )?;
        let zoomed = zoom_image(&right, RIGHT_ZOOM)?;
        let enhanced = enhance_right_crop(&zoomed);
        resize_image(&enhanced, SPRITE_W, SPRITE_H)
    }
}

/// Write `img` as a JPEG at [`JPEG_QUALITY`]
pub fn save_jpeg(img: &RgbImage, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create JPEG: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
    img.write_with_encoder(encoder)
        .with_context(|| format!("Failed to encode JPEG: {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write JPEG: {}", path.display()))
}
