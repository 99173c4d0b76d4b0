use anyhow::Result;

/// Fraction of the image height trimmed from the top before slicing rows
pub const TOP_RATIO: f64 = 0.08;
/// Fraction of the image height trimmed from the bottom before slicing rows
pub const BOTTOM_RATIO: f64 = 0.08;
/// How far the "center" is pulled to the left, as a fraction of the width
pub const CENTER_SHIFT_PCT: f64 = 0.035;
/// Fraction of the width kept on the right-hand side of each row
pub const RIGHT_FRACTION: f64 = 0.55;
/// Number of abacus rows on the board
pub const ROW_COUNT: u32 = 10;
/// Usable regions at or below this height fall back to the full image
pub const MIN_USABLE_HEIGHT: u32 = 10;

/// Vertical span of one abacus row inside the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBand {
    /// 1-based row number, top to bottom
    pub index: u32,
    pub y1: u32,
    pub y2: u32,
}

impl RowBand {
    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

/// Row layout computed for one source image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteGeometry {
    pub width: u32,
    pub height: u32,
    pub top: u32,
    pub bottom: u32,
    pub band_height: u32,
    /// Left edge of every right-hand crop
    pub right_x0: u32,
    /// True when the top/bottom margins were dropped because the trimmed
    /// region was too short. Row boundaries then span the whole image.
    pub margins_discarded: bool,
}

impl SpriteGeometry {
    /// Compute the usable region, band height and right-crop start for a `width`x`height` image
    pub fn compute(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow::anyhow!("Image has no pixels: {}x{}", width, height));
        }

        let (top, bottom, margins_discarded) = usable_region(height);
        let usable = bottom - top;
        let band_height = (usable / ROW_COUNT).max(1);

        Ok(Self {
            width,
            height,
            top,
            bottom,
            band_height,
            right_x0: right_crop_start(width),
            margins_discarded,
        })
    }

    pub fn usable_height(&self) -> u32 {
        self.bottom - self.top
    }

    /// The ten bands in row order. The last band absorbs the rounding remainder.
    ///
    /// On images shorter than ten rows the trailing bands are clamped to the
    /// last pixel row, so every band stays at least one pixel tall.
    pub fn bands(&self) -> Vec<RowBand> {
        (0..ROW_COUNT)
            .map(|i| {
                let y1 = (self.top + i * self.band_height).min(self.bottom - 1);
                let y2 = if i == ROW_COUNT - 1 {
                    self.bottom
                } else {
                    (y1 + self.band_height).min(self.bottom)
                };
                RowBand { index: i + 1, y1, y2 }
            })
            .collect()
    }

    /// Width of every right-hand crop
    pub fn right_width(&self) -> u32 {
        self.width - self.right_x0
    }
}

/// Trim the top and bottom margins, falling back to the full height when the rest is too short
fn usable_region(height: u32) -> (u32, u32, bool) {
    let top = (height as f64 * TOP_RATIO) as u32;
    let bottom = (height as f64 * (1.0 - BOTTOM_RATIO)) as u32;

    if bottom <= top + MIN_USABLE_HEIGHT {
        (0, height, true)
    } else {
        (top, bottom, false)
    }
}

/// Start of the right-hand region. Never right of the shifted center,
/// so every crop reaches at least to the middle of the board.
fn right_crop_start(width: u32) -> u32 {
    let center_x = (width as f64 * (0.5 - CENTER_SHIFT_PCT)) as u32;
    let center_x = center_x.min(width - 1);

    let right_x0 = width.saturating_sub((width as f64 * RIGHT_FRACTION) as u32);
    right_x0.min(center_x)
}
