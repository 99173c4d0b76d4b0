use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::debug;

/// Pixel size of the row numbers drawn in the sprite label column
pub const LABEL_FONT_SIZE: f32 = 26.0;

/// 5x7 digit glyphs used when no TrueType font can be found
const BITMAP_DIGITS: [[u8; 7]; 10] = [
    [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111], // 2
    [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110], // 3
    [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110], // 5
    [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000], // 7
    [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100], // 9
];

/// Draws row numbers into the sprite label column
///
/// Uses a TrueType font when one can be located, otherwise a blocky
/// built-in digit bitmap scaled to roughly the same height.
pub struct LabelRenderer {
    font: Option<FontVec>,
    scale: PxScale,
}

impl LabelRenderer {
    /// Locate `font_spec` (name, filename or absolute path) and fall back to the bitmap digits
    pub fn load(font_spec: &str) -> Self {
        let font = match load_font(font_spec) {
            Ok(font) => Some(font),
            Err(e) => {
                debug!("Using bitmap row labels: {:#}", e);
                None
            }
        };

        Self {
            font,
            scale: PxScale::from(LABEL_FONT_SIZE),
        }
    }

    /// Renderer that never touches the filesystem
    pub fn bitmap() -> Self {
        Self {
            font: None,
            scale: PxScale::from(LABEL_FONT_SIZE),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw `text` with its top-left corner at (`x`, `y`)
    pub fn draw(&self, canvas: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        match &self.font {
            Some(font) => draw_text_mut(canvas, color, x, y, self.scale, font, text),
            None => draw_bitmap_text(canvas, x, y, text, color, self.scale.y),
        }
    }
}

/// Draw digits from the built-in bitmap. Non-digit characters are skipped.
fn draw_bitmap_text(canvas: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>, height: f32) {
    let cell = ((height / 7.0).floor() as u32).max(1);
    let advance = (6 * cell) as i32;

    let mut cursor_x = x;
    for ch in text.chars() {
        if let Some(digit) = ch.to_digit(10) {
            let glyph = &BITMAP_DIGITS[digit as usize];
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..5 {
                    if bits & (0b10000 >> col) != 0 {
                        let rect = Rect::at(cursor_x + col * cell as i32, y + row as i32 * cell as i32)
                            .of_size(cell, cell);
                        draw_filled_rect_mut(canvas, rect, color);
                    }
                }
            }
        }
        cursor_x += advance;
    }
}

/// Load a font from a name, a filename or a full path
///
/// Supports three formats:
/// 1. Font name: "Arial" -> searches system font directories
/// 2. Font filename: "Arial.ttf" -> searches in common font directories
/// 3. Full path: "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf" -> loads directly
fn load_font(font_spec: &str) -> Result<FontVec> {
    if is_absolute_path(font_spec) {
        return load_font_from_path(Path::new(font_spec));
    }

    if is_font_filename(font_spec) {
        if let Ok(font) = load_font_by_filename(font_spec) {
            return Ok(font);
        }
    }

    if let Ok(font) = load_system_font(font_spec) {
        return Ok(font);
    }

    let fallback_fonts = [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "/Library/Fonts/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ];

    for font_path in &fallback_fonts {
        if let Ok(font) = load_font_from_path(Path::new(font_path)) {
            return Ok(font);
        }
    }

    Err(anyhow::anyhow!("No usable font found for '{}'", font_spec))
}

/// Check if the input is an absolute path
fn is_absolute_path(path: &str) -> bool {
    path.starts_with('/') ||                           // Unix/Linux/macOS absolute path
    path.starts_with('\\') ||                          // Windows UNC path
    (path.len() > 2 && path.chars().nth(1) == Some(':')) // Windows drive path (C:, D:, etc.)
}

/// Check if the input looks like a font filename
fn is_font_filename(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    lower.ends_with(".ttf") || lower.ends_with(".otf") || lower.ends_with(".ttc")
}

fn load_font_from_path(font_path: &Path) -> Result<FontVec> {
    let font_data = std::fs::read(font_path)
        .with_context(|| format!("Failed to read font file: {}", font_path.display()))?;

    FontVec::try_from_vec(font_data)
        .with_context(|| format!("Failed to parse font file: {}", font_path.display()))
}

fn load_font_by_filename(filename: &str) -> Result<FontVec> {
    for dir in get_system_font_directories() {
        let font_path = Path::new(&expand_path(dir)).join(filename);
        if font_path.exists() {
            if let Ok(font) = load_font_from_path(&font_path) {
                return Ok(font);
            }
        }
    }

    Err(anyhow::anyhow!(
        "Font filename '{}' not found in system directories",
        filename
    ))
}

fn load_system_font(font_name: &str) -> Result<FontVec> {
    let candidates = [
        format!("{}.ttf", font_name),
        format!("{}.ttf", font_name.to_lowercase()),
        format!("{}.otf", font_name),
    ];

    for candidate in &candidates {
        if let Ok(font) = load_font_by_filename(candidate) {
            return Ok(font);
        }
    }

    Err(anyhow::anyhow!("System font '{}' not found", font_name))
}

/// Expand paths with ~ to home directory
fn expand_path(path: &str) -> String {
    if path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

/// Get common system font directories for different platforms
fn get_system_font_directories() -> Vec<&'static str> {
    vec![
        // Linux
        "/usr/share/fonts/truetype/msttcorefonts",
        "/usr/share/fonts/truetype/dejavu",
        "/usr/share/fonts/truetype/liberation",
        "/usr/share/fonts/TTF",
        "/usr/local/share/fonts",
        "~/.fonts",
        "~/.local/share/fonts",
        // macOS
        "/System/Library/Fonts/Supplemental",
        "/Library/Fonts",
        // Windows
        "C:\\Windows\\Fonts",
    ]
}
