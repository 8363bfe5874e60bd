//! # Watermark Transform
//!
//! Pure byte-in, byte-out renderer. It knows nothing about locks, markers or
//! the store, and the pipeline only sees it through [`Transform`].
//!
//! The output is always a baseline JPEG. Two layouts exist:
//!
//! - **Logo**: the brand logo, scaled to a share of the image width, sits on
//!   a semi-opaque dark box near the bottom-right corner.
//! - **Text**: stroked text (white fill, dark stroke) at `max(24, 5% of
//!   width)` pixels, bottom-right with a margin of 2% of the width.
//!
//! Both layouts draw a full-width accent bar along the bottom edge.
//!
//! Rendering is deterministic: the same input bytes and configuration always
//! produce the same output bytes.

mod bitmap_font;
mod text;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ExtendedColorType, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use text::{GlyphSource, Mask};
use thiserror::Error;
use tracing::{debug, warn};

/// Smallest text size in pixels
const MIN_TEXT_SIZE: f32 = 24.0;

/// Text size as a share of image width
const TEXT_SIZE_RATIO: f32 = 0.05;

/// Margin as a share of image width
const MARGIN_RATIO: f32 = 0.02;

/// Stroke width around text glyphs
const STROKE_RADIUS: u32 = 2;

/// Opacity of text fill and stroke
const TEXT_ALPHA: u8 = 240;

/// Opacity of the box behind the logo
const BACKING_ALPHA: u8 = 150;

/// Accent bar height as a share of image height
const ACCENT_RATIO: f32 = 0.012;

/// Smallest accent bar height in pixels
const MIN_ACCENT_HEIGHT: u32 = 4;

const WHITE: [u8; 3] = [255, 255, 255];
const BLACK: [u8; 3] = [0, 0, 0];
const BACKING: [u8; 3] = [16, 16, 16];

/// Media type of everything the watermarker produces
pub const OUTPUT_MEDIA_TYPE: &str = "image/jpeg";

// ============================================================================
// Core Trait
// ============================================================================

/// Byte-level image transform
pub trait Transform: Send + Sync {
    /// Produce the replacement payload for `input`
    fn render(&self, input: &[u8]) -> Result<Vec<u8>, TransformError>;

    /// Media type of the rendered payload
    fn output_media_type(&self) -> &str {
        OUTPUT_MEDIA_TYPE
    }

    /// File extension of the rendered payload, without the dot
    fn output_extension(&self) -> &str {
        "jpg"
    }
}

/// Transform errors
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    #[error("Failed to decode input image: {message}")]
    Decode { message: String },

    #[error("Input image has no pixels")]
    EmptyImage,

    #[error("Failed to encode output image: {message}")]
    Encode { message: String },

    #[error("Render task did not complete: {message}")]
    Aborted { message: String },
}

// ============================================================================
// Configuration
// ============================================================================

/// Watermark appearance settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Brand logo; when it loads, the logo layout is used
    pub logo_path: Option<PathBuf>,

    /// Candidate TrueType/OpenType fonts, tried in order
    pub font_paths: Vec<PathBuf>,

    /// Text drawn by the text layout
    pub text: String,

    /// Logo width as a share of image width
    pub logo_width_ratio: f32,

    /// JPEG quality, 1 to 100
    pub jpeg_quality: u8,

    /// Accent bar colour
    pub accent_color: [u8; 3],
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            logo_path: None,
            font_paths: vec![
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf"),
                PathBuf::from("/usr/share/fonts/TTF/DejaVuSans-Bold.ttf"),
                PathBuf::from("/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf"),
            ],
            text: "WATERMARK".to_string(),
            logo_width_ratio: 0.18,
            jpeg_quality: 90,
            accent_color: [200, 16, 46],
        }
    }
}

// ============================================================================
// Watermarker
// ============================================================================

/// Default [`Transform`]; logo and font are loaded once at construction
pub struct Watermarker {
    config: WatermarkConfig,
    logo: Option<RgbaImage>,
    glyphs: GlyphSource,
}

impl fmt::Debug for Watermarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watermarker")
            .field("config", &self.config)
            .field("logo", &self.logo.as_ref().map(|l| l.dimensions()))
            .field("glyphs", &self.glyphs)
            .finish()
    }
}

impl Watermarker {
    /// Load assets named by `config`
    ///
    /// A logo that cannot be read selects the text layout instead of failing.
    pub fn new(config: WatermarkConfig) -> Self {
        let logo = config
            .logo_path
            .as_ref()
            .and_then(|path| match image::open(path) {
                Ok(logo) => {
                    debug!(path = %path.display(), "Loaded watermark logo");
                    Some(logo.to_rgba8())
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Logo not usable; using text watermark");
                    None
                }
            })
            .filter(|logo| logo.width() > 0 && logo.height() > 0);

        let glyphs = GlyphSource::load(&config.font_paths);

        Self {
            config,
            logo,
            glyphs,
        }
    }

    /// Whether the logo layout is in use
    pub fn has_logo(&self) -> bool {
        self.logo.is_some()
    }

    pub fn config(&self) -> &WatermarkConfig {
        &self.config
    }

    fn draw_logo(&self, canvas: &mut RgbaImage, logo: &RgbaImage, bottom: u32) {
        let (width, _) = canvas.dimensions();
        let margin = margin_for(width);

        let target_width = ((width as f32 * self.config.logo_width_ratio).round() as u32)
            .clamp(1, width);
        let target_height = ((u64::from(logo.height()) * u64::from(target_width)
            / u64::from(logo.width())) as u32)
            .max(1);
        let scaled = imageops::resize(
            logo,
            target_width,
            target_height,
            imageops::FilterType::Lanczos3,
        );

        let padding = (margin / 2).max(4);
        let box_width = target_width + 2 * padding;
        let box_height = target_height + 2 * padding;
        let box_left = i64::from(width) - i64::from(margin) - i64::from(box_width);
        let box_top = i64::from(bottom) - i64::from(margin) - i64::from(box_height);

        fill_rect(
            canvas,
            box_left,
            box_top,
            box_width,
            box_height,
            BACKING,
            BACKING_ALPHA,
        );
        imageops::overlay(
            canvas,
            &scaled,
            box_left + i64::from(padding),
            box_top + i64::from(padding),
        );
    }

    fn draw_text(&self, canvas: &mut RgbaImage, bottom: u32) {
        let text = self.config.text.trim();
        if text.is_empty() {
            return;
        }

        let (width, _) = canvas.dimensions();
        let size = (width as f32 * TEXT_SIZE_RATIO).max(MIN_TEXT_SIZE);
        let margin = i64::from(margin_for(width));

        let fill = self.glyphs.rasterize(text, size);
        if fill.width == 0 || fill.height == 0 {
            return;
        }
        let stroke = fill.dilate(STROKE_RADIUS);

        let left = i64::from(width) - margin - i64::from(stroke.width);
        let top = i64::from(bottom) - margin - i64::from(stroke.height);
        let inset = i64::from(STROKE_RADIUS);

        paint_mask(canvas, &stroke, left, top, BLACK);
        paint_mask(canvas, &fill, left + inset, top + inset, WHITE);
    }
}

impl Transform for Watermarker {
    fn render(&self, input: &[u8]) -> Result<Vec<u8>, TransformError> {
        let decoded = image::load_from_memory(input).map_err(|e| TransformError::Decode {
            message: e.to_string(),
        })?;

        let mut canvas = decoded.to_rgba8();
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return Err(TransformError::EmptyImage);
        }

        let bar_height = accent_height_for(height);
        let content_bottom = height.saturating_sub(bar_height);

        match &self.logo {
            Some(logo) => self.draw_logo(&mut canvas, logo, content_bottom),
            None => self.draw_text(&mut canvas, content_bottom),
        }
        fill_rect(
            &mut canvas,
            0,
            i64::from(content_bottom),
            width,
            bar_height,
            self.config.accent_color,
            u8::MAX,
        );

        let rgb = image::DynamicImage::ImageRgba8(canvas).to_rgb8();
        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, self.config.jpeg_quality);
        encoder
            .encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| TransformError::Encode {
                message: e.to_string(),
            })?;

        Ok(output)
    }
}

// ============================================================================
// Drawing helpers
// ============================================================================

fn margin_for(width: u32) -> u32 {
    (width as f32 * MARGIN_RATIO).round() as u32
}

fn accent_height_for(height: u32) -> u32 {
    ((height as f32 * ACCENT_RATIO).round() as u32)
        .max(MIN_ACCENT_HEIGHT)
        .min(height)
}

/// Mix `color` over `pixel` with `alpha` (0-255)
fn blend(pixel: &mut Rgba<u8>, color: [u8; 3], alpha: u32) {
    if alpha == 0 {
        return;
    }
    let keep = 255 - alpha;
    for channel in 0..3 {
        let mixed = u32::from(pixel.0[channel]) * keep + u32::from(color[channel]) * alpha;
        pixel.0[channel] = ((mixed + 127) / 255) as u8;
    }
}

/// Blend a rectangle, clipped to the canvas
fn fill_rect(
    canvas: &mut RgbaImage,
    left: i64,
    top: i64,
    width: u32,
    height: u32,
    color: [u8; 3],
    alpha: u8,
) {
    let (cw, ch) = canvas.dimensions();
    let x0 = left.clamp(0, i64::from(cw)) as u32;
    let y0 = top.clamp(0, i64::from(ch)) as u32;
    let x1 = (left + i64::from(width)).clamp(0, i64::from(cw)) as u32;
    let y1 = (top + i64::from(height)).clamp(0, i64::from(ch)) as u32;

    for y in y0..y1 {
        for x in x0..x1 {
            blend(canvas.get_pixel_mut(x, y), color, u32::from(alpha));
        }
    }
}

/// Paint `color` through a coverage mask placed at (`left`, `top`)
fn paint_mask(canvas: &mut RgbaImage, mask: &Mask, left: i64, top: i64, color: [u8; 3]) {
    let (cw, ch) = canvas.dimensions();
    for my in 0..mask.height {
        let y = top + i64::from(my);
        if y < 0 || y >= i64::from(ch) {
            continue;
        }
        for mx in 0..mask.width {
            let x = left + i64::from(mx);
            if x < 0 || x >= i64::from(cw) {
                continue;
            }
            let coverage = u32::from(mask.get(mx, my));
            let alpha = (coverage * u32::from(TEXT_ALPHA) + 127) / 255;
            blend(canvas.get_pixel_mut(x as u32, y as u32), color, alpha);
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
