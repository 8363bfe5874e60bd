//! Text rasterization into coverage masks.

use super::bitmap_font;
use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Single-channel coverage, 0 (empty) to 255 (solid)
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Mask {
    pub width: u32,
    pub height: u32,
    pub coverage: Vec<u8>,
}

impl Mask {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            coverage: vec![0; (width as usize) * (height as usize)],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.coverage[(y as usize) * (self.width as usize) + x as usize]
    }

    fn raise(&mut self, x: i64, y: i64, value: u8) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let index = (y as usize) * (self.width as usize) + x as usize;
        self.coverage[index] = self.coverage[index].max(value);
    }

    /// Grow the mask by `radius` on every side, taking the maximum coverage
    /// within a disc of that radius
    pub fn dilate(&self, radius: u32) -> Mask {
        let r = i64::from(radius);
        let mut out = Mask::new(self.width + 2 * radius, self.height + 2 * radius);

        let offsets: Vec<(i64, i64)> = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .filter(|(dx, dy)| dx * dx + dy * dy <= r * r)
            .collect();

        for y in 0..self.height {
            for x in 0..self.width {
                let value = self.get(x, y);
                if value == 0 {
                    continue;
                }
                let cx = i64::from(x) + r;
                let cy = i64::from(y) + r;
                for (dx, dy) in &offsets {
                    out.raise(cx + dx, cy + dy, value);
                }
            }
        }
        out
    }
}

/// Where glyph shapes come from
pub(crate) enum GlyphSource {
    Outline { font: FontVec, path: PathBuf },
    Bitmap,
}

impl std::fmt::Debug for GlyphSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outline { path, .. } => f.debug_tuple("Outline").field(path).finish(),
            Self::Bitmap => f.write_str("Bitmap"),
        }
    }
}

impl GlyphSource {
    /// First font in `paths` that loads, else the built-in bitmap font
    pub fn load(paths: &[PathBuf]) -> Self {
        for path in paths {
            match load_font(path) {
                Ok(font) => {
                    debug!(path = %path.display(), "Loaded watermark font");
                    return Self::Outline {
                        font,
                        path: path.clone(),
                    };
                }
                Err(message) => {
                    debug!(path = %path.display(), error = %message, "Font not usable");
                }
            }
        }

        if !paths.is_empty() {
            warn!("No configured font could be loaded; using built-in bitmap font");
        }
        Self::Bitmap
    }

    /// Rasterize one line of text at roughly `size` pixels tall
    pub fn rasterize(&self, text: &str, size: f32) -> Mask {
        match self {
            Self::Outline { font, .. } => rasterize_outline(font, text, size),
            Self::Bitmap => rasterize_bitmap(text, size),
        }
    }
}

fn load_font(path: &Path) -> Result<FontVec, String> {
    let data = std::fs::read(path).map_err(|e| e.to_string())?;
    FontVec::try_from_vec(data).map_err(|e| e.to_string())
}

fn rasterize_outline(font: &FontVec, text: &str, size: f32) -> Mask {
    let scale = PxScale::from(size);
    let scaled = font.as_scaled(scale);
    let ascent = scaled.ascent();

    let mut caret = 0.0f32;
    let mut previous = None;
    let mut glyphs = Vec::new();
    for c in text.chars().filter(|c| !c.is_control()) {
        let id = scaled.glyph_id(c);
        if let Some(previous) = previous {
            caret += scaled.kern(previous, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(caret, ascent)));
        caret += scaled.h_advance(id);
        previous = Some(id);
    }

    let width = caret.ceil().max(0.0) as u32;
    let height = (scaled.ascent() - scaled.descent()).ceil().max(0.0) as u32;
    let mut mask = Mask::new(width, height);

    for glyph in glyphs {
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            let left = bounds.min.x.floor() as i64;
            let top = bounds.min.y.floor() as i64;
            outlined.draw(|x, y, c| {
                let value = (c.clamp(0.0, 1.0) * 255.0).round() as u8;
                mask.raise(left + i64::from(x), top + i64::from(y), value);
            });
        }
    }
    mask
}

fn rasterize_bitmap(text: &str, size: f32) -> Mask {
    let cell = ((size / bitmap_font::GLYPH_HEIGHT as f32).round() as u32).max(1);
    let chars: Vec<char> = text.chars().filter(|c| !c.is_control()).collect();
    if chars.is_empty() {
        return Mask::new(0, 0);
    }

    let count = chars.len() as u32;
    let width = (count * bitmap_font::ADVANCE - 1) * cell;
    let height = bitmap_font::GLYPH_HEIGHT * cell;
    let mut mask = Mask::new(width, height);

    for (index, c) in chars.into_iter().enumerate() {
        let Some(rows) = bitmap_font::glyph(c) else {
            continue;
        };
        let origin = index as u32 * bitmap_font::ADVANCE * cell;
        for gy in 0..bitmap_font::GLYPH_HEIGHT {
            for gx in 0..bitmap_font::GLYPH_WIDTH {
                if !bitmap_font::is_set(&rows, gx, gy) {
                    continue;
                }
                for py in 0..cell {
                    for px in 0..cell {
                        mask.raise(
                            i64::from(origin + gx * cell + px),
                            i64::from(gy * cell + py),
                            255,
                        );
                    }
                }
            }
        }
    }
    mask
}

#[cfg(test)]
#[path = "text_tests.rs"]
mod tests;
