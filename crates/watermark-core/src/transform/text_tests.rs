use super::*;

fn solid_pixels(mask: &Mask) -> usize {
    mask.coverage.iter().filter(|&&c| c == 255).count()
}

#[test]
fn test_missing_fonts_fall_back_to_bitmap() {
    let source = GlyphSource::load(&[PathBuf::from("/nonexistent/font.ttf")]);
    assert!(matches!(source, GlyphSource::Bitmap));
}

#[test]
fn test_non_font_file_falls_back_to_bitmap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-font.ttf");
    std::fs::write(&path, b"definitely not a font").unwrap();

    let source = GlyphSource::load(&[path]);
    assert!(matches!(source, GlyphSource::Bitmap));
}

#[test]
fn test_bitmap_dimensions_scale_with_size() {
    // 28px rounds to a 4px cell
    let mask = GlyphSource::Bitmap.rasterize("AB", 28.0);
    assert_eq!(mask.height, 7 * 4);
    assert_eq!(mask.width, (2 * 6 - 1) * 4);
}

#[test]
fn test_bitmap_lowercase_matches_uppercase() {
    let lower = GlyphSource::Bitmap.rasterize("wm", 14.0);
    let upper = GlyphSource::Bitmap.rasterize("WM", 14.0);
    assert_eq!(lower, upper);
}

#[test]
fn test_bitmap_unknown_glyph_is_blank_advance() {
    let mask = GlyphSource::Bitmap.rasterize("~", 7.0);
    assert_eq!(mask.width, 5);
    assert_eq!(solid_pixels(&mask), 0);
}

#[test]
fn test_bitmap_empty_text() {
    let mask = GlyphSource::Bitmap.rasterize("", 24.0);
    assert_eq!((mask.width, mask.height), (0, 0));
}

#[test]
fn test_bitmap_glyph_shape() {
    let mask = GlyphSource::Bitmap.rasterize("T", 7.0);
    // Top bar fully set, stem in the middle column
    for x in 0..5 {
        assert_eq!(mask.get(x, 0), 255);
    }
    assert_eq!(mask.get(2, 6), 255);
    assert_eq!(mask.get(0, 6), 0);
}

#[test]
fn test_dilate_grows_by_radius() {
    let mask = GlyphSource::Bitmap.rasterize(".", 7.0);
    let dilated = mask.dilate(2);

    assert_eq!(dilated.width, mask.width + 4);
    assert_eq!(dilated.height, mask.height + 4);
    assert!(solid_pixels(&dilated) > solid_pixels(&mask));

    // Every solid source pixel stays solid at its shifted position
    for y in 0..mask.height {
        for x in 0..mask.width {
            if mask.get(x, y) == 255 {
                assert_eq!(dilated.get(x + 2, y + 2), 255);
            }
        }
    }
}
