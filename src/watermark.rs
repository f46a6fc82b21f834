//! Time/location watermark burned into captured photos.
//!
//! Text is drawn with a built-in 5×7 bitmap font on a semi-opaque box
//! anchored to the bottom-left corner. The box is sized to the widest
//! rendered line so long address labels are never clipped by the
//! background. Characters outside the font (e.g. CJK addresses) render as
//! a hollow box of the same advance.
//!
//! Two renderers are provided:
//! - **[`BitmapWatermark`]**: decodes, stamps, and re-encodes as JPEG.
//! - **[`DisabledWatermark`]**: always fails; used when
//!   `watermark.enabled = false` so the capture pipeline takes its normal
//!   fallback path.

use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgba, RgbaImage};

use crate::config::WatermarkConfig;
use crate::error::WatermarkError;
use crate::geo::{coordinate_label, is_coordinate_label};
use crate::models::Coordinates;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_ADVANCE: u32 = 6;
const LINE_ADVANCE: u32 = 9;
const INNER_PAD: u32 = 3;

/// What to write onto a photo.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkStamp {
    pub timestamp: String,
    pub location_label: Option<String>,
    pub coordinates: Option<Coordinates>,
}

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Whether chrono can format with `pattern` without hitting an unknown
/// specifier.
pub fn is_valid_timestamp_format(pattern: &str) -> bool {
    !pattern.trim().is_empty()
        && !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

/// Formats `now` for the stamp. A format chrono rejects falls back to
/// [`DEFAULT_TIMESTAMP_FORMAT`] instead of panicking inside `Display`.
pub fn format_timestamp<Tz>(now: &DateTime<Tz>, pattern: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut out = String::new();
    if is_valid_timestamp_format(pattern) && write!(out, "{}", now.format(pattern)).is_ok() {
        return out;
    }
    tracing::warn!(format = pattern, "invalid timestamp format, using default");
    now.format(DEFAULT_TIMESTAMP_FORMAT).to_string()
}

/// Text lines, top to bottom: timestamp, location label (unless empty or
/// itself a coordinate string), then the coordinate line when known.
pub fn watermark_lines(stamp: &WatermarkStamp) -> Vec<String> {
    let mut lines = vec![stamp.timestamp.clone()];
    if let Some(label) = stamp.location_label.as_deref().map(str::trim) {
        if !label.is_empty() && !is_coordinate_label(label) {
            lines.push(label.to_string());
        }
    }
    if let Some(coordinates) = stamp.coordinates {
        lines.push(coordinate_label(coordinates));
    }
    lines
}

/// Renders a stamp from `source` into a new image file at `dest`.
///
/// Implementations are CPU-bound and synchronous; the capture pipeline
/// runs them on the blocking pool.
pub trait WatermarkRenderer: Send + Sync {
    fn render(
        &self,
        source: &Path,
        dest: &Path,
        stamp: &WatermarkStamp,
    ) -> Result<(), WatermarkError>;
}

/// Renderer that never stamps.
pub struct DisabledWatermark;

impl WatermarkRenderer for DisabledWatermark {
    fn render(&self, _: &Path, _: &Path, _: &WatermarkStamp) -> Result<(), WatermarkError> {
        Err(WatermarkError::Backend(
            "watermarking is disabled".to_string(),
        ))
    }
}

/// Pixel rectangle of the watermark background, inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub scale: u32,
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

pub struct BitmapWatermark {
    scale: u32,
    padding: u32,
    opacity: u8,
    jpeg_quality: u8,
}

impl Default for BitmapWatermark {
    fn default() -> Self {
        Self::from_config(&WatermarkConfig::default())
    }
}

impl BitmapWatermark {
    pub fn from_config(config: &WatermarkConfig) -> Self {
        Self {
            scale: config.scale,
            padding: config.padding,
            opacity: config.opacity,
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
        }
    }

    fn scale_for(&self, width: u32, height: u32) -> u32 {
        if self.scale > 0 {
            self.scale
        } else {
            (width.min(height) / 360).max(1)
        }
    }

    /// Where the background box for `lines` lands on a `width`×`height`
    /// image. `None` for an empty image or no lines.
    pub fn placement(&self, width: u32, height: u32, lines: &[String]) -> Option<Placement> {
        if width == 0 || height == 0 || lines.is_empty() {
            return None;
        }
        let scale = self.scale_for(width, height);
        let widest = lines.iter().map(|l| l.chars().count() as u32).max()?;
        let text_w = (widest * GLYPH_ADVANCE).saturating_sub(1) * scale;
        let text_h = ((lines.len() as u32 - 1) * LINE_ADVANCE + GLYPH_HEIGHT) * scale;
        let box_w = text_w + 2 * INNER_PAD * scale;
        let box_h = text_h + 2 * INNER_PAD * scale;

        let left = self.padding.min(width - 1);
        let bottom = height.saturating_sub(1 + self.padding);
        let top = bottom.saturating_sub(box_h.saturating_sub(1));
        let right = (left + box_w.saturating_sub(1)).min(width - 1);

        Some(Placement {
            scale,
            left,
            top,
            right,
            bottom,
        })
    }

    /// Draws `lines` onto `image` in place.
    pub fn stamp_image(&self, image: &mut RgbaImage, lines: &[String]) {
        let Some(place) = self.placement(image.width(), image.height(), lines) else {
            return;
        };

        darken_rect(image, place, self.opacity);

        let text_color = Rgba([255, 255, 255, 255]);
        let x0 = place.left + INNER_PAD * place.scale;
        let mut y = place.top + INNER_PAD * place.scale;
        for line in lines {
            draw_text(image, x0, y, line, place.scale, text_color);
            y += LINE_ADVANCE * place.scale;
        }
    }
}

impl WatermarkRenderer for BitmapWatermark {
    fn render(
        &self,
        source: &Path,
        dest: &Path,
        stamp: &WatermarkStamp,
    ) -> Result<(), WatermarkError> {
        let decoded = image::open(source).map_err(|e| WatermarkError::Decode {
            path: source.to_path_buf(),
            source: e,
        })?;
        let mut rgba = decoded.to_rgba8();
        self.stamp_image(&mut rgba, &watermark_lines(stamp));

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();
        let mut writer = BufWriter::new(File::create(dest)?);
        JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
            .encode_image(&rgb)
            .map_err(WatermarkError::Encode)?;
        Ok(())
    }
}

fn darken_rect(image: &mut RgbaImage, place: Placement, opacity: u8) {
    let keep = 255 - opacity as u32;
    for y in place.top..=place.bottom {
        for x in place.left..=place.right {
            let px = image.get_pixel_mut(x, y);
            for c in 0..3 {
                px.0[c] = ((px.0[c] as u32 * keep) / 255) as u8;
            }
        }
    }
}

fn draw_text(image: &mut RgbaImage, x: u32, y: u32, text: &str, scale: u32, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    let mut pen_x = x;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        let glyph = glyph_bits(ch);
        for (row, pattern) in glyph.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let px = pen_x + col * scale + dx;
                        let py = y + row as u32 * scale + dy;
                        if px < width && py < height {
                            image.put_pixel(px, py, color);
                        }
                    }
                }
            }
        }
        pen_x += GLYPH_ADVANCE * scale;
        if pen_x >= width {
            break;
        }
    }
}

fn glyph_bits(ch: char) -> [u8; 7] {
    match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        ',' => [0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b00100, 0b01000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '+' => [0b00000, 0b00100, 0b00100, 0b11111, 0b00100, 0b00100, 0b00000],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '#' => [0b01010, 0b01010, 0b11111, 0b01010, 0b11111, 0b01010, 0b01010],
        '&' => [0b01100, 0b10010, 0b10100, 0b01000, 0b10101, 0b10010, 0b01101],
        '\'' => [0b00100, 0b00100, 0b01000, 0b00000, 0b00000, 0b00000, 0b00000],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        ' ' => [0; 7],
        _ => [0b11111, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11111],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stamp(label: Option<&str>, coords: Option<Coordinates>) -> WatermarkStamp {
        WatermarkStamp {
            timestamp: "2024-02-05 10:30:00".to_string(),
            location_label: label.map(str::to_string),
            coordinates: coords,
        }
    }

    #[test]
    fn lines_skip_duplicate_coordinate_label() {
        let coords = Coordinates::new(31.2304, 121.4737);
        let lines = watermark_lines(&stamp(Some("lat:31.2304, lng:121.4737"), Some(coords)));
        assert_eq!(
            lines,
            vec!["2024-02-05 10:30:00", "lat:31.2304, lng:121.4737"]
        );
    }

    #[test]
    fn lines_in_order_with_address() {
        let coords = Coordinates::new(31.2304, 121.4737);
        let lines = watermark_lines(&stamp(Some(" 88 Nanjing Rd "), Some(coords)));
        assert_eq!(
            lines,
            vec![
                "2024-02-05 10:30:00",
                "88 Nanjing Rd",
                "lat:31.2304, lng:121.4737"
            ]
        );
    }

    #[test]
    fn timestamp_only_without_location() {
        assert_eq!(watermark_lines(&stamp(Some(""), None)).len(), 1);
        assert_eq!(watermark_lines(&stamp(None, None)).len(), 1);
    }

    #[test]
    fn unknown_strftime_specifier_falls_back_to_default() {
        let at = chrono::Utc.with_ymd_and_hms(2024, 2, 5, 10, 30, 0).unwrap();
        assert!(!is_valid_timestamp_format("%Y-%Q"));
        assert!(!is_valid_timestamp_format("  "));
        assert!(is_valid_timestamp_format("%d/%m %H:%M"));
        assert_eq!(format_timestamp(&at, "%Y-%Q"), "2024-02-05 10:30:00");
        assert_eq!(format_timestamp(&at, "%d/%m %H:%M"), "05/02 10:30");
    }

    #[test]
    fn box_grows_with_longest_line_and_hugs_bottom_left() {
        let wm = BitmapWatermark {
            scale: 1,
            padding: 10,
            opacity: 150,
            jpeg_quality: 90,
        };
        let short = wm
            .placement(640, 480, &["12:00".to_string()])
            .unwrap();
        let long = wm
            .placement(
                640,
                480,
                &["12:00".to_string(), "a much longer address line".to_string()],
            )
            .unwrap();

        assert_eq!(short.left, 10);
        assert_eq!(short.bottom, 469);
        assert_eq!(long.left, 10);
        assert_eq!(long.bottom, 469);
        assert!(long.right > short.right);
        assert!(long.top < short.top);
        // 26 chars * 6 - 1 + 2 * 3 padding
        assert_eq!(long.right - long.left + 1, 26 * 6 - 1 + 6);
    }

    #[test]
    fn placement_is_clamped_to_tiny_images() {
        let wm = BitmapWatermark::default();
        let place = wm
            .placement(8, 8, &["a long line that cannot fit".to_string()])
            .unwrap();
        assert!(place.right < 8);
        assert!(place.bottom < 8);
        assert!(wm.placement(0, 10, &["x".to_string()]).is_none());
    }

    #[test]
    fn stamp_darkens_bottom_left_only() {
        let wm = BitmapWatermark::default();
        let mut img = RgbaImage::from_pixel(400, 300, Rgba([200, 200, 200, 255]));
        wm.stamp_image(&mut img, &["2024-02-05 10:30:00".to_string()]);

        let top_right = img.get_pixel(399, 0);
        assert_eq!(top_right.0, [200, 200, 200, 255]);

        let place = wm
            .placement(400, 300, &["2024-02-05 10:30:00".to_string()])
            .unwrap();
        let corner = img.get_pixel(place.left, place.bottom);
        assert!(corner.0[0] < 200);
    }

    #[test]
    fn render_writes_jpeg_and_rejects_non_images() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("raw.png");
        RgbaImage::from_pixel(120, 90, Rgba([10, 120, 200, 255]))
            .save(&src)
            .unwrap();

        let dest = tmp.path().join("out/raw_wm.jpg");
        let wm = BitmapWatermark::default();
        wm.render(&src, &dest, &stamp(Some("Store"), None)).unwrap();
        let out = image::open(&dest).unwrap();
        assert_eq!((out.width(), out.height()), (120, 90));

        let bogus = tmp.path().join("notes.jpg");
        std::fs::write(&bogus, b"not an image").unwrap();
        let err = wm
            .render(&bogus, &tmp.path().join("x.jpg"), &stamp(None, None))
            .unwrap_err();
        assert!(matches!(err, WatermarkError::Decode { .. }));
    }
}
