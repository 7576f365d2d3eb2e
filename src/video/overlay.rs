//! Caption overlay: word wrap, layout, and rasterization onto a transparent
//! frame-sized layer.

use std::path::PathBuf;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
const STROKE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);
const PANEL_COLOR: Rgba<u8> = Rgba([0, 0, 0, 153]);

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub width: u32,
    pub height: u32,
    pub font_size: f32,
    pub wrap_width: usize,
    pub bottom_margin: u32,
    pub padding_x: u32,
    pub padding_y: u32,
    pub corner_radius: u32,
    pub stroke_width: i32,
}

impl OverlayStyle {
    pub fn new(width: u32, height: u32, font_size: f32, wrap_width: usize, bottom_margin: u32) -> Self {
        Self {
            width,
            height,
            font_size,
            wrap_width,
            bottom_margin,
            padding_x: 30,
            padding_y: 20,
            corner_radius: 24,
            stroke_width: 3,
        }
    }
}

/// Greedy word wrap by character count.
///
/// Words are never split, so a word longer than `width` sits alone on its line.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// First candidate that can be read and parsed as a font.
pub fn load_font(candidates: &[PathBuf]) -> Result<FontArc> {
    for path in candidates {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        match FontArc::try_from_vec(bytes) {
            Ok(font) => {
                debug!("Using font {}", path.display());
                return Ok(font);
            }
            Err(e) => warn!("Font {} could not be parsed: {}", path.display(), e),
        }
    }
    Err(PipelineError::Render(format!(
        "no usable font among {} candidates",
        candidates.len()
    )))
}

/// Where the text block and its panel land in the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLayout {
    /// Top-left corner of each line
    pub lines: Vec<(i32, i32)>,
    pub panel: Rect,
}

/// Center each line horizontally and stack them so the block ends
/// `bottom_margin` pixels above the bottom edge.
pub fn layout_text(line_widths: &[u32], line_height: u32, style: &OverlayStyle) -> TextLayout {
    let block_width = line_widths.iter().copied().max().unwrap_or(0);
    let block_height = line_height * line_widths.len() as u32;
    let top = style
        .height
        .saturating_sub(style.bottom_margin)
        .saturating_sub(block_height)
        .max(style.padding_y);

    let lines = line_widths
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            let x = (style.width.saturating_sub(w) / 2) as i32;
            let y = (top + line_height * i as u32) as i32;
            (x, y)
        })
        .collect();

    let panel_width = (block_width + 2 * style.padding_x).min(style.width).max(1);
    let panel_height = (block_height + 2 * style.padding_y).max(1);
    let panel = Rect::at(
        (style.width.saturating_sub(panel_width) / 2) as i32,
        (top - style.padding_y) as i32,
    )
    .of_size(panel_width, panel_height);

    TextLayout { lines, panel }
}

/// Filled rectangle with rounded corners. Pixels are overwritten, not blended.
pub fn draw_rounded_panel(canvas: &mut RgbaImage, rect: Rect, radius: u32, color: Rgba<u8>) {
    let radius = radius.min(rect.width() / 2).min(rect.height() / 2);
    let r = radius as i32;

    if radius == 0 {
        draw_filled_rect_mut(canvas, rect, color);
        return;
    }

    let inner_width = rect.width() - 2 * radius;
    let inner_height = rect.height() - 2 * radius;
    if inner_width > 0 {
        draw_filled_rect_mut(
            canvas,
            Rect::at(rect.left() + r, rect.top()).of_size(inner_width, rect.height()),
            color,
        );
    }
    if inner_height > 0 {
        draw_filled_rect_mut(
            canvas,
            Rect::at(rect.left(), rect.top() + r).of_size(rect.width(), inner_height),
            color,
        );
    }
    for (cx, cy) in [
        (rect.left() + r, rect.top() + r),
        (rect.right() - r, rect.top() + r),
        (rect.left() + r, rect.bottom() - r),
        (rect.right() - r, rect.bottom() - r),
    ] {
        draw_filled_circle_mut(canvas, (cx, cy), r, color);
    }
}

/// Transparent frame-sized layer with the panel behind the text block.
pub fn panel_layer(layout: &TextLayout, style: &OverlayStyle) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(style.width, style.height, Rgba([0, 0, 0, 0]));
    if !layout.lines.is_empty() {
        draw_rounded_panel(&mut canvas, layout.panel, style.corner_radius, PANEL_COLOR);
    }
    canvas
}

/// Rasterize the wrapped quote on a transparent layer the size of the frame.
///
/// Glyphs are placed one by one without script shaping, so Devanagari
/// conjuncts and vowel signs are drawn in their isolated forms.
pub fn render_overlay(quote: &str, font: &FontArc, style: &OverlayStyle) -> RgbaImage {
    let scale = PxScale::from(style.font_size);
    let scaled = font.as_scaled(scale);
    let line_height = (scaled.height() + scaled.line_gap()).ceil().max(1.0) as u32;

    let lines = wrap_text(quote, style.wrap_width);
    let widths: Vec<u32> = lines
        .iter()
        .map(|line| text_size(scale, font, line).0)
        .collect();
    let layout = layout_text(&widths, line_height, style);

    let mut canvas = panel_layer(&layout, style);

    let s = style.stroke_width;
    for (line, &(x, y)) in lines.iter().zip(&layout.lines) {
        for dx in -s..=s {
            for dy in -s..=s {
                if (dx, dy) != (0, 0) && dx * dx + dy * dy <= s * s {
                    draw_text_mut(&mut canvas, STROKE_COLOR, x + dx, y + dy, scale, font, line);
                }
            }
        }
        draw_text_mut(&mut canvas, TEXT_COLOR, x, y, scale, font, line);
    }

    canvas
}
