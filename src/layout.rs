use std::path::PathBuf;

use image::RgbaImage;
use rusttype::{Font, Scale, point};
use tracing::{debug, warn};

use crate::{
    core::{Canvas, Rgba8},
    error::{QuoteclipError, QuoteclipResult},
    quote::QuoteText,
};

/// Extra pixels between wrapped lines, on top of the font's own height.
const LINE_GAP_PX: f32 = 15.0;
/// Vertical gap between the quote block and the author line.
const AUTHOR_GAP_PX: f32 = 40.0;
/// Padding added around the text when a panel is drawn.
const PANEL_PAD_PX: f32 = 40.0;
/// Panel width as a fraction of the canvas width.
const PANEL_WIDTH_FRAC: f32 = 0.85;
/// Monospace fallback: advance width per character in em units.
const MONO_ADVANCE_EM: f32 = 0.6;

/// Glyph geometry provider. The primary strategy measures an installed font;
/// the fallback uses a fixed-width heuristic so measurement never fails.
pub trait TextMeasurer {
    fn line_width_px(&self, text: &str, size_px: f32) -> f32;
    fn ascent_px(&self, size_px: f32) -> f32;
    fn line_height_px(&self, size_px: f32) -> f32;
}

/// Measurer backed by a loaded TTF/OTF font.
pub struct FontMeasurer {
    font: Font<'static>,
    source: PathBuf,
}

impl FontMeasurer {
    /// Load the first readable font from `paths`.
    pub fn from_paths(paths: &[PathBuf]) -> QuoteclipResult<Self> {
        for path in paths {
            let Ok(bytes) = std::fs::read(path) else {
                continue;
            };
            if let Some(font) = Font::try_from_vec(bytes) {
                return Ok(Self {
                    font,
                    source: path.clone(),
                });
            }
        }
        Err(QuoteclipError::font_unavailable(format!(
            "none of the {} candidate font files could be loaded",
            paths.len()
        )))
    }

    pub fn source(&self) -> &PathBuf {
        &self.source
    }

    fn scale(size_px: f32) -> Scale {
        Scale::uniform(size_px)
    }
}

impl TextMeasurer for FontMeasurer {
    fn line_width_px(&self, text: &str, size_px: f32) -> f32 {
        let scale = Self::scale(size_px);
        let mut width = 0.0f32;
        for g in self.font.layout(text, scale, point(0.0, 0.0)) {
            width = g.position().x + g.unpositioned().h_metrics().advance_width;
        }
        width
    }

    fn ascent_px(&self, size_px: f32) -> f32 {
        self.font.v_metrics(Self::scale(size_px)).ascent
    }

    fn line_height_px(&self, size_px: f32) -> f32 {
        let v = self.font.v_metrics(Self::scale(size_px));
        v.ascent - v.descent
    }
}

/// Fixed-width heuristic used when no font file is available. Wrapping then
/// degrades to plain character counting.
#[derive(Clone, Copy, Debug)]
pub struct MonoMeasurer {
    pub advance_em: f32,
}

impl Default for MonoMeasurer {
    fn default() -> Self {
        Self {
            advance_em: MONO_ADVANCE_EM,
        }
    }
}

impl TextMeasurer for MonoMeasurer {
    fn line_width_px(&self, text: &str, size_px: f32) -> f32 {
        text.chars().count() as f32 * self.advance_em * size_px
    }

    fn ascent_px(&self, size_px: f32) -> f32 {
        size_px * 0.8
    }

    fn line_height_px(&self, size_px: f32) -> f32 {
        size_px
    }
}

/// Measurement strategy selected once at startup, not re-resolved per call.
pub enum Measurer {
    Font(FontMeasurer),
    Mono(MonoMeasurer),
}

impl Measurer {
    /// Prefer an installed font; a missing font is a capability absence, not
    /// an error, so this always succeeds.
    pub fn select(font_paths: &[PathBuf]) -> Self {
        match FontMeasurer::from_paths(font_paths) {
            Ok(m) => {
                debug!(font = %m.source().display(), "using installed font");
                Self::Font(m)
            }
            Err(e) => {
                warn!("{e}; falling back to monospace-width heuristic");
                Self::Mono(MonoMeasurer::default())
            }
        }
    }
}

impl TextMeasurer for Measurer {
    fn line_width_px(&self, text: &str, size_px: f32) -> f32 {
        match self {
            Self::Font(m) => m.line_width_px(text, size_px),
            Self::Mono(m) => m.line_width_px(text, size_px),
        }
    }

    fn ascent_px(&self, size_px: f32) -> f32 {
        match self {
            Self::Font(m) => m.ascent_px(size_px),
            Self::Mono(m) => m.ascent_px(size_px),
        }
    }

    fn line_height_px(&self, size_px: f32) -> f32 {
        match self {
            Self::Font(m) => m.line_height_px(size_px),
            Self::Mono(m) => m.line_height_px(size_px),
        }
    }
}

/// Greedy word-wrap against a pixel budget.
///
/// A single word wider than the budget gets its own line rather than being
/// dropped or broken mid-word.
pub fn wrap_words(
    text: &str,
    size_px: f32,
    max_width_px: f32,
    measurer: &dyn TextMeasurer,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = Vec::<&str>::new();

    for word in text.split_whitespace() {
        current.push(word);
        let candidate = current.join(" ");
        if measurer.line_width_px(&candidate, size_px) <= max_width_px {
            continue;
        }
        if current.len() == 1 {
            // Unbreakable word: give it its own line.
            lines.push(candidate);
            current.clear();
        } else if let Some(overflow) = current.pop() {
            lines.push(current.join(" "));
            current.clear();
            current.push(overflow);
        }
    }
    if !current.is_empty() {
        lines.push(current.join(" "));
    }
    lines
}

/// Wrapped quote geometry, derived deterministically from its inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub line_height: f32,
    pub block_height: f32,
}

/// Transparent raster the exact size of the canvas, with the text (and
/// optional panel) already drawn.
pub struct RasterOverlay {
    pub image: RgbaImage,
    pub block: TextBlock,
}

/// Styling knobs for the overlay.
#[derive(Clone, Debug)]
pub struct LayoutParams {
    pub font_size: f32,
    pub author_font_size: f32,
    pub color: Rgba8,
    pub panel_opacity: f64,
    pub max_chars_per_line: usize,
    pub stroke_width: u32,
    pub stroke_color: Rgba8,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            font_size: 48.0,
            author_font_size: 32.0,
            color: Rgba8::WHITE,
            panel_opacity: 0.25,
            max_chars_per_line: 40,
            stroke_width: 0,
            stroke_color: Rgba8::BLACK,
        }
    }
}

pub struct TextLayoutEngine {
    measurer: Measurer,
    params: LayoutParams,
}

impl TextLayoutEngine {
    pub fn new(measurer: Measurer, params: LayoutParams) -> Self {
        Self { measurer, params }
    }

    /// Pixel budget one wrapped line may occupy.
    ///
    /// `max_chars_per_line` is expressed in character cells of the monospace
    /// heuristic so the budget stays meaningful under both measurers, and is
    /// clamped so text never runs off the canvas.
    fn line_budget_px(&self, canvas: Canvas) -> f32 {
        let chars_budget =
            self.params.max_chars_per_line as f32 * MONO_ADVANCE_EM * self.params.font_size;
        chars_budget.min(canvas.width as f32 * 0.92)
    }

    /// Wrap, measure, and rasterize the quote into a canvas-sized overlay.
    pub fn layout(&self, quote: &QuoteText, canvas: Canvas) -> QuoteclipResult<RasterOverlay> {
        let p = &self.params;
        let budget = self.line_budget_px(canvas);
        let lines = wrap_words(quote.body(), p.font_size, budget, &self.measurer);
        if lines.is_empty() {
            return Err(QuoteclipError::no_quote_available(
                "quote produced no renderable lines",
            ));
        }

        let line_height = self.measurer.line_height_px(p.font_size) + LINE_GAP_PX;
        let block_height = line_height * lines.len() as f32;

        let author_line = quote.author().map(|a| format!("- {a}"));
        let author_height = match author_line {
            Some(_) => AUTHOR_GAP_PX + self.measurer.line_height_px(p.author_font_size),
            None => 0.0,
        };
        let total_height = block_height + author_height;

        let mut image = RgbaImage::new(canvas.width, canvas.height);

        if p.panel_opacity > 0.0 {
            let panel_w = canvas.width as f32 * PANEL_WIDTH_FRAC;
            let panel_h = total_height + 2.0 * PANEL_PAD_PX;
            let panel_x = (canvas.width as f32 - panel_w) / 2.0;
            let panel_y = (canvas.height as f32 - panel_h) / 2.0;
            let alpha = (255.0 * p.panel_opacity).round() as u8;
            fill_rect(
                &mut image,
                panel_x,
                panel_y,
                panel_w,
                panel_h,
                Rgba8 {
                    r: 0,
                    g: 0,
                    b: 0,
                    a: alpha,
                },
            );
        }

        let mut y = (canvas.height as f32 - total_height) / 2.0;
        for line in &lines {
            let width = self.measurer.line_width_px(line, p.font_size);
            let x = (canvas.width as f32 - width) / 2.0;
            self.draw_line(&mut image, line, p.font_size, x, y);
            y += line_height;
        }

        if let Some(author) = author_line {
            y += AUTHOR_GAP_PX;
            let width = self.measurer.line_width_px(&author, p.author_font_size);
            let x = (canvas.width as f32 - width) / 2.0;
            self.draw_line(&mut image, &author, p.author_font_size, x, y);
        }

        Ok(RasterOverlay {
            image,
            block: TextBlock {
                lines,
                line_height,
                block_height,
            },
        })
    }

    /// Draw one line at `(x, top_y)`, stroke passes first, fill on top.
    fn draw_line(&self, image: &mut RgbaImage, text: &str, size_px: f32, x: f32, top_y: f32) {
        let sw = self.params.stroke_width as i32;
        if sw > 0 {
            for dy in -sw..=sw {
                for dx in -sw..=sw {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    self.draw_run(
                        image,
                        text,
                        size_px,
                        x + dx as f32,
                        top_y + dy as f32,
                        self.params.stroke_color,
                    );
                }
            }
        }
        self.draw_run(image, text, size_px, x, top_y, self.params.color);
    }

    /// One pass of one line in one color, with whichever measurer is active.
    fn draw_run(
        &self,
        image: &mut RgbaImage,
        text: &str,
        size_px: f32,
        x: f32,
        top_y: f32,
        color: Rgba8,
    ) {
        match &self.measurer {
            Measurer::Font(m) => draw_glyph_run(image, &m.font, text, size_px, x, top_y, color),
            Measurer::Mono(m) => draw_placeholder_run(image, m, text, size_px, x, top_y, color),
        }
    }
}

fn draw_glyph_run(
    image: &mut RgbaImage,
    font: &Font<'static>,
    text: &str,
    size_px: f32,
    x: f32,
    top_y: f32,
    color: Rgba8,
) {
    let scale = Scale::uniform(size_px);
    let ascent = font.v_metrics(scale).ascent;
    for glyph in font.layout(text, scale, point(x, top_y + ascent)) {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                let px = bb.min.x + gx as i32;
                let py = bb.min.y + gy as i32;
                blend_px(image, px, py, color, coverage);
            });
        }
    }
}

/// Crude per-character blocks for the no-font fallback: layout stays correct,
/// glyph shapes are lost.
fn draw_placeholder_run(
    image: &mut RgbaImage,
    mono: &MonoMeasurer,
    text: &str,
    size_px: f32,
    x: f32,
    top_y: f32,
    color: Rgba8,
) {
    let advance = mono.advance_em * size_px;
    let ascent = mono.ascent_px(size_px);
    let mut cx = x;
    for ch in text.chars() {
        if !ch.is_whitespace() {
            fill_rect(
                image,
                cx + advance * 0.1,
                top_y + ascent * 0.25,
                advance * 0.8,
                ascent * 0.75,
                color,
            );
        }
        cx += advance;
    }
}

fn fill_rect(image: &mut RgbaImage, x: f32, y: f32, w: f32, h: f32, color: Rgba8) {
    let x0 = x.max(0.0) as u32;
    let y0 = y.max(0.0) as u32;
    let x1 = ((x + w).max(0.0) as u32).min(image.width());
    let y1 = ((y + h).max(0.0) as u32).min(image.height());
    for py in y0..y1 {
        for px in x0..x1 {
            image.put_pixel(px, py, image::Rgba([color.r, color.g, color.b, color.a]));
        }
    }
}

/// Straight-alpha "over" blend of a coverage-weighted color onto the overlay.
fn blend_px(image: &mut RgbaImage, x: i32, y: i32, color: Rgba8, coverage: f32) {
    if x < 0 || y < 0 || x as u32 >= image.width() || y as u32 >= image.height() {
        return;
    }
    let src_a = coverage.clamp(0.0, 1.0) * f32::from(color.a) / 255.0;
    if src_a <= 0.0 {
        return;
    }

    let dst = image.get_pixel(x as u32, y as u32).0;
    let dst_a = f32::from(dst[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }

    let blend = |s: u8, d: u8| -> u8 {
        let s = f32::from(s);
        let d = f32::from(d);
        ((s * src_a + d * dst_a * (1.0 - src_a)) / out_a).round().clamp(0.0, 255.0) as u8
    };

    image.put_pixel(
        x as u32,
        y as u32,
        image::Rgba([
            blend(color.r, dst[0]),
            blend(color.g, dst[1]),
            blend(color.b, dst[2]),
            (out_a * 255.0).round() as u8,
        ]),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono() -> MonoMeasurer {
        MonoMeasurer::default()
    }

    fn mono_engine(params: LayoutParams) -> TextLayoutEngine {
        TextLayoutEngine::new(Measurer::Mono(mono()), params)
    }

    #[test]
    fn wrap_preserves_words_in_order() {
        let text = "the quick brown fox jumps over the lazy dog again and again";
        let m = mono();
        // Budget of ~16 characters at size 10.
        let lines = wrap_words(text, 10.0, 16.0 * 6.0, &m);
        assert!(lines.len() > 1);
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn wrap_respects_budget_except_unbreakable_words() {
        let text = "a tiny word and incomprehensibilities follow";
        let m = mono();
        let budget_chars = 12usize;
        let lines = wrap_words(text, 10.0, budget_chars as f32 * 6.0, &m);
        for line in &lines {
            if line.split_whitespace().count() > 1 {
                assert!(
                    line.chars().count() <= budget_chars,
                    "line '{line}' exceeds budget"
                );
            }
        }
        // The unbreakable word sits alone on its own line.
        assert!(lines.iter().any(|l| l == "incomprehensibilities"));
    }

    #[test]
    fn wrap_of_short_text_is_a_single_line() {
        let m = mono();
        let lines = wrap_words("hello world", 10.0, 1000.0, &m);
        assert_eq!(lines, vec!["hello world".to_string()]);
    }

    #[test]
    fn block_height_is_line_height_times_count() {
        let engine = mono_engine(LayoutParams {
            max_chars_per_line: 10,
            panel_opacity: 0.0,
            ..LayoutParams::default()
        });
        let quote = QuoteText::new("one two three four five six seven eight", None).unwrap();
        let canvas = Canvas::new(640, 480).unwrap();
        let overlay = engine.layout(&quote, canvas).unwrap();
        let block = &overlay.block;
        assert!(block.lines.len() > 1);
        assert!(
            (block.block_height - block.line_height * block.lines.len() as f32).abs() < 1e-4
        );
    }

    #[test]
    fn overlay_matches_canvas_size() {
        let engine = mono_engine(LayoutParams::default());
        let quote = QuoteText::new("Stay hungry.", Some("Steve".to_string())).unwrap();
        let canvas = Canvas::new(320, 240).unwrap();
        let overlay = engine.layout(&quote, canvas).unwrap();
        assert_eq!(overlay.image.width(), 320);
        assert_eq!(overlay.image.height(), 240);
    }

    #[test]
    fn zero_panel_opacity_leaves_panel_region_transparent() {
        let params = LayoutParams {
            panel_opacity: 0.0,
            ..LayoutParams::default()
        };
        let engine = mono_engine(params);
        let quote = QuoteText::new("Hi", None).unwrap();
        let canvas = Canvas::new(400, 300).unwrap();
        let overlay = engine.layout(&quote, canvas).unwrap();

        // A pixel inside where the panel would be, but horizontally clear of
        // the two-character text, stays fully transparent.
        let probe = overlay.image.get_pixel(40, 150);
        assert_eq!(probe.0[3], 0);
        // Corners are transparent either way.
        assert_eq!(overlay.image.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn panel_opacity_sets_expected_alpha() {
        let params = LayoutParams {
            panel_opacity: 0.25,
            ..LayoutParams::default()
        };
        let engine = mono_engine(params);
        let quote = QuoteText::new("Hi", None).unwrap();
        let canvas = Canvas::new(400, 300).unwrap();
        let overlay = engine.layout(&quote, canvas).unwrap();

        // Inside the panel, clear of the text.
        let probe = overlay.image.get_pixel(40, 150);
        assert_eq!(probe.0[3], 64);
        // Outside the panel.
        assert_eq!(overlay.image.get_pixel(0, 0).0[3], 0);
    }

    #[test]
    fn text_pixels_are_drawn_in_fallback_mode() {
        let engine = mono_engine(LayoutParams {
            panel_opacity: 0.0,
            ..LayoutParams::default()
        });
        let quote = QuoteText::new("Hi", None).unwrap();
        let canvas = Canvas::new(400, 300).unwrap();
        let overlay = engine.layout(&quote, canvas).unwrap();
        let drawn = overlay.image.pixels().filter(|p| p.0[3] > 0).count();
        assert!(drawn > 0);
    }

    #[test]
    fn stroke_draws_outline_color_under_the_fill() {
        let engine = mono_engine(LayoutParams {
            panel_opacity: 0.0,
            color: Rgba8::WHITE,
            stroke_width: 2,
            stroke_color: Rgba8::opaque(255, 0, 0),
            ..LayoutParams::default()
        });
        let quote = QuoteText::new("Hi", None).unwrap();
        let canvas = Canvas::new(400, 300).unwrap();
        let overlay = engine.layout(&quote, canvas).unwrap();

        let count = |c: Rgba8| {
            overlay
                .image
                .pixels()
                .filter(|p| p.0 == [c.r, c.g, c.b, c.a])
                .count()
        };
        // The offset passes leave a ring of outline color around the fill.
        assert!(count(Rgba8::opaque(255, 0, 0)) > 0);
        assert!(count(Rgba8::WHITE) > 0);
    }

    #[test]
    fn zero_stroke_width_draws_no_outline_pixels() {
        let engine = mono_engine(LayoutParams {
            panel_opacity: 0.0,
            stroke_width: 0,
            stroke_color: Rgba8::opaque(255, 0, 0),
            ..LayoutParams::default()
        });
        let quote = QuoteText::new("Hi", None).unwrap();
        let canvas = Canvas::new(400, 300).unwrap();
        let overlay = engine.layout(&quote, canvas).unwrap();
        assert!(!overlay.image.pixels().any(|p| p.0 == [255, 0, 0, 255]));
    }

    #[test]
    fn missing_font_paths_fall_back_to_mono() {
        let measurer = Measurer::select(&[PathBuf::from("/no/such/font.ttf")]);
        assert!(matches!(measurer, Measurer::Mono(_)));
    }

    #[test]
    fn mono_width_is_char_count_scaled() {
        let m = mono();
        assert!((m.line_width_px("abcd", 10.0) - 4.0 * 6.0).abs() < 1e-6);
    }
}
