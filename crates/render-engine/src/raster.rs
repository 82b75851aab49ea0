//! Software rasterizer implementing [`DrawContext`] over an RGBA buffer.
//!
//! Shapes are flattened to polygons in device space and filled with a
//! nonzero-winding scanline fill. Images are sampled nearest-neighbour
//! through the inverse of the current matrix. Glyph outlines come from
//! `ttf-parser`.

use clipforge_project_model::TextAlign;
use clipforge_resolver::Affine;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::draw::{fallback_metrics, DrawContext, FontSpec, Rgba, TextMetrics};

const CIRCLE_SEGMENTS: usize = 32;
const CURVE_SEGMENTS: usize = 8;
/// Horizontal shear applied to synthesized italics.
const ITALIC_SKEW: f64 = 0.2;

#[derive(Debug, Clone)]
struct CanvasState {
    matrix: Affine,
    alpha: f64,
    fill: Rgba,
    stroke: Rgba,
    line_width: f64,
    font: FontSpec,
    align: TextAlign,
    letter_spacing: f64,
}

impl Default for CanvasState {
    fn default() -> Self {
        Self {
            matrix: Affine::IDENTITY,
            alpha: 1.0,
            fill: Rgba::BLACK,
            stroke: Rgba::BLACK,
            line_width: 1.0,
            font: FontSpec {
                size: 10.0,
                ..FontSpec::default()
            },
            align: TextAlign::Left,
            letter_spacing: 0.0,
        }
    }
}

/// An in-memory RGBA canvas.
pub struct RasterCanvas {
    image: RgbaImage,
    state: CanvasState,
    stack: Vec<CanvasState>,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width.max(1), height.max(1)),
            state: CanvasState::default(),
            stack: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Reset every pixel and the drawing state.
    pub fn clear(&mut self, color: Rgba) {
        for px in self.image.pixels_mut() {
            *px = image::Rgba([color.r, color.g, color.b, color.a]);
        }
        self.state = CanvasState::default();
        self.stack.clear();
    }

    /// PNG bytes of the current contents, tuned for encode speed.
    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::with_capacity(self.image.as_raw().len() / 4);
        let encoder =
            PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, FilterType::Adaptive);
        encoder.write_image(
            self.image.as_raw(),
            self.image.width(),
            self.image.height(),
            ExtendedColorType::Rgba8,
        )?;
        Ok(buf)
    }

    fn to_device(&self, points: &[(f64, f64)]) -> Vec<(f64, f64)> {
        points
            .iter()
            .map(|&(x, y)| self.state.matrix.apply(x, y))
            .collect()
    }

    fn blend(&mut self, x: u32, y: u32, color: Rgba, alpha: f64) {
        let src_a = (color.a as f64 / 255.0) * alpha;
        if src_a <= 0.0 {
            return;
        }
        let px = self.image.get_pixel_mut(x, y);
        let dst_a = px[3] as f64 / 255.0;
        let out_a = src_a + dst_a * (1.0 - src_a);
        if out_a <= 0.0 {
            return;
        }
        let src = [color.r, color.g, color.b];
        for (channel, &s) in src.iter().enumerate() {
            let d = px[channel] as f64;
            let value = (s as f64 * src_a + d * dst_a * (1.0 - src_a)) / out_a;
            px[channel] = value.round().clamp(0.0, 255.0) as u8;
        }
        px[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }

    /// Nonzero-winding fill of device-space contours.
    fn fill_device_paths(&mut self, paths: &[Vec<(f64, f64)>], color: Rgba) {
        let alpha = self.state.alpha;
        if alpha <= 0.0 || color.a == 0 {
            return;
        }
        let mut edges = Vec::new();
        for path in paths {
            if path.len() < 3 {
                continue;
            }
            for i in 0..path.len() {
                let p0 = path[i];
                let p1 = path[(i + 1) % path.len()];
                if (p0.1 - p1.1).abs() > f64::EPSILON {
                    edges.push((p0, p1));
                }
            }
        }
        if edges.is_empty() {
            return;
        }

        let (min_y, max_y) = edges.iter().fold((f64::MAX, f64::MIN), |(lo, hi), (a, b)| {
            (lo.min(a.1).min(b.1), hi.max(a.1).max(b.1))
        });
        let height = self.image.height() as i64;
        let width = self.image.width() as i64;
        let row_start = (min_y.floor() as i64).max(0);
        let row_end = (max_y.ceil() as i64).min(height);

        let mut crossings: Vec<(f64, i32)> = Vec::new();
        for row in row_start..row_end {
            let sample_y = row as f64 + 0.5;
            crossings.clear();
            for &((x0, y0), (x1, y1)) in &edges {
                let (top, bottom, dir) = if y0 < y1 { (y0, y1, 1) } else { (y1, y0, -1) };
                if sample_y < top || sample_y >= bottom {
                    continue;
                }
                let t = (sample_y - y0) / (y1 - y0);
                crossings.push((x0 + t * (x1 - x0), dir));
            }
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut winding = 0;
            for pair in crossings.windows(2) {
                winding += pair[0].1;
                if winding == 0 {
                    continue;
                }
                let span_start = ((pair[0].0 - 0.5).ceil() as i64).max(0);
                let span_end = ((pair[1].0 - 0.5).ceil() as i64).min(width);
                for col in span_start..span_end {
                    self.blend(col as u32, row as u32, color, alpha);
                }
            }
        }
    }

    fn fill_user_paths(&mut self, paths: &[Vec<(f64, f64)>], color: Rgba) {
        let device: Vec<Vec<(f64, f64)>> = paths.iter().map(|p| self.to_device(p)).collect();
        self.fill_device_paths(&device, color);
    }

    /// Glyph contours for `text` in user space, aligned around `x`.
    fn text_paths(&self, text: &str, x: f64, y: f64) -> Vec<Vec<(f64, f64)>> {
        let font = &self.state.font;
        let Some(data) = font.face.as_ref() else {
            tracing::trace!(text, "No font face loaded, skipping glyphs");
            return Vec::new();
        };
        let Some(face) = data.face() else {
            return Vec::new();
        };
        let metrics = self.measure_text(text);
        let origin_x = match self.state.align {
            TextAlign::Left => x,
            TextAlign::Center => x - metrics.width / 2.0,
            TextAlign::Right => x - metrics.width,
        };
        let scale = font.size / face.units_per_em().max(1) as f64;
        let skew = if font.italic { ITALIC_SKEW } else { 0.0 };

        let mut paths = Vec::new();
        let mut pen = origin_x;
        for ch in text.chars() {
            let Some(glyph) = face.glyph_index(ch) else {
                pen += font.size * 0.5 + self.state.letter_spacing;
                continue;
            };
            let mut outline = OutlineCollector::default();
            if face.outline_glyph(glyph, &mut outline).is_some() {
                for contour in outline.finish() {
                    paths.push(
                        contour
                            .into_iter()
                            .map(|(gx, gy)| {
                                let ux = gx * scale + gy * scale * skew;
                                (pen + ux, y - gy * scale)
                            })
                            .collect(),
                    );
                }
            }
            let advance = face.glyph_hor_advance(glyph).unwrap_or(0) as f64 * scale;
            pen += advance + self.state.letter_spacing;
        }
        paths
    }

    fn fill_glyphs(&mut self, text: &str, x: f64, y: f64, color: Rgba, spread: f64) {
        let paths = self.text_paths(text, x, y);
        if paths.is_empty() {
            return;
        }
        let bold = self.state.font.bold;
        let mut offsets = vec![(0.0, 0.0)];
        if spread > 0.0 {
            for i in 0..8 {
                let angle = i as f64 * std::f64::consts::FRAC_PI_4;
                offsets.push((angle.cos() * spread, angle.sin() * spread));
            }
        }
        if bold {
            let weight = (self.state.font.size / 24.0).max(0.5);
            offsets.push((weight, 0.0));
        }
        for (dx, dy) in offsets {
            let shifted: Vec<Vec<(f64, f64)>> = paths
                .iter()
                .map(|p| p.iter().map(|&(px, py)| (px + dx, py + dy)).collect())
                .collect();
            self.fill_user_paths(&shifted, color);
        }
    }
}

impl DrawContext for RasterCanvas {
    fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn translate(&mut self, x: f64, y: f64) {
        self.state.matrix = self.state.matrix.translate(x, y);
    }

    fn rotate(&mut self, radians: f64) {
        self.state.matrix = self.state.matrix.rotate(radians);
    }

    fn scale(&mut self, x: f64, y: f64) {
        self.state.matrix = self.state.matrix.scale(x, y);
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.state.alpha = alpha.clamp(0.0, 1.0);
    }

    fn multiply_alpha(&mut self, factor: f64) {
        self.state.alpha = (self.state.alpha * factor).clamp(0.0, 1.0);
    }

    fn set_fill_color(&mut self, color: Rgba) {
        self.state.fill = color;
    }

    fn set_stroke_color(&mut self, color: Rgba) {
        self.state.stroke = color;
    }

    fn set_line_width(&mut self, width: f64) {
        self.state.line_width = width.max(0.0);
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        let rect = vec![(x, y), (x + w, y), (x + w, y + h), (x, y + h)];
        let color = self.state.fill;
        self.fill_user_paths(&[rect], color);
    }

    fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        let half = self.state.line_width / 2.0;
        if half <= 0.0 {
            return;
        }
        let outer = vec![
            (x - half, y - half),
            (x + w + half, y - half),
            (x + w + half, y + h + half),
            (x - half, y + h + half),
        ];
        let mut paths = vec![outer];
        if w > 2.0 * half && h > 2.0 * half {
            // Opposite winding cuts the interior out.
            paths.push(vec![
                (x + half, y + half),
                (x + half, y + h - half),
                (x + w - half, y + h - half),
                (x + w - half, y + half),
            ]);
        }
        let color = self.state.stroke;
        self.fill_user_paths(&paths, color);
    }

    fn fill_polygon(&mut self, points: &[(f64, f64)]) {
        let color = self.state.fill;
        self.fill_user_paths(&[points.to_vec()], color);
    }

    fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64) {
        let points: Vec<(f64, f64)> = (0..CIRCLE_SEGMENTS)
            .map(|i| {
                let angle = i as f64 / CIRCLE_SEGMENTS as f64 * std::f64::consts::TAU;
                (cx + radius * angle.cos(), cy + radius * angle.sin())
            })
            .collect();
        let color = self.state.fill;
        self.fill_user_paths(&[points], color);
    }

    fn draw_image(&mut self, image: &RgbaImage, x: f64, y: f64, w: f64, h: f64) {
        let alpha = self.state.alpha;
        if alpha <= 0.0 || w <= 0.0 || h <= 0.0 || image.width() == 0 || image.height() == 0 {
            return;
        }
        let Some(inverse) = self.state.matrix.inverse() else {
            return;
        };
        let bbox = self.state.matrix.translate(x, y).bounding_box(w, h);
        let col_start = (bbox.x.floor() as i64).max(0);
        let col_end = ((bbox.x + bbox.w).ceil() as i64).min(self.image.width() as i64);
        let row_start = (bbox.y.floor() as i64).max(0);
        let row_end = ((bbox.y + bbox.h).ceil() as i64).min(self.image.height() as i64);
        let (src_w, src_h) = image.dimensions();

        for row in row_start..row_end {
            for col in col_start..col_end {
                let (u, v) = inverse.apply(col as f64 + 0.5, row as f64 + 0.5);
                let (fx, fy) = ((u - x) / w, (v - y) / h);
                if !(0.0..1.0).contains(&fx) || !(0.0..1.0).contains(&fy) {
                    continue;
                }
                let sx = ((fx * src_w as f64) as u32).min(src_w - 1);
                let sy = ((fy * src_h as f64) as u32).min(src_h - 1);
                let p = image.get_pixel(sx, sy);
                let color = Rgba {
                    r: p[0],
                    g: p[1],
                    b: p[2],
                    a: p[3],
                };
                self.blend(col as u32, row as u32, color, alpha);
            }
        }
    }

    fn set_font(&mut self, font: FontSpec) {
        self.state.font = font;
    }

    fn set_text_align(&mut self, align: TextAlign) {
        self.state.align = align;
    }

    fn set_letter_spacing(&mut self, spacing: f64) {
        self.state.letter_spacing = spacing;
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64) {
        let color = self.state.fill;
        self.fill_glyphs(text, x, y, color, 0.0);
    }

    fn stroke_text(&mut self, text: &str, x: f64, y: f64) {
        let color = self.state.stroke;
        let spread = self.state.line_width / 2.0;
        self.fill_glyphs(text, x, y, color, spread);
    }

    fn measure_text(&self, text: &str) -> TextMetrics {
        let font = &self.state.font;
        let spacing = self.state.letter_spacing;
        let Some(face) = font.face.as_ref().and_then(|data| data.face()) else {
            return fallback_metrics(text, font, spacing);
        };
        let scale = font.size / face.units_per_em().max(1) as f64;
        let width = text
            .chars()
            .map(|ch| {
                face.glyph_index(ch)
                    .and_then(|g| face.glyph_hor_advance(g))
                    .map(|adv| adv as f64 * scale)
                    .unwrap_or(font.size * 0.5)
                    + spacing
            })
            .sum();
        TextMetrics {
            width,
            ascent: face.ascender() as f64 * scale,
            descent: -(face.descender() as f64) * scale,
        }
    }
}

/// Collects flattened glyph contours in font units.
#[derive(Default)]
struct OutlineCollector {
    contours: Vec<Vec<(f64, f64)>>,
    current: Vec<(f64, f64)>,
}

impl OutlineCollector {
    fn last(&self) -> (f64, f64) {
        self.current.last().copied().unwrap_or((0.0, 0.0))
    }

    fn finish(mut self) -> Vec<Vec<(f64, f64)>> {
        if self.current.len() > 2 {
            self.contours.push(std::mem::take(&mut self.current));
        }
        self.contours
    }
}

impl ttf_parser::OutlineBuilder for OutlineCollector {
    fn move_to(&mut self, x: f32, y: f32) {
        if self.current.len() > 2 {
            self.contours.push(std::mem::take(&mut self.current));
        }
        self.current.clear();
        self.current.push((x as f64, y as f64));
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.current.push((x as f64, y as f64));
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x0, y0) = self.last();
        let (cx, cy, ex, ey) = (x1 as f64, y1 as f64, x as f64, y as f64);
        for i in 1..=CURVE_SEGMENTS {
            let t = i as f64 / CURVE_SEGMENTS as f64;
            let mt = 1.0 - t;
            self.current.push((
                mt * mt * x0 + 2.0 * mt * t * cx + t * t * ex,
                mt * mt * y0 + 2.0 * mt * t * cy + t * t * ey,
            ));
        }
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x0, y0) = self.last();
        let (ax, ay, bx, by, ex, ey) = (
            x1 as f64, y1 as f64, x2 as f64, y2 as f64, x as f64, y as f64,
        );
        for i in 1..=CURVE_SEGMENTS {
            let t = i as f64 / CURVE_SEGMENTS as f64;
            let mt = 1.0 - t;
            self.current.push((
                mt * mt * mt * x0 + 3.0 * mt * mt * t * ax + 3.0 * mt * t * t * bx + t * t * t * ex,
                mt * mt * mt * y0 + 3.0 * mt * mt * t * ay + 3.0 * mt * t * t * by + t * t * t * ey,
            ));
        }
    }

    fn close(&mut self) {
        if self.current.len() > 2 {
            self.contours.push(std::mem::take(&mut self.current));
        }
        self.current.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(canvas: &RasterCanvas, x: u32, y: u32) -> [u8; 4] {
        canvas.image().get_pixel(x, y).0
    }

    #[test]
    fn test_fill_rect_covers_exact_pixels() {
        let mut canvas = RasterCanvas::new(10, 10);
        canvas.set_fill_color(Rgba::rgb(255, 0, 0));
        canvas.fill_rect(2.0, 3.0, 4.0, 2.0);
        assert_eq!(pixel(&canvas, 2, 3), [255, 0, 0, 255]);
        assert_eq!(pixel(&canvas, 5, 4), [255, 0, 0, 255]);
        assert_eq!(pixel(&canvas, 6, 4), [0, 0, 0, 0]);
        assert_eq!(pixel(&canvas, 2, 5), [0, 0, 0, 0]);
        assert_eq!(pixel(&canvas, 1, 3), [0, 0, 0, 0]);
    }

    #[test]
    fn test_translate_and_restore() {
        let mut canvas = RasterCanvas::new(10, 10);
        canvas.set_fill_color(Rgba::WHITE);
        canvas.save();
        canvas.translate(5.0, 5.0);
        canvas.fill_rect(0.0, 0.0, 1.0, 1.0);
        canvas.restore();
        canvas.fill_rect(0.0, 0.0, 1.0, 1.0);
        assert_eq!(pixel(&canvas, 5, 5)[3], 255);
        assert_eq!(pixel(&canvas, 0, 0)[3], 255);
        assert_eq!(pixel(&canvas, 1, 1)[3], 0);
    }

    #[test]
    fn test_alpha_blends_over_background() {
        let mut canvas = RasterCanvas::new(4, 4);
        canvas.clear(Rgba::BLACK);
        canvas.set_alpha(0.5);
        canvas.set_fill_color(Rgba::WHITE);
        canvas.fill_rect(0.0, 0.0, 4.0, 4.0);
        let [r, g, b, a] = pixel(&canvas, 1, 1);
        assert!((127..=128).contains(&r) && r == g && g == b);
        assert_eq!(a, 255);
    }

    #[test]
    fn test_stroke_rect_leaves_interior() {
        let mut canvas = RasterCanvas::new(20, 20);
        canvas.set_stroke_color(Rgba::WHITE);
        canvas.set_line_width(2.0);
        canvas.stroke_rect(4.0, 4.0, 12.0, 12.0);
        assert_eq!(pixel(&canvas, 4, 10)[3], 255);
        assert_eq!(pixel(&canvas, 10, 10)[3], 0);
    }

    #[test]
    fn test_rotated_image_draw() {
        let src = RgbaImage::from_pixel(4, 2, image::Rgba([0, 0, 255, 255]));
        let mut canvas = RasterCanvas::new(10, 10);
        canvas.translate(5.0, 5.0);
        canvas.rotate(std::f64::consts::FRAC_PI_2);
        canvas.draw_image(&src, 0.0, 0.0, 4.0, 2.0);
        // A quarter turn maps +x onto +y.
        assert_eq!(pixel(&canvas, 4, 7), [0, 0, 255, 255]);
        assert_eq!(pixel(&canvas, 7, 5)[3], 0);
    }

    #[test]
    fn test_polygon_and_circle() {
        let mut canvas = RasterCanvas::new(20, 20);
        canvas.set_fill_color(Rgba::WHITE);
        canvas.fill_polygon(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        assert_eq!(pixel(&canvas, 1, 1)[3], 255);
        assert_eq!(pixel(&canvas, 9, 9)[3], 0);
        canvas.fill_circle(15.0, 15.0, 3.0);
        assert_eq!(pixel(&canvas, 15, 15)[3], 255);
        assert_eq!(pixel(&canvas, 19, 19)[3], 0);
    }

    #[test]
    fn test_png_encoding_has_signature() {
        let canvas = RasterCanvas::new(3, 3);
        let png = canvas.encode_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_text_without_face_measures_by_fallback() {
        let mut canvas = RasterCanvas::new(10, 10);
        canvas.set_font(FontSpec {
            size: 10.0,
            ..FontSpec::default()
        });
        assert_eq!(canvas.measure_text("ab").width, 10.0);
        canvas.fill_text("ab", 0.0, 10.0);
        assert!(canvas.image().pixels().all(|p| p[3] == 0));
    }
}
