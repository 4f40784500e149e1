use std::sync::Arc;

use tracing::warn;

use crate::assets::CachedImage;
use crate::canvas::composite::{clear_in_place, composite_in_place};
use crate::canvas::path::{CanvasPath, StrokeStyle, rect_path, stroke_outline, to_user_space};
use crate::canvas::raster::{GlyphPaint, Rasterizer};
use crate::canvas::sample::sample_premul;
use crate::canvas::style::{
    CompositeMode, FontSpec, LineCap, LineJoin, parse_css_color, parse_line_dash,
};
use crate::canvas::text::TextEngine;
use crate::foundation::core::{Affine, BezPath, Canvas, Point, Rect, Rgba8};
use crate::foundation::error::ReCanvasResult;
use crate::foundation::math::unpremultiply_rgba8_in_place;
use crate::host::renderer::FrameRGBA;

#[derive(Clone, Debug)]
struct DrawState {
    transform: Affine,
    fill: Rgba8,
    stroke: Rgba8,
    line_width: f64,
    line_cap: LineCap,
    line_join: LineJoin,
    miter_limit: f64,
    dash: Vec<f64>,
    font: FontSpec,
    global_alpha: f32,
    composite: CompositeMode,
    image_smoothing: bool,
    /// Clip coverage, one byte per pixel. `None` means unclipped.
    clip: Option<Arc<Vec<u8>>>,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            fill: Rgba8::BLACK,
            stroke: Rgba8::BLACK,
            line_width: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            miter_limit: 10.0,
            dash: Vec::new(),
            font: FontSpec::default(),
            global_alpha: 1.0,
            composite: CompositeMode::SourceOver,
            image_smoothing: true,
            clip: None,
        }
    }
}

impl DrawState {
    fn stroke_style(&self) -> StrokeStyle {
        StrokeStyle {
            width: self.line_width,
            cap: self.line_cap,
            join: self.line_join,
            miter_limit: self.miter_limit,
            dash: self.dash.clone(),
            dash_offset: 0.0,
        }
    }
}

fn finite(vals: &[f64]) -> bool {
    vals.iter().all(|v| v.is_finite())
}

/// A CPU 2D drawing context over a premultiplied RGBA8 surface.
///
/// Non-finite arguments make a call a no-op, like the browser context.
pub struct Context2D {
    canvas: Canvas,
    pixels: Vec<u8>,
    state: DrawState,
    stack: Vec<DrawState>,
    path: CanvasPath,
    raster: Rasterizer,
}

impl Context2D {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            canvas,
            pixels: vec![0; canvas.byte_len()],
            state: DrawState::default(),
            stack: Vec::new(),
            path: CanvasPath::default(),
            raster: Rasterizer::new(),
        }
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Premultiplied surface bytes.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn transform_matrix(&self) -> Affine {
        self.state.transform
    }

    pub fn image_smoothing(&self) -> bool {
        self.state.image_smoothing
    }

    pub fn global_alpha(&self) -> f32 {
        self.state.global_alpha
    }

    pub fn composite_mode(&self) -> CompositeMode {
        self.state.composite
    }

    pub fn line_dash(&self) -> &[f64] {
        &self.state.dash
    }

    pub fn fill_color(&self) -> Rgba8 {
        self.state.fill
    }

    pub fn save_depth(&self) -> usize {
        self.stack.len()
    }

    /// Reallocate the surface. Pixels, path, state stack and styles are all reset.
    pub fn resize(&mut self, canvas: Canvas) {
        *self = Self {
            raster: std::mem::take(&mut self.raster),
            ..Self::new(canvas)
        };
    }

    fn composite_layer(&mut self, layer: &[u8]) {
        let clip = self.state.clip.clone();
        if let Err(e) = composite_in_place(
            &mut self.pixels,
            layer,
            self.state.composite,
            self.state.global_alpha,
            clip.as_deref().map(Vec::as_slice),
        ) {
            warn!(error = %e, "composite failed");
        }
    }

    fn fill_device_path(&mut self, path: &BezPath, color: Rgba8) {
        match self.raster.fill_path(self.canvas, path, color) {
            Ok(layer) => self.composite_layer(&layer),
            Err(e) => warn!(error = %e, "fill rasterization failed"),
        }
    }

    fn stroke_user_path(&mut self, user_path: &BezPath) {
        if self.state.line_width <= 0.0 {
            return;
        }
        let outline = stroke_outline(user_path, self.state.transform, &self.state.stroke_style());
        let color = self.state.stroke;
        self.fill_device_path(&outline, color);
    }

    // Rectangles.

    pub fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        if !finite(&[x, y, w, h]) || w == 0.0 || h == 0.0 {
            return;
        }
        let mut path = rect_path(x, y, w, h);
        path.apply_affine(self.state.transform);
        let color = self.state.fill;
        self.fill_device_path(&path, color);
    }

    pub fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        if !finite(&[x, y, w, h]) || (w == 0.0 && h == 0.0) {
            return;
        }
        self.stroke_user_path(&rect_path(x, y, w, h));
    }

    pub fn clear_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        if !finite(&[x, y, w, h]) || w == 0.0 || h == 0.0 {
            return;
        }
        let mut path = rect_path(x, y, w, h);
        path.apply_affine(self.state.transform);
        let layer = match self
            .raster
            .fill_path(self.canvas, &path, Rgba8::opaque(0, 0, 0))
        {
            Ok(layer) => layer,
            Err(e) => {
                warn!(error = %e, "clear rasterization failed");
                return;
            }
        };
        let clip = self.state.clip.clone();
        if let Err(e) = clear_in_place(&mut self.pixels, &layer, clip.as_deref().map(Vec::as_slice))
        {
            warn!(error = %e, "clear failed");
        }
    }

    // Text.

    fn draw_text(&mut self, engine: &mut TextEngine, text: &str, x: f64, y: f64, paint: GlyphPaint) {
        if !finite(&[x, y]) || text.is_empty() {
            return;
        }
        let Some(shaped) = engine.shape(text, &self.state.font) else {
            warn!("text drawn without any registered font");
            return;
        };
        let color = match paint {
            GlyphPaint::Fill => self.state.fill,
            GlyphPaint::Stroke { .. } => self.state.stroke,
        };
        let transform = self.state.transform * Affine::translate((x, y));
        match self
            .raster
            .glyphs(self.canvas, &shaped, transform, color, paint)
        {
            Ok(layer) => self.composite_layer(&layer),
            Err(e) => warn!(error = %e, "text rasterization failed"),
        }
    }

    pub fn fill_text(&mut self, engine: &mut TextEngine, text: &str, x: f64, y: f64) {
        self.draw_text(engine, text, x, y, GlyphPaint::Fill);
    }

    pub fn stroke_text(&mut self, engine: &mut TextEngine, text: &str, x: f64, y: f64) {
        let width = self.state.line_width;
        self.draw_text(engine, text, x, y, GlyphPaint::Stroke { width });
    }

    /// Advance width of `text` in the current font, ignoring the transform.
    pub fn measure_text(&self, engine: &mut TextEngine, text: &str) -> f64 {
        engine.measure(text, &self.state.font)
    }

    // Images.

    /// Draw `image` at its natural size with its top-left corner at `(x, y)` in user space.
    pub fn draw_image(&mut self, image: &CachedImage, x: f64, y: f64) {
        if !finite(&[x, y]) || image.width == 0 || image.height == 0 {
            return;
        }
        let to_device = self.state.transform * Affine::translate((x, y));
        if to_device.determinant().abs() < f64::EPSILON {
            return;
        }
        let to_image = to_device.inverse();

        let image_rect = Rect::new(0.0, 0.0, f64::from(image.width), f64::from(image.height));
        let bounds = to_device.transform_rect_bbox(image_rect);
        let x0 = bounds.x0.floor().max(0.0) as u32;
        let y0 = bounds.y0.floor().max(0.0) as u32;
        let x1 = (bounds.x1.ceil().max(0.0) as u32).min(self.canvas.width);
        let y1 = (bounds.y1.ceil().max(0.0) as u32).min(self.canvas.height);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let smooth = self.state.image_smoothing;
        let mut layer = vec![0u8; self.canvas.byte_len()];
        for py in y0..y1 {
            for px in x0..x1 {
                let p = to_image * Point::new(f64::from(px) + 0.5, f64::from(py) + 0.5);
                if let Some(rgba) = sample_premul(
                    &image.rgba8_premul,
                    image.width,
                    image.height,
                    p.x,
                    p.y,
                    smooth,
                ) {
                    let i = ((py as usize) * (self.canvas.width as usize) + px as usize) * 4;
                    layer[i..i + 4].copy_from_slice(&rgba);
                }
            }
        }
        self.composite_layer(&layer);
    }

    // Path painting.

    pub fn fill(&mut self) {
        if self.path.is_empty() {
            return;
        }
        let path = self.path.as_bez().clone();
        let color = self.state.fill;
        self.fill_device_path(&path, color);
    }

    pub fn stroke(&mut self) {
        if self.path.is_empty() {
            return;
        }
        let Some(user) = to_user_space(self.path.as_bez(), self.state.transform) else {
            return;
        };
        self.stroke_user_path(&user);
    }

    /// Intersect the clip region with the current path.
    pub fn clip(&mut self) {
        let coverage = match self.raster.coverage(self.canvas, self.path.as_bez()) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "clip rasterization failed");
                return;
            }
        };
        let merged = match self.state.clip.as_deref() {
            Some(prev) => prev
                .iter()
                .zip(&coverage)
                .map(|(&a, &b)| crate::foundation::math::mul_div255_u8(u16::from(a), u16::from(b)))
                .collect(),
            None => coverage,
        };
        self.state.clip = Some(Arc::new(merged));
    }

    // Path building.

    pub fn begin_path(&mut self) {
        self.path.clear();
    }

    pub fn close_path(&mut self) {
        self.path.close_path();
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        if finite(&[x, y]) {
            self.path.move_to(self.state.transform, Point::new(x, y));
        }
    }

    pub fn line_to(&mut self, x: f64, y: f64) {
        if finite(&[x, y]) {
            self.path.line_to(self.state.transform, Point::new(x, y));
        }
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        if finite(&[x, y, w, h]) {
            self.path.rect(self.state.transform, x, y, w, h);
        }
    }

    pub fn round_rect(&mut self, x: f64, y: f64, w: f64, h: f64, radius: f64) {
        if finite(&[x, y, w, h, radius]) {
            self.path
                .round_rect(self.state.transform, x, y, w, h, radius);
        }
    }

    pub fn arc(&mut self, x: f64, y: f64, r: f64, start: f64, end: f64, anticlockwise: bool) {
        if finite(&[x, y, r, start, end]) {
            self.path.arc(
                self.state.transform,
                Point::new(x, y),
                r,
                start,
                end,
                anticlockwise,
            );
        }
    }

    pub fn arc_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, r: f64) {
        if finite(&[x1, y1, x2, y2, r]) {
            self.path.arc_to(
                self.state.transform,
                Point::new(x1, y1),
                Point::new(x2, y2),
                r,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn ellipse(
        &mut self,
        x: f64,
        y: f64,
        rx: f64,
        ry: f64,
        rotation: f64,
        start: f64,
        end: f64,
        anticlockwise: bool,
    ) {
        if finite(&[x, y, rx, ry, rotation, start, end]) {
            self.path.ellipse(
                self.state.transform,
                Point::new(x, y),
                rx,
                ry,
                rotation,
                start,
                end,
                anticlockwise,
            );
        }
    }

    pub fn bezier_curve_to(&mut self, cp1x: f64, cp1y: f64, cp2x: f64, cp2y: f64, x: f64, y: f64) {
        if finite(&[cp1x, cp1y, cp2x, cp2y, x, y]) {
            self.path.bezier_curve_to(
                self.state.transform,
                Point::new(cp1x, cp1y),
                Point::new(cp2x, cp2y),
                Point::new(x, y),
            );
        }
    }

    // Transforms.

    pub fn scale(&mut self, sx: f64, sy: f64) {
        if finite(&[sx, sy]) {
            self.state.transform *= Affine::scale_non_uniform(sx, sy);
        }
    }

    pub fn rotate(&mut self, angle: f64) {
        if finite(&[angle]) {
            self.state.transform *= Affine::rotate(angle);
        }
    }

    pub fn translate(&mut self, x: f64, y: f64) {
        if finite(&[x, y]) {
            self.state.transform *= Affine::translate((x, y));
        }
    }

    /// Post-multiply by the matrix `[a c e; b d f; 0 0 1]`.
    pub fn transform(&mut self, a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) {
        if finite(&[a, b, c, d, e, f]) {
            self.state.transform *= Affine::new([a, b, c, d, e, f]);
        }
    }

    pub fn reset_transform(&mut self) {
        self.state.transform = Affine::IDENTITY;
    }

    // Styles.

    pub fn set_fill_style(&mut self, css: &str) {
        if let Some(c) = parse_css_color(css) {
            self.state.fill = c;
        }
    }

    pub fn set_stroke_style(&mut self, css: &str) {
        if let Some(c) = parse_css_color(css) {
            self.state.stroke = c;
        }
    }

    pub fn set_line_width(&mut self, width: f64) {
        if width.is_finite() && width > 0.0 {
            self.state.line_width = width;
        }
    }

    pub fn set_line_cap(&mut self, cap: &str) {
        if let Some(c) = LineCap::parse(cap) {
            self.state.line_cap = c;
        }
    }

    pub fn set_line_join(&mut self, join: &str) {
        if let Some(j) = LineJoin::parse(join) {
            self.state.line_join = j;
        }
    }

    /// Set the dash pattern from a JSON array string. Malformed JSON is returned as an error.
    pub fn set_line_dash(&mut self, pattern: &str) -> ReCanvasResult<()> {
        if let Some(dash) = parse_line_dash(pattern)? {
            self.state.dash = dash;
        }
        Ok(())
    }

    pub fn set_font(&mut self, font: &str) {
        if let Some(spec) = FontSpec::parse(font) {
            self.state.font = spec;
        }
    }

    pub fn set_global_alpha(&mut self, alpha: f64) {
        if alpha.is_finite() && (0.0..=1.0).contains(&alpha) {
            self.state.global_alpha = alpha as f32;
        }
    }

    pub fn set_global_composite_operation(&mut self, op: &str) {
        if let Some(mode) = CompositeMode::parse(op) {
            self.state.composite = mode;
        }
    }

    pub fn set_image_smoothing(&mut self, enabled: bool) {
        self.state.image_smoothing = enabled;
    }

    // State stack.

    pub fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    pub fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    /// Straight-alpha pixels of the region `(sx, sy, w, h)`; outside the surface is transparent.
    pub fn get_image_data(&self, sx: i64, sy: i64, width: u32, height: u32) -> FrameRGBA {
        let mut out = FrameRGBA::transparent(width, height);
        out.premultiplied = false;
        for row in 0..height {
            let y = sy + i64::from(row);
            if y < 0 || y >= i64::from(self.canvas.height) {
                continue;
            }
            for col in 0..width {
                let x = sx + i64::from(col);
                if x < 0 || x >= i64::from(self.canvas.width) {
                    continue;
                }
                let src = ((y as usize) * (self.canvas.width as usize) + x as usize) * 4;
                let dst = ((row as usize) * (width as usize) + col as usize) * 4;
                out.data[dst..dst + 4].copy_from_slice(&self.pixels[src..src + 4]);
            }
        }
        unpremultiply_rgba8_in_place(&mut out.data);
        out
    }
}

impl std::fmt::Debug for Context2D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context2D")
            .field("canvas", &self.canvas)
            .field("state", &self.state)
            .field("saved", &self.stack.len())
            .finish_non_exhaustive()
    }
}
