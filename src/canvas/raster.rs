use crate::canvas::text::ShapedText;
use crate::foundation::core::{Affine, BezPath, Canvas, Point, Rgba8};
use crate::foundation::error::{ReCanvasError, ReCanvasResult};

/// How glyph outlines are painted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum GlyphPaint {
    Fill,
    Stroke { width: f64 },
}

/// Vector coverage via `vello_cpu`.
///
/// Every call renders one shape into a fresh, transparent, surface-sized premultiplied layer; the
/// context composites that layer with its own composite mode, global alpha and clip.
#[derive(Default)]
pub(crate) struct Rasterizer {
    ctx: Option<vello_cpu::RenderContext>,
}

impl Rasterizer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with_ctx_mut(
        &mut self,
        canvas: Canvas,
        f: impl FnOnce(&mut vello_cpu::RenderContext),
    ) -> ReCanvasResult<Vec<u8>> {
        let width: u16 = canvas
            .width
            .try_into()
            .map_err(|_| ReCanvasError::validation("surface width exceeds u16"))?;
        let height: u16 = canvas
            .height
            .try_into()
            .map_err(|_| ReCanvasError::validation("surface height exceeds u16"))?;

        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == width && ctx.height() == height => ctx,
            _ => vello_cpu::RenderContext::new(width, height),
        };
        ctx.reset();
        f(&mut ctx);
        ctx.flush();

        let mut pixmap = vello_cpu::Pixmap::new(width, height);
        ctx.render_to_pixmap(&mut pixmap);
        self.ctx = Some(ctx);
        Ok(pixmap.data_as_u8_slice().to_vec())
    }

    /// Fill a device-space path (nonzero rule) with a solid color.
    pub(crate) fn fill_path(
        &mut self,
        canvas: Canvas,
        path: &BezPath,
        color: Rgba8,
    ) -> ReCanvasResult<Vec<u8>> {
        let cpu_path = bezpath_to_cpu(path);
        self.with_ctx_mut(canvas, |ctx| {
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                color.r, color.g, color.b, color.a,
            ));
            ctx.fill_path(&cpu_path);
        })
    }

    /// Coverage of a device-space path as one byte per pixel.
    pub(crate) fn coverage(&mut self, canvas: Canvas, path: &BezPath) -> ReCanvasResult<Vec<u8>> {
        let layer = self.fill_path(canvas, path, Rgba8::opaque(255, 255, 255))?;
        Ok(layer.chunks_exact(4).map(|px| px[3]).collect())
    }

    /// Paint shaped glyphs with `transform` mapping text space into device space.
    pub(crate) fn glyphs(
        &mut self,
        canvas: Canvas,
        text: &ShapedText,
        transform: Affine,
        color: Rgba8,
        paint: GlyphPaint,
    ) -> ReCanvasResult<Vec<u8>> {
        self.with_ctx_mut(canvas, |ctx| {
            ctx.set_transform(affine_to_cpu(transform));
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                color.r, color.g, color.b, color.a,
            ));
            let glyphs = text.glyphs.iter().copied();
            match paint {
                GlyphPaint::Fill => {
                    ctx.glyph_run(&text.font)
                        .font_size(text.font_size)
                        .fill_glyphs(glyphs);
                }
                GlyphPaint::Stroke { width } => {
                    ctx.set_stroke(vello_cpu::kurbo::Stroke::new(width));
                    ctx.glyph_run(&text.font)
                        .font_size(text.font_size)
                        .stroke_glyphs(glyphs);
                }
            }
        })
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn point_to_cpu(p: Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}
