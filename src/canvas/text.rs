use std::borrow::Cow;

use crate::canvas::style::FontSpec;
use crate::foundation::error::{ReCanvasError, ReCanvasResult};

struct RegisteredFont {
    family: String,
    font: vello_cpu::peniko::FontData,
}

/// Glyphs of one `fillText`/`strokeText` call, positioned relative to the text origin with the
/// alphabetic baseline at `y = 0`.
#[derive(Clone)]
pub(crate) struct ShapedText {
    pub(crate) font: vello_cpu::peniko::FontData,
    pub(crate) font_size: f32,
    pub(crate) glyphs: Vec<vello_cpu::Glyph>,
    pub(crate) advance: f32,
}

/// Stateful helper for shaping text with Parley against fonts registered by the host.
///
/// Fonts are looked up by family name, case-insensitively; the first registered font is the
/// fallback for unknown families (including CSS generic names such as `sans-serif`).
pub struct TextEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<()>,
    fonts: Vec<RegisteredFont>,
}

/// Canvas text is a single line: every ASCII whitespace character becomes a space.
fn single_line(text: &str) -> Cow<'_, str> {
    if text.contains(|c: char| c.is_ascii_whitespace() && c != ' ') {
        Cow::Owned(
            text.chars()
                .map(|c| if c.is_ascii_whitespace() { ' ' } else { c })
                .collect(),
        )
    } else {
        Cow::Borrowed(text)
    }
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEngine {
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            fonts: Vec::new(),
        }
    }

    /// Register a TrueType/OpenType font. Returns its family name.
    pub fn register_font(&mut self, font_bytes: Vec<u8>) -> ReCanvasResult<String> {
        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.clone()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            ReCanvasError::asset("no font families registered from font bytes")
        })?;

        let family = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| ReCanvasError::asset("registered font family has no name"))?
            .to_string();

        let font = vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(font_bytes), 0);
        tracing::debug!(family = %family, "registered font");
        self.fonts.push(RegisteredFont {
            family: family.clone(),
            font,
        });
        Ok(family)
    }

    pub fn has_fonts(&self) -> bool {
        !self.fonts.is_empty()
    }

    fn resolve(&self, requested: &str) -> Option<&RegisteredFont> {
        self.fonts
            .iter()
            .find(|f| f.family.eq_ignore_ascii_case(requested))
            .or_else(|| self.fonts.first())
    }

    /// Shape a single line of text. Returns `None` when no font is registered.
    pub(crate) fn shape(&mut self, text: &str, spec: &FontSpec) -> Option<ShapedText> {
        let (family, font) = {
            let f = self.resolve(&spec.family)?;
            (f.family.clone(), f.font.clone())
        };
        let text = single_line(text);
        let text = text.as_ref();

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(Cow::Owned(family)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(spec.size_px));
        if spec.bold {
            builder.push_default(parley::style::StyleProperty::FontWeight(
                parley::style::FontWeight::BOLD,
            ));
        }
        if spec.italic {
            builder.push_default(parley::style::StyleProperty::FontStyle(
                parley::style::FontStyle::Italic,
            ));
        }

        let mut layout: parley::Layout<()> = builder.build(text);
        layout.break_all_lines(None);

        let baseline = layout
            .lines()
            .next()
            .map(|line| line.metrics().baseline)
            .unwrap_or(0.0);

        let mut glyphs = Vec::new();
        let mut font_size = spec.size_px;
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                font_size = run.run().font_size();
                glyphs.extend(run.positioned_glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y - baseline,
                }));
            }
        }

        Some(ShapedText {
            font,
            font_size,
            glyphs,
            advance: layout.full_width(),
        })
    }

    /// Advance width of `text`, or `0` without fonts.
    pub(crate) fn measure(&mut self, text: &str, spec: &FontSpec) -> f64 {
        self.shape(text, spec)
            .map(|s| f64::from(s.advance))
            .unwrap_or(0.0)
    }
}

impl std::fmt::Debug for TextEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextEngine")
            .field(
                "families",
                &self.fonts.iter().map(|f| f.family.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
