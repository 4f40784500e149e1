use tracing::debug;

use crate::assets::ImageCache;
use crate::canvas::Context2D;
use crate::foundation::core::{Canvas, TextureId};
use crate::foundation::error::{ReCanvasError, ReCanvasResult};
use crate::host::renderer::{Renderer, Sampling, TextureUpload};

struct Surface {
    texture: TextureId,
    context: Context2D,
    images: ImageCache,
}

/// A sprite's off-screen drawing surface, exposed to the host as a texture-backed skin.
///
/// The skin owns exactly one host texture between creation and [`CanvasSkin::dispose`].
pub struct CanvasSkin {
    surface: Option<Surface>,
    size: [f64; 2],
    rotation_center: [f64; 2],
    smoothing: bool,
}

fn surface_dim(logical: f64, scale: f64) -> u32 {
    let v = (logical * scale).round();
    if v.is_finite() {
        v.clamp(1.0, f64::from(u16::MAX)) as u32
    } else {
        1
    }
}

impl CanvasSkin {
    /// Allocate the surface and its texture, and upload the (transparent) surface once.
    pub fn new(renderer: &mut dyn Renderer, canvas: Canvas) -> ReCanvasResult<Self> {
        let texture = renderer.create_texture();
        let (w, h) = (f64::from(canvas.width), f64::from(canvas.height));
        let mut skin = Self {
            surface: Some(Surface {
                texture,
                context: Context2D::new(canvas),
                images: ImageCache::new(),
            }),
            size: [w, h],
            rotation_center: [w / 2.0, h / 2.0],
            smoothing: true,
        };
        skin.render(renderer)?;
        debug!(texture = texture.0, width = canvas.width, height = canvas.height, "skin created");
        Ok(skin)
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.surface.as_ref().map(|s| s.texture)
    }

    pub fn is_disposed(&self) -> bool {
        self.surface.is_none()
    }

    pub fn context(&self) -> Option<&Context2D> {
        self.surface.as_ref().map(|s| &s.context)
    }

    pub fn context_mut(&mut self) -> Option<&mut Context2D> {
        self.surface.as_mut().map(|s| &mut s.context)
    }

    pub fn images(&self) -> Option<&ImageCache> {
        self.surface.as_ref().map(|s| &s.images)
    }

    pub fn images_mut(&mut self) -> Option<&mut ImageCache> {
        self.surface.as_mut().map(|s| &mut s.images)
    }

    /// Context and image cache together, for `drawImage`.
    pub fn context_and_images(&mut self) -> Option<(&mut Context2D, &mut ImageCache)> {
        self.surface
            .as_mut()
            .map(|s| (&mut s.context, &mut s.images))
    }

    pub fn size(&self) -> [f64; 2] {
        self.size
    }

    pub fn rotation_center(&self) -> [f64; 2] {
        self.rotation_center
    }

    pub fn texture_smoothing(&self) -> bool {
        self.smoothing
    }

    pub fn set_texture_smoothing(&mut self, enabled: bool) {
        self.smoothing = enabled;
    }

    /// Upload the surface to the texture. A disposed skin uploads nothing.
    pub fn render(&mut self, renderer: &mut dyn Renderer) -> ReCanvasResult<()> {
        let Some(surface) = &self.surface else {
            return Ok(());
        };
        let canvas = surface.context.canvas();
        renderer.upload_texture(
            surface.texture,
            TextureUpload {
                width: canvas.width,
                height: canvas.height,
                data: surface.context.pixels(),
                sampling: if self.smoothing {
                    Sampling::Linear
                } else {
                    Sampling::Nearest
                },
                size: self.size,
                rotation_center: self.rotation_center,
            },
        )
    }

    /// Resize to a `width × height` skin backed by a `width*scale_w × height*scale_h` surface.
    ///
    /// Content and context state are discarded; the fresh context is pre-scaled so drawing
    /// coordinates stay in skin units.
    pub fn resize(
        &mut self,
        width: f64,
        scale_w: f64,
        height: f64,
        scale_h: f64,
    ) -> ReCanvasResult<()> {
        if ![width, scale_w, height, scale_h].iter().all(|v| v.is_finite()) {
            return Err(ReCanvasError::argument("canvas size must be finite"));
        }
        let Some(surface) = &mut self.surface else {
            return Ok(());
        };
        let canvas = Canvas::new(surface_dim(width, scale_w), surface_dim(height, scale_h))?;
        surface.context.resize(canvas);
        surface.context.scale(scale_w, scale_h);
        self.size = [width, height];
        self.rotation_center = [width / 2.0, height / 2.0];
        debug!(width, height, surface_w = canvas.width, surface_h = canvas.height, "skin resized");
        Ok(())
    }

    /// Release the texture and drop the surface. Later calls do nothing.
    pub fn dispose(&mut self, renderer: &mut dyn Renderer) {
        if let Some(surface) = self.surface.take() {
            renderer.destroy_texture(surface.texture);
            debug!(texture = surface.texture.0, "skin disposed");
        }
    }
}

impl std::fmt::Debug for CanvasSkin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasSkin")
            .field("texture", &self.texture())
            .field("size", &self.size)
            .field("rotation_center", &self.rotation_center)
            .field("smoothing", &self.smoothing)
            .finish()
    }
}
