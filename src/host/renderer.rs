use crate::foundation::core::{Canvas, SpriteId, TextureId};
use crate::foundation::error::{ReCanvasError, ReCanvasResult};

/// A frame of RGBA8 pixels.
///
/// Buffers handed across the host boundary are **premultiplied** unless `premultiplied` is
/// `false` (image data returned to blocks is straight alpha, as in the browser).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether the `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// Transparent frame of the given size.
    pub fn transparent(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize) * 4],
            premultiplied: true,
        }
    }

    /// Validate that `data` matches `width * height * 4`.
    pub fn check_len(&self) -> ReCanvasResult<()> {
        let want = (self.width as usize) * (self.height as usize) * 4;
        if self.data.len() != want {
            return Err(ReCanvasError::validation(format!(
                "frame byte length mismatch: got {}, want {want}",
                self.data.len()
            )));
        }
        Ok(())
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }
}

/// Texture filtering used when the host samples a skin texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Sampling {
    #[default]
    Linear,
    Nearest,
}

/// One texture upload: the rasterized surface plus the skin geometry the host should report.
#[derive(Clone, Copy, Debug)]
pub struct TextureUpload<'a> {
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    /// Premultiplied RGBA8 surface bytes.
    pub data: &'a [u8],
    pub sampling: Sampling,
    /// Logical skin size in stage units.
    pub size: [f64; 2],
    /// Rotation center in stage units, relative to the skin's top-left.
    pub rotation_center: [f64; 2],
}

/// The host renderer surface the canvas extension talks to.
///
/// Implementations own textures and sprite drawables. The extension never assumes a GPU: the
/// headless [`crate::host::stage::Stage`] keeps textures in memory.
pub trait Renderer {
    /// Allocate an empty texture.
    fn create_texture(&mut self) -> TextureId;

    /// Replace a texture's content.
    fn upload_texture(&mut self, id: TextureId, upload: TextureUpload<'_>) -> ReCanvasResult<()>;

    /// Release a texture. Unknown ids are ignored.
    fn destroy_texture(&mut self, id: TextureId);

    /// Point a sprite's drawable at a texture-backed skin.
    fn attach_skin(&mut self, sprite: SpriteId, texture: TextureId);

    /// Put the sprite's own costume back on its drawable.
    fn restore_costume(&mut self, sprite: SpriteId);

    /// Ask the host to draw another frame.
    fn request_redraw(&mut self);

    /// Size of the host's output canvas in device pixels.
    fn stage_size(&self) -> Canvas;

    /// Logical stage size (480×360 for Scratch projects).
    fn native_size(&self) -> Canvas;
}
