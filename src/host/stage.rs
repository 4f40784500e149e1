use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

use crate::canvas::composite::over;
use crate::canvas::sample::sample_premul;
use crate::foundation::core::{Canvas, Rgba8, SpriteId, TextureId};
use crate::foundation::error::{ReCanvasError, ReCanvasResult};
use crate::foundation::math::unpremultiply_rgba8_in_place;
use crate::host::hooks::{FrameHooks, HostEvent};
use crate::host::renderer::{FrameRGBA, Renderer, Sampling, TextureUpload};
use crate::host::scheduler::{FrameRequestId, FrameScheduler, PixelSurface};

/// Headless host configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct StageOpts {
    /// Output canvas size in device pixels.
    pub width: u32,
    pub height: u32,
    /// Logical project size.
    pub native_width: u32,
    pub native_height: u32,
    pub background: Rgba8,
}

impl Default for StageOpts {
    fn default() -> Self {
        Self {
            width: 480,
            height: 360,
            native_width: 480,
            native_height: 360,
            background: Rgba8::opaque(255, 255, 255),
        }
    }
}

impl StageOpts {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// Last upload received for a texture.
#[derive(Clone, Debug)]
pub struct StageTexture {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub sampling: Sampling,
    pub size: [f64; 2],
    pub rotation_center: [f64; 2],
    pub uploads: u32,
}

#[derive(Clone, Debug, Default)]
struct SpriteSlot {
    /// Scratch coordinates: origin at the stage center, y up.
    x: f64,
    y: f64,
    skin: Option<TextureId>,
}

fn clamp_canvas(width: u32, height: u32) -> Canvas {
    Canvas {
        width: width.clamp(1, u32::from(u16::MAX)),
        height: height.clamp(1, u32::from(u16::MAX)),
    }
}

/// In-memory host: textures, sprites, frame hooks, a frame scheduler and a stage buffer.
///
/// A frame is produced by [`Stage::draw`]: frame hooks run first, then every sprite with an
/// attached skin texture is composited over the background.
pub struct Stage {
    size: Canvas,
    native: Canvas,
    background: Rgba8,
    textures: HashMap<TextureId, StageTexture>,
    next_texture: u64,
    destroyed: usize,
    sprites: BTreeMap<SpriteId, SpriteSlot>,
    next_sprite: u32,
    hooks: FrameHooks,
    events: VecDeque<HostEvent>,
    redraw_requested: bool,
    frame_requests: BTreeSet<FrameRequestId>,
    next_request: u64,
    pixels: FrameRGBA,
    frames: u64,
}

impl Stage {
    pub fn new(opts: StageOpts) -> Self {
        let size = clamp_canvas(opts.width, opts.height);
        let mut stage = Self {
            size,
            native: clamp_canvas(opts.native_width, opts.native_height),
            background: opts.background,
            textures: HashMap::new(),
            next_texture: 1,
            destroyed: 0,
            sprites: BTreeMap::new(),
            next_sprite: 1,
            hooks: FrameHooks::new(),
            events: VecDeque::new(),
            redraw_requested: false,
            frame_requests: BTreeSet::new(),
            next_request: 1,
            pixels: FrameRGBA::transparent(size.width, size.height),
            frames: 0,
        };
        stage.fill_background();
        stage
    }

    fn fill_background(&mut self) {
        let bg = self.background.premultiplied();
        for px in self.pixels.data.chunks_exact_mut(4) {
            px.copy_from_slice(&bg);
        }
    }

    // Sprites.

    pub fn add_sprite(&mut self) -> SpriteId {
        let id = SpriteId(self.next_sprite);
        self.next_sprite += 1;
        self.sprites.insert(id, SpriteSlot::default());
        id
    }

    pub fn set_sprite_position(&mut self, sprite: SpriteId, x: f64, y: f64) {
        if let Some(slot) = self.sprites.get_mut(&sprite) {
            slot.x = x;
            slot.y = y;
        }
    }

    /// Delete a sprite and queue [`HostEvent::SpriteRemoved`].
    pub fn remove_sprite(&mut self, sprite: SpriteId) -> bool {
        if self.sprites.remove(&sprite).is_none() {
            return false;
        }
        self.events.push_back(HostEvent::SpriteRemoved(sprite));
        true
    }

    /// Texture currently shown by `sprite`, if it wears a custom skin.
    pub fn sprite_skin(&self, sprite: SpriteId) -> Option<TextureId> {
        self.sprites.get(&sprite).and_then(|s| s.skin)
    }

    // Extensions and hooks.

    /// Load another extension and queue [`HostEvent::ExtensionAdded`].
    pub fn add_extension(&mut self, id: &str) {
        self.events.push_back(HostEvent::ExtensionAdded(id.to_string()));
    }

    /// Swap in a fresh draw pipeline, dropping every installed frame hook.
    pub fn replace_draw_pipeline(&mut self) {
        debug!(dropped = self.hooks.len(), "draw pipeline replaced");
        self.hooks.clear();
    }

    pub fn hooks(&self) -> &FrameHooks {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut FrameHooks {
        &mut self.hooks
    }

    pub fn drain_events(&mut self) -> Vec<HostEvent> {
        self.events.drain(..).collect()
    }

    // Frames.

    pub fn redraw_requested(&self) -> bool {
        self.redraw_requested
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Run frame hooks and composite every skinned sprite.
    #[tracing::instrument(level = "trace", skip(self), fields(frame = self.frames))]
    pub fn draw(&mut self) {
        let mut hooks = std::mem::take(&mut self.hooks);
        hooks.run_before_frame(self);
        self.hooks = hooks;

        self.fill_background();
        let sprites: Vec<SpriteSlot> = self.sprites.values().cloned().collect();
        for slot in sprites {
            if let Some(tex) = slot.skin {
                self.composite_sprite(&slot, tex);
            }
        }
        self.redraw_requested = false;
        self.frames += 1;
    }

    fn composite_sprite(&mut self, slot: &SpriteSlot, tex: TextureId) {
        let Some(texture) = self.textures.get(&tex) else {
            return;
        };
        if texture.width == 0 || texture.height == 0 || texture.size[0] <= 0.0 || texture.size[1] <= 0.0 {
            return;
        }
        // Stage units to device pixels.
        let ux = f64::from(self.size.width) / f64::from(self.native.width);
        let uy = f64::from(self.size.height) / f64::from(self.native.height);
        let left = (f64::from(self.native.width) / 2.0 + slot.x - texture.rotation_center[0]) * ux;
        let top = (f64::from(self.native.height) / 2.0 - slot.y - texture.rotation_center[1]) * uy;
        // Device pixels to texture pixels.
        let tx = f64::from(texture.width) / (texture.size[0] * ux);
        let ty = f64::from(texture.height) / (texture.size[1] * uy);
        let smooth = texture.sampling == Sampling::Linear;

        let width = self.size.width as usize;
        for py in 0..self.size.height {
            for px in 0..self.size.width {
                let sx = (f64::from(px) + 0.5 - left) * tx;
                let sy = (f64::from(py) + 0.5 - top) * ty;
                let Some(src) =
                    sample_premul(&texture.data, texture.width, texture.height, sx, sy, smooth)
                else {
                    continue;
                };
                let i = ((py as usize) * width + px as usize) * 4;
                let dst = [
                    self.pixels.data[i],
                    self.pixels.data[i + 1],
                    self.pixels.data[i + 2],
                    self.pixels.data[i + 3],
                ];
                self.pixels.data[i..i + 4].copy_from_slice(&over(dst, src, 1.0));
            }
        }
    }

    /// Hand out every pending frame request; the caller delivers them to their owners.
    pub fn take_due_frames(&mut self) -> Vec<FrameRequestId> {
        std::mem::take(&mut self.frame_requests).into_iter().collect()
    }

    pub fn pending_frame_requests(&self) -> usize {
        self.frame_requests.len()
    }

    // Texture inspection.

    pub fn texture(&self, id: TextureId) -> Option<&StageTexture> {
        self.textures.get(&id)
    }

    pub fn upload_count(&self, id: TextureId) -> u32 {
        self.textures.get(&id).map_or(0, |t| t.uploads)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn destroyed_textures(&self) -> usize {
        self.destroyed
    }

    /// Write the stage buffer as a straight-alpha PNG.
    pub fn write_png(&self, path: &Path) -> ReCanvasResult<()> {
        let mut rgba = self.pixels.data.clone();
        unpremultiply_rgba8_in_place(&mut rgba);
        image::save_buffer(
            path,
            &rgba,
            self.size.width,
            self.size.height,
            image::ExtendedColorType::Rgba8,
        )
        .with_context(|| format!("write stage png {}", path.display()))?;
        Ok(())
    }
}

impl Renderer for Stage {
    fn create_texture(&mut self) -> TextureId {
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(
            id,
            StageTexture {
                width: 0,
                height: 0,
                data: Vec::new(),
                sampling: Sampling::default(),
                size: [0.0, 0.0],
                rotation_center: [0.0, 0.0],
                uploads: 0,
            },
        );
        id
    }

    fn upload_texture(&mut self, id: TextureId, upload: TextureUpload<'_>) -> ReCanvasResult<()> {
        let want = (upload.width as usize) * (upload.height as usize) * 4;
        if upload.data.len() != want {
            return Err(ReCanvasError::validation(format!(
                "texture upload length mismatch: got {}, want {want}",
                upload.data.len()
            )));
        }
        let texture = self
            .textures
            .get_mut(&id)
            .ok_or_else(|| ReCanvasError::host(format!("unknown texture {}", id.0)))?;
        texture.width = upload.width;
        texture.height = upload.height;
        texture.data.clear();
        texture.data.extend_from_slice(upload.data);
        texture.sampling = upload.sampling;
        texture.size = upload.size;
        texture.rotation_center = upload.rotation_center;
        texture.uploads += 1;
        Ok(())
    }

    fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(&id).is_some() {
            self.destroyed += 1;
            for slot in self.sprites.values_mut() {
                if slot.skin == Some(id) {
                    slot.skin = None;
                }
            }
        }
    }

    fn attach_skin(&mut self, sprite: SpriteId, texture: TextureId) {
        if let Some(slot) = self.sprites.get_mut(&sprite) {
            slot.skin = Some(texture);
        }
    }

    fn restore_costume(&mut self, sprite: SpriteId) {
        if let Some(slot) = self.sprites.get_mut(&sprite) {
            slot.skin = None;
        }
    }

    fn request_redraw(&mut self) {
        self.redraw_requested = true;
    }

    fn stage_size(&self) -> Canvas {
        self.size
    }

    fn native_size(&self) -> Canvas {
        self.native
    }
}

impl FrameScheduler for Stage {
    fn request_frame(&mut self) -> FrameRequestId {
        let id = FrameRequestId(self.next_request);
        self.next_request += 1;
        self.frame_requests.insert(id);
        id
    }

    fn cancel_frame(&mut self, id: FrameRequestId) {
        self.frame_requests.remove(&id);
    }
}

impl PixelSurface for Stage {
    fn read_pixels(&self) -> FrameRGBA {
        self.pixels.clone()
    }

    fn write_pixels(&mut self, frame: &FrameRGBA) -> ReCanvasResult<()> {
        frame.check_len()?;
        if frame.width != self.size.width || frame.height != self.size.height {
            return Err(ReCanvasError::validation(format!(
                "frame is {}x{}, stage is {}x{}",
                frame.width, frame.height, self.size.width, self.size.height
            )));
        }
        self.pixels.data.copy_from_slice(&frame.data);
        Ok(())
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("size", &self.size)
            .field("native", &self.native)
            .field("textures", &self.textures.len())
            .field("sprites", &self.sprites.len())
            .field("hooks", &self.hooks)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}
