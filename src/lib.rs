//! ReCanvas gives sprites of a block-programming host their own 2D drawing surface, and adds
//! post-processing effects for the composited stage.
//!
//! - [`ReCanvas`] maps canvas blocks onto a per-sprite [`Context2D`] and re-textures dirty
//!   surfaces from a frame hook
//! - [`StageEffects`] runs the wave loop and the one-shot channel split and glitch
//! - [`Stage`] is a headless host implementing every host trait
#![forbid(unsafe_code)]

mod foundation;

pub mod assets;
pub mod blocks;
pub mod canvas;
pub mod effects;
pub mod extension;
pub mod host;
pub mod skin;

pub use crate::foundation::core::{
    Affine, BezPath, Canvas, Point, Rect, Rgba8, SpriteId, TextureId, Vec2,
};
pub use crate::foundation::error::{ReCanvasError, ReCanvasResult};

pub use crate::assets::{CachedImage, DefaultFetcher, FetchPolicy, ImageCache, ImageFetcher};
pub use crate::blocks::{ExtensionInfo, effects_info, recanvas_info};
pub use crate::canvas::{CompositeMode, Context2D, TextEngine};
pub use crate::effects::{GlitchParams, StageEffects, WaveParams, WaveSession};
pub use crate::extension::{BlockUtil, BlockValue, REDRAW_HOOK_KEY, ReCanvas, ReCanvasOpts};
pub use crate::host::{
    EffectHost, FrameHooks, FrameObserver, FrameRGBA, FrameRequestId, FrameScheduler, HostEvent,
    PixelSurface, Renderer, Sampling, Stage, StageOpts, TextureUpload,
};
pub use crate::skin::CanvasSkin;
