pub mod hooks;
pub mod renderer;
pub mod scheduler;
pub mod stage;

pub use hooks::{FrameHooks, FrameObserver, HostEvent};
pub use renderer::{FrameRGBA, Renderer, Sampling, TextureUpload};
pub use scheduler::{EffectHost, FrameRequestId, FrameScheduler, PixelSurface};
pub use stage::{Stage, StageOpts};
