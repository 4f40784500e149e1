use crate::foundation::error::ReCanvasResult;
use crate::host::renderer::FrameRGBA;

/// Handle for a pending animation-frame request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameRequestId(pub u64);

/// Animation-frame scheduling, as offered by the platform.
pub trait FrameScheduler {
    /// Ask for a callback on the next frame.
    fn request_frame(&mut self) -> FrameRequestId;

    /// Cancel a pending request. Unknown or already delivered ids are ignored.
    fn cancel_frame(&mut self, id: FrameRequestId);
}

/// Read/write access to the host's composited stage pixels.
pub trait PixelSurface {
    /// Copy of the current stage pixels (premultiplied RGBA8).
    fn read_pixels(&self) -> FrameRGBA;

    /// Overwrite the stage pixels. The frame must match the stage size.
    fn write_pixels(&mut self, frame: &FrameRGBA) -> ReCanvasResult<()>;
}

/// Everything the stage effects need from a host.
pub trait EffectHost: PixelSurface + FrameScheduler {}

impl<T: PixelSurface + FrameScheduler> EffectHost for T {}
