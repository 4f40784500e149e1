use tracing::{debug, warn};

use crate::effects::pixel::{WaveParams, apply_wave};
use crate::foundation::error::ReCanvasResult;
use crate::host::scheduler::{EffectHost, FrameRequestId, FrameScheduler};

/// A running wave distortion.
///
/// Idle once stopped; a stopped session never touches the stage again. Pixels already distorted
/// stay that way until the host repaints.
#[derive(Debug)]
pub struct WaveSession {
    params: WaveParams,
    frame: u64,
    pending: Option<FrameRequestId>,
    running: bool,
}

impl WaveSession {
    /// Begin the loop by requesting the first frame.
    pub fn start<S: FrameScheduler + ?Sized>(host: &mut S, params: WaveParams) -> Self {
        let pending = Some(host.request_frame());
        debug!(?params, "wave started");
        Self {
            params: params.clamped(),
            frame: 0,
            pending,
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn params(&self) -> WaveParams {
        self.params
    }

    pub fn set_params(&mut self, params: WaveParams) {
        self.params = params.clamped();
    }

    pub fn pending_request(&self) -> Option<FrameRequestId> {
        self.pending
    }

    /// Handle a delivered frame request. Returns `false` if `id` is not this session's request.
    #[tracing::instrument(level = "trace", skip(self, host), fields(frame = self.frame))]
    pub fn on_frame<H: EffectHost + ?Sized>(
        &mut self,
        host: &mut H,
        id: FrameRequestId,
    ) -> ReCanvasResult<bool> {
        if !self.running || self.pending != Some(id) {
            return Ok(false);
        }
        self.pending = None;

        let mut pixels = host.read_pixels();
        apply_wave(&mut pixels, &self.params, self.frame);
        let written = host.write_pixels(&pixels);
        self.frame += 1;
        self.pending = Some(host.request_frame());
        if let Err(e) = &written {
            warn!(error = %e, "wave frame not written");
        }
        written.map(|()| true)
    }

    pub fn stop<S: FrameScheduler + ?Sized>(&mut self, host: &mut S) {
        self.running = false;
        if let Some(id) = self.pending.take() {
            host.cancel_frame(id);
        }
        debug!(frames = self.frame, "wave stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::scheduler::PixelSurface;
    use crate::host::stage::{Stage, StageOpts};

    #[test]
    fn each_frame_requests_the_next() {
        let mut stage = Stage::new(StageOpts::default().with_size(16, 16));
        let mut wave = WaveSession::start(&mut stage, WaveParams::default());
        for expected in 1..=3 {
            let due = stage.take_due_frames();
            assert_eq!(due.len(), 1);
            assert!(wave.on_frame(&mut stage, due[0]).unwrap());
            assert_eq!(wave.frame(), expected);
        }
        assert_eq!(stage.pending_frame_requests(), 1);
    }

    #[test]
    fn foreign_or_stale_requests_are_ignored() {
        let mut stage = Stage::new(StageOpts::default().with_size(4, 4));
        let mut wave = WaveSession::start(&mut stage, WaveParams::default());
        assert!(!wave.on_frame(&mut stage, FrameRequestId(999)).unwrap());
        let id = wave.pending_request().unwrap();
        wave.stop(&mut stage);
        assert!(!wave.on_frame(&mut stage, id).unwrap());
        assert_eq!(wave.frame(), 0);
    }

    #[test]
    fn stop_leaves_pixels_as_they_are() {
        let mut stage = Stage::new(StageOpts::default().with_size(8, 8));
        let mut frame = stage.read_pixels();
        for (i, px) in frame.data.chunks_exact_mut(4).enumerate() {
            px.copy_from_slice(&[(i % 8) as u8 * 30, 0, 0, 255]);
        }
        stage.write_pixels(&frame).unwrap();

        let mut wave = WaveSession::start(&mut stage, WaveParams::new(3.0, 1.0, 0.0));
        let id = stage.take_due_frames()[0];
        wave.on_frame(&mut stage, id).unwrap();
        let distorted = stage.read_pixels();
        assert_ne!(distorted, frame);
        wave.stop(&mut stage);
        assert_eq!(stage.read_pixels(), distorted);
        assert_eq!(stage.pending_frame_requests(), 0);
    }
}
