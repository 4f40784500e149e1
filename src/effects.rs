//! Stage post-processing: a per-frame wave loop plus one-shot channel split and glitch.
//!
//! These operate on the host's composited stage pixels through [`EffectHost`], independent of
//! the canvas extension.

use serde_json::{Map, Value};
use tracing::debug;

use crate::extension::BlockArgs;
use crate::foundation::error::{ReCanvasError, ReCanvasResult};
use crate::host::scheduler::{EffectHost, FrameRequestId, FrameScheduler};
use crate::host::stage::Stage;

pub mod pixel;
pub mod wave;

pub use pixel::{GlitchParams, MAX_GLITCH_BLOCKS, WaveParams, apply_wave, channel_split, glitch};
pub use wave::WaveSession;

/// Effect blocks. Owns at most one wave session.
#[derive(Debug)]
pub struct StageEffects {
    wave: Option<WaveSession>,
    glitch: GlitchParams,
    rng: fastrand::Rng,
}

impl Default for StageEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl StageEffects {
    pub fn new() -> Self {
        Self::with_rng(fastrand::Rng::new())
    }

    /// Deterministic glitches.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(fastrand::Rng::with_seed(seed))
    }

    fn with_rng(rng: fastrand::Rng) -> Self {
        Self {
            wave: None,
            glitch: GlitchParams::default(),
            rng,
        }
    }

    pub fn with_glitch_params(mut self, params: GlitchParams) -> Self {
        self.glitch = params;
        self
    }

    pub fn wave(&self) -> Option<&WaveSession> {
        self.wave.as_ref()
    }

    pub fn wave_running(&self) -> bool {
        self.wave.as_ref().is_some_and(WaveSession::is_running)
    }

    /// Start the wave, or retune it if one is already running.
    pub fn start_wave<S: FrameScheduler + ?Sized>(&mut self, host: &mut S, params: WaveParams) {
        if let Some(session) = self.wave.as_mut().filter(|s| s.is_running()) {
            session.set_params(params);
            return;
        }
        self.wave = Some(WaveSession::start(host, params));
    }

    pub fn stop_wave<S: FrameScheduler + ?Sized>(&mut self, host: &mut S) {
        if let Some(mut session) = self.wave.take() {
            session.stop(host);
        }
    }

    /// Deliver a granted frame request. Returns `true` if it belonged to the wave.
    pub fn on_frame<H: EffectHost + ?Sized>(
        &mut self,
        host: &mut H,
        id: FrameRequestId,
    ) -> ReCanvasResult<bool> {
        match &mut self.wave {
            Some(session) => session.on_frame(host, id),
            None => Ok(false),
        }
    }

    /// Deliver every due frame request of the headless stage.
    pub fn run_due_frames(&mut self, stage: &mut Stage) -> ReCanvasResult<()> {
        for id in stage.take_due_frames() {
            self.on_frame(stage, id)?;
        }
        Ok(())
    }

    pub fn channel_split<H: EffectHost + ?Sized>(
        &mut self,
        host: &mut H,
        strength: f64,
    ) -> ReCanvasResult<()> {
        // `as` saturates; NaN becomes 0.
        let s = strength.round() as i64;
        let mut pixels = host.read_pixels();
        channel_split(&mut pixels, s);
        host.write_pixels(&pixels)
    }

    pub fn glitch<H: EffectHost + ?Sized>(
        &mut self,
        host: &mut H,
        frequency: f64,
    ) -> ReCanvasResult<()> {
        let n = if frequency.is_finite() {
            frequency.round().clamp(0.0, f64::from(MAX_GLITCH_BLOCKS)) as u32
        } else {
            0
        };
        if n == 0 {
            return Ok(());
        }
        let mut pixels = host.read_pixels();
        glitch(&mut pixels, n, &self.glitch, &mut self.rng);
        debug!(blocks = n, "glitch applied");
        host.write_pixels(&pixels)
    }

    /// Dispatch an effects block by opcode.
    pub fn call<H: EffectHost + ?Sized>(
        &mut self,
        host: &mut H,
        opcode: &str,
        args: &Map<String, Value>,
    ) -> ReCanvasResult<()> {
        let a = BlockArgs(args);
        match opcode {
            "startWave" => {
                let params =
                    WaveParams::new(a.number("strength"), a.number("frequency"), a.number("speed"));
                self.start_wave(host, params);
                Ok(())
            }
            "stopWave" => {
                self.stop_wave(host);
                Ok(())
            }
            "channelSplit" => self.channel_split(host, a.number("strength")),
            "glitch" => self.glitch(host, a.number("frequency")),
            other => Err(ReCanvasError::argument(format!("unknown opcode: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::host::scheduler::PixelSurface;
    use crate::host::stage::StageOpts;

    #[test]
    fn starting_twice_keeps_one_session() {
        let mut stage = Stage::new(StageOpts::default().with_size(8, 8));
        let mut fx = StageEffects::with_seed(1);
        fx.start_wave(&mut stage, WaveParams::default());
        fx.start_wave(&mut stage, WaveParams::new(50.0, 0.1, 0.2));
        assert_eq!(stage.pending_frame_requests(), 1);
        assert_eq!(fx.wave().unwrap().params().strength, 50.0);
    }

    #[test]
    fn start_then_stop_leaves_nothing_scheduled() {
        let mut stage = Stage::new(StageOpts::default().with_size(8, 8));
        let mut fx = StageEffects::new();
        fx.start_wave(&mut stage, WaveParams::default());
        fx.stop_wave(&mut stage);
        assert_eq!(stage.pending_frame_requests(), 0);
        assert!(!fx.wave_running());
        fx.run_due_frames(&mut stage).unwrap();
    }

    #[test]
    fn glitch_zero_and_negative_are_noops() {
        let mut stage = Stage::new(StageOpts::default().with_size(16, 16));
        let before = stage.read_pixels();
        let mut fx = StageEffects::with_seed(9);
        fx.glitch(&mut stage, 0.0).unwrap();
        fx.glitch(&mut stage, -5.0).unwrap();
        fx.glitch(&mut stage, f64::NAN).unwrap();
        assert_eq!(stage.read_pixels(), before);
    }

    #[test]
    fn call_dispatch() {
        let mut stage = Stage::new(StageOpts::default().with_size(8, 8));
        let mut fx = StageEffects::with_seed(2);
        let args = match json!({"strength": "5", "frequency": 0.1, "speed": 1}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        fx.call(&mut stage, "startWave", &args).unwrap();
        assert!(fx.wave_running());
        fx.call(&mut stage, "stopWave", &Map::new()).unwrap();
        assert!(!fx.wave_running());
        fx.call(&mut stage, "channelSplit", &Map::new()).unwrap();
        assert!(fx.call(&mut stage, "explode", &Map::new()).is_err());
    }
}
