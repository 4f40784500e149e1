use serde::Deserialize;

use crate::assets::FetchPolicy;
use crate::foundation::core::Canvas;
use crate::foundation::error::ReCanvasResult;

/// Canvas extension settings.
///
/// `RECANVAS_CANVAS_WIDTH`, `RECANVAS_CANVAS_HEIGHT` and `RECANVAS_REINSTALL_DELAY_MS` override
/// the corresponding fields in [`ReCanvasOpts::with_env_overrides`]; unparseable values are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReCanvasOpts {
    /// Surface size of a freshly enabled canvas.
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Delay before the redraw hook is re-installed after another extension loads.
    pub reinstall_delay_ms: u64,
    pub fetch_policy: FetchPolicy,
}

impl Default for ReCanvasOpts {
    fn default() -> Self {
        Self {
            canvas_width: 480,
            canvas_height: 360,
            reinstall_delay_ms: 500,
            fetch_policy: FetchPolicy::RemoteOnly,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl ReCanvasOpts {
    pub fn with_canvas_size(mut self, width: u32, height: u32) -> Self {
        self.canvas_width = width;
        self.canvas_height = height;
        self
    }

    pub fn with_reinstall_delay_ms(mut self, ms: u64) -> Self {
        self.reinstall_delay_ms = ms;
        self
    }

    pub fn with_fetch_policy(mut self, policy: FetchPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(w) = env_parse::<u32>("RECANVAS_CANVAS_WIDTH").filter(|&n| n > 0) {
            self.canvas_width = w;
        }
        if let Some(h) = env_parse::<u32>("RECANVAS_CANVAS_HEIGHT").filter(|&n| n > 0) {
            self.canvas_height = h;
        }
        if let Some(ms) = env_parse::<u64>("RECANVAS_REINSTALL_DELAY_MS") {
            self.reinstall_delay_ms = ms;
        }
        self
    }

    pub fn initial_canvas(&self) -> ReCanvasResult<Canvas> {
        Canvas::new(self.canvas_width, self.canvas_height)
    }

    pub fn reinstall_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reinstall_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_scratch_stage() {
        let opts = ReCanvasOpts::default();
        assert_eq!(opts.initial_canvas().unwrap(), Canvas::new(480, 360).unwrap());
        assert_eq!(opts.reinstall_delay().as_millis(), 500);
        assert_eq!(opts.fetch_policy, FetchPolicy::RemoteOnly);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let opts: ReCanvasOpts =
            serde_json::from_str(r#"{"canvas_width":100,"fetch_policy":{"kind":"deny_all"}}"#)
                .unwrap();
        assert_eq!(opts.canvas_width, 100);
        assert_eq!(opts.canvas_height, 360);
        assert_eq!(opts.fetch_policy, FetchPolicy::DenyAll);
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(
            ReCanvasOpts::default()
                .with_canvas_size(0, 10)
                .initial_canvas()
                .is_err()
        );
    }
}
