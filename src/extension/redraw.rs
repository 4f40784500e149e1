use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::warn;

use crate::foundation::core::SpriteId;
use crate::host::hooks::FrameObserver;
use crate::host::renderer::Renderer;
use crate::skin::CanvasSkin;

/// Install marker of the redraw observer in the host's [`crate::host::FrameHooks`].
pub const REDRAW_HOOK_KEY: &str = "recanvas.redraw";

/// Drawing state of one sprite.
#[derive(Debug)]
pub(crate) struct SpriteCanvas {
    pub(crate) skin: CanvasSkin,
    /// Surface changed since the last texture upload.
    pub(crate) dirty: bool,
}

pub(crate) type SharedStates = Rc<RefCell<BTreeMap<SpriteId, SpriteCanvas>>>;

/// Re-textures dirty surfaces before each host frame.
pub(crate) struct RedrawObserver {
    states: SharedStates,
}

impl RedrawObserver {
    pub(crate) fn new(states: SharedStates) -> Self {
        Self { states }
    }
}

impl FrameObserver for RedrawObserver {
    fn before_frame(&mut self, renderer: &mut dyn Renderer) {
        let Ok(mut states) = self.states.try_borrow_mut() else {
            warn!("canvas states busy, skipping redraw");
            return;
        };
        for (sprite, state) in states.iter_mut() {
            if let Some(images) = state.skin.images_mut() {
                images.drain_finished();
            }
            if !state.dirty {
                continue;
            }
            if let Err(e) = state.skin.render(renderer) {
                warn!(sprite = sprite.0, error = %e, "canvas texture upload failed");
            }
            state.dirty = false;
        }
    }
}
