//! The canvas block extension.
//!
//! [`ReCanvas`] keeps one [`SpriteCanvas`](redraw::SpriteCanvas) per sprite in a side table
//! shared with the redraw observer. Blocks called on a sprite without a canvas do nothing.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::assets::{DefaultFetcher, ImageFetcher};
use crate::canvas::{Context2D, TextEngine};
use crate::foundation::core::SpriteId;
use crate::foundation::error::{ReCanvasError, ReCanvasResult};
use crate::host::hooks::{FrameHooks, HostEvent};
use crate::host::renderer::{FrameRGBA, Renderer};
use crate::host::stage::Stage;
use crate::skin::CanvasSkin;

pub mod args;
pub mod config;
pub mod redraw;

pub use args::BlockArgs;
pub use config::ReCanvasOpts;
pub use redraw::REDRAW_HOOK_KEY;

use redraw::{RedrawObserver, SharedStates, SpriteCanvas};

/// The sprite a block runs for and the renderer it may touch.
pub struct BlockUtil<'a> {
    pub target: SpriteId,
    pub renderer: &'a mut dyn Renderer,
}

impl<'a> BlockUtil<'a> {
    pub fn new(target: SpriteId, renderer: &'a mut dyn Renderer) -> Self {
        Self { target, renderer }
    }
}

/// Value reported by a reporter block or button.
#[derive(Clone, Debug, PartialEq)]
pub enum BlockValue {
    Number(f64),
    Text(String),
    ImageData(FrameRGBA),
}

impl BlockValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

const ABOUT: &str = "Re:Canvas v3\n\nAvoid redrawing very large canvases from many clones every frame \
unless your device can keep up.";

/// Run `f` on the target's context. `None` when the target has no canvas.
///
/// Mutating blocks pass `dirty = true`, which flags the surface for the next redraw and asks the
/// host for a frame.
fn with_context<R>(
    states: &SharedStates,
    util: &mut BlockUtil<'_>,
    dirty: bool,
    f: impl FnOnce(&mut Context2D) -> R,
) -> Option<R> {
    let out = {
        let mut states = states.borrow_mut();
        let state = states.get_mut(&util.target)?;
        let ctx = state.skin.context_mut()?;
        let out = f(ctx);
        if dirty {
            state.dirty = true;
        }
        out
    };
    if dirty {
        util.renderer.request_redraw();
    }
    Some(out)
}

pub struct ReCanvas {
    opts: ReCanvasOpts,
    states: SharedStates,
    text: TextEngine,
    fetcher: Arc<dyn ImageFetcher>,
    reinstall_at: Option<Instant>,
}

impl Default for ReCanvas {
    fn default() -> Self {
        Self::new(ReCanvasOpts::default())
    }
}

impl ReCanvas {
    pub fn new(opts: ReCanvasOpts) -> Self {
        let fetcher = Arc::new(DefaultFetcher::new(opts.fetch_policy.clone()));
        Self::with_fetcher(opts, fetcher)
    }

    pub fn with_fetcher(opts: ReCanvasOpts, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            opts,
            states: Rc::new(RefCell::new(BTreeMap::new())),
            text: TextEngine::new(),
            fetcher,
            reinstall_at: None,
        }
    }

    pub fn opts(&self) -> &ReCanvasOpts {
        &self.opts
    }

    /// Make a font available to `fillText`, `strokeText` and `measureText`.
    pub fn register_font(&mut self, bytes: Vec<u8>) -> ReCanvasResult<String> {
        self.text.register_font(bytes)
    }

    // Lifecycle.

    /// Register the redraw observer. Returns `false` if it was already installed.
    pub fn install(&self, hooks: &mut FrameHooks) -> bool {
        hooks.install(
            REDRAW_HOOK_KEY,
            Box::new(RedrawObserver::new(self.states.clone())),
        )
    }

    pub fn on_event(&mut self, event: &HostEvent, renderer: &mut dyn Renderer, now: Instant) {
        match event {
            HostEvent::SpriteRemoved(sprite) => {
                if let Some(mut state) = self.states.borrow_mut().remove(sprite) {
                    state.skin.dispose(renderer);
                    debug!(sprite = sprite.0, "canvas state removed with sprite");
                }
            }
            HostEvent::ExtensionAdded(id) => {
                if self.reinstall_at.is_none() {
                    self.reinstall_at = Some(now + self.opts.reinstall_delay());
                    debug!(extension = %id, "redraw hook check scheduled");
                }
            }
        }
    }

    /// Run scheduled work that is due at `now`. Returns `true` if the redraw hook was re-installed.
    pub fn tick(&mut self, now: Instant, hooks: &mut FrameHooks) -> bool {
        match self.reinstall_at {
            Some(at) if now >= at => {
                self.reinstall_at = None;
                let installed = self.install(hooks);
                if installed {
                    info!("redraw hook re-installed");
                }
                installed
            }
            _ => false,
        }
    }

    pub fn reinstall_pending(&self) -> bool {
        self.reinstall_at.is_some()
    }

    /// Deliver the stage's queued events, then run due work.
    pub fn sync_with_stage(&mut self, stage: &mut Stage, now: Instant) {
        for event in stage.drain_events() {
            self.on_event(&event, stage, now);
        }
        self.tick(now, stage.hooks_mut());
    }

    /// Dispose every canvas and remove the redraw observer.
    pub fn teardown(&mut self, renderer: &mut dyn Renderer, hooks: &mut FrameHooks) {
        let states = std::mem::take(&mut *self.states.borrow_mut());
        for (sprite, mut state) in states {
            renderer.restore_costume(sprite);
            state.skin.dispose(renderer);
        }
        hooks.uninstall(REDRAW_HOOK_KEY);
        self.reinstall_at = None;
        debug!("extension torn down");
    }

    // Introspection.

    pub fn has_state(&self, sprite: SpriteId) -> bool {
        self.states.borrow().contains_key(&sprite)
    }

    pub fn is_dirty(&self, sprite: SpriteId) -> Option<bool> {
        self.states.borrow().get(&sprite).map(|s| s.dirty)
    }

    pub fn state_count(&self) -> usize {
        self.states.borrow().len()
    }

    /// Inspect a sprite's skin.
    pub fn with_skin<R>(&self, sprite: SpriteId, f: impl FnOnce(&CanvasSkin) -> R) -> Option<R> {
        self.states.borrow().get(&sprite).map(|s| f(&s.skin))
    }

    /// Block until every background image load of `sprite` has landed in its cache.
    pub fn wait_for_images(&self, sprite: SpriteId) {
        if let Some(state) = self.states.borrow_mut().get_mut(&sprite)
            && let Some(images) = state.skin.images_mut()
        {
            images.wait_pending();
        }
    }

    // Blocks.

    pub fn open_about_alert(&self) -> String {
        ABOUT.to_string()
    }

    pub fn enable_canvas(&mut self, util: &mut BlockUtil<'_>) -> ReCanvasResult<()> {
        let texture = {
            let mut states = self.states.borrow_mut();
            if let Some(state) = states.get(&util.target) {
                state.skin.texture()
            } else {
                let skin = CanvasSkin::new(util.renderer, self.opts.initial_canvas()?)?;
                let texture = skin.texture();
                states.insert(util.target, SpriteCanvas { skin, dirty: false });
                debug!(sprite = util.target.0, "canvas state created");
                texture
            }
        };
        if let Some(texture) = texture {
            util.renderer.attach_skin(util.target, texture);
        }
        util.renderer.request_redraw();
        Ok(())
    }

    pub fn disable_canvas(&mut self, util: &mut BlockUtil<'_>) {
        if self.has_state(util.target) {
            util.renderer.restore_costume(util.target);
        }
    }

    pub fn set_canvas_size(
        &mut self,
        util: &mut BlockUtil<'_>,
        width: f64,
        scale_w: f64,
        height: f64,
        scale_h: f64,
    ) {
        let resized = {
            let mut states = self.states.borrow_mut();
            let Some(state) = states.get_mut(&util.target) else {
                return;
            };
            let res = state.skin.resize(width, scale_w, height, scale_h);
            state.dirty = true;
            res
        };
        if let Err(e) = resized {
            warn!(sprite = util.target.0, error = %e, "setCanvasSize ignored");
        }
        util.renderer.request_redraw();
    }

    pub fn fill_rect(&mut self, util: &mut BlockUtil<'_>, x: f64, y: f64, w: f64, h: f64) {
        with_context(&self.states, util, true, |ctx| ctx.fill_rect(x, y, w, h));
    }

    pub fn stroke_rect(&mut self, util: &mut BlockUtil<'_>, x: f64, y: f64, w: f64, h: f64) {
        with_context(&self.states, util, true, |ctx| ctx.stroke_rect(x, y, w, h));
    }

    pub fn clear_rect(&mut self, util: &mut BlockUtil<'_>, x: f64, y: f64, w: f64, h: f64) {
        with_context(&self.states, util, true, |ctx| ctx.clear_rect(x, y, w, h));
    }

    pub fn fill_text(&mut self, util: &mut BlockUtil<'_>, text: &str, x: f64, y: f64) {
        let engine = &mut self.text;
        with_context(&self.states, util, true, |ctx| {
            ctx.fill_text(engine, text, x, y);
        });
    }

    pub fn stroke_text(&mut self, util: &mut BlockUtil<'_>, text: &str, x: f64, y: f64) {
        let engine = &mut self.text;
        with_context(&self.states, util, true, |ctx| {
            ctx.stroke_text(engine, text, x, y);
        });
    }

    pub fn measure_text(&mut self, util: &mut BlockUtil<'_>, text: &str) -> Option<f64> {
        let engine = &mut self.text;
        with_context(&self.states, util, false, |ctx| ctx.measure_text(engine, text))
    }

    /// Start a background load of `url` into the image cache under `name`.
    pub fn load_image_as(&mut self, util: &mut BlockUtil<'_>, name: &str, url: &str) {
        let mut states = self.states.borrow_mut();
        let Some(images) = states
            .get_mut(&util.target)
            .and_then(|s| s.skin.images_mut())
        else {
            return;
        };
        if let Err(e) = images.load_async(name, url, self.fetcher.clone()) {
            warn!(name, url, error = %e, "image load not started");
        }
    }

    /// Load `url` into the image cache under `name`, returning once it is decoded.
    pub fn load_image_as_wait(&mut self, util: &mut BlockUtil<'_>, name: &str, url: &str) {
        let mut states = self.states.borrow_mut();
        let Some(images) = states
            .get_mut(&util.target)
            .and_then(|s| s.skin.images_mut())
        else {
            return;
        };
        if let Err(e) = images.load_blocking(name, url, self.fetcher.as_ref()) {
            warn!(name, url, error = %e, "image load failed");
        }
    }

    pub fn draw_image(&mut self, util: &mut BlockUtil<'_>, name: &str, x: f64, y: f64) {
        if args::has_leading_integer(name) {
            return;
        }
        {
            let mut states = self.states.borrow_mut();
            let Some(state) = states.get_mut(&util.target) else {
                return;
            };
            if let Some((ctx, images)) = state.skin.context_and_images() {
                images.drain_finished();
                if let Some(image) = images.get(name) {
                    ctx.draw_image(image, x, y);
                }
            }
            state.dirty = true;
        }
        util.renderer.request_redraw();
    }

    pub fn fill(&mut self, util: &mut BlockUtil<'_>) {
        with_context(&self.states, util, true, Context2D::fill);
    }

    pub fn stroke(&mut self, util: &mut BlockUtil<'_>) {
        with_context(&self.states, util, true, Context2D::stroke);
    }

    pub fn clip(&mut self, util: &mut BlockUtil<'_>) {
        with_context(&self.states, util, true, Context2D::clip);
    }

    pub fn begin_path(&mut self, util: &mut BlockUtil<'_>) {
        with_context(&self.states, util, false, Context2D::begin_path);
    }

    pub fn close_path(&mut self, util: &mut BlockUtil<'_>) {
        with_context(&self.states, util, false, Context2D::close_path);
    }

    pub fn move_to(&mut self, util: &mut BlockUtil<'_>, x: f64, y: f64) {
        with_context(&self.states, util, false, |ctx| ctx.move_to(x, y));
    }

    pub fn line_to(&mut self, util: &mut BlockUtil<'_>, x: f64, y: f64) {
        with_context(&self.states, util, false, |ctx| ctx.line_to(x, y));
    }

    pub fn rect(&mut self, util: &mut BlockUtil<'_>, x: f64, y: f64, w: f64, h: f64) {
        with_context(&self.states, util, false, |ctx| ctx.rect(x, y, w, h));
    }

    pub fn round_rect(
        &mut self,
        util: &mut BlockUtil<'_>,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        radius: f64,
    ) {
        with_context(&self.states, util, false, |ctx| {
            ctx.round_rect(x, y, w, h, radius);
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn arc(
        &mut self,
        util: &mut BlockUtil<'_>,
        x: f64,
        y: f64,
        r: f64,
        start: f64,
        end: f64,
        anticlockwise: bool,
    ) {
        with_context(&self.states, util, false, |ctx| {
            ctx.arc(x, y, r, start, end, anticlockwise);
        });
    }

    pub fn arc_to(&mut self, util: &mut BlockUtil<'_>, x1: f64, y1: f64, x2: f64, y2: f64, r: f64) {
        with_context(&self.states, util, false, |ctx| ctx.arc_to(x1, y1, x2, y2, r));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn ellipse(
        &mut self,
        util: &mut BlockUtil<'_>,
        x: f64,
        y: f64,
        rx: f64,
        ry: f64,
        rotation: f64,
        start: f64,
        end: f64,
        anticlockwise: bool,
    ) {
        with_context(&self.states, util, false, |ctx| {
            ctx.ellipse(x, y, rx, ry, rotation, start, end, anticlockwise);
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn bezier_curve_to(
        &mut self,
        util: &mut BlockUtil<'_>,
        cp1x: f64,
        cp1y: f64,
        cp2x: f64,
        cp2y: f64,
        x: f64,
        y: f64,
    ) {
        with_context(&self.states, util, false, |ctx| {
            ctx.bezier_curve_to(cp1x, cp1y, cp2x, cp2y, x, y);
        });
    }

    pub fn scale(&mut self, util: &mut BlockUtil<'_>, sx: f64, sy: f64) {
        with_context(&self.states, util, false, |ctx| ctx.scale(sx, sy));
    }

    pub fn rotate(&mut self, util: &mut BlockUtil<'_>, angle: f64) {
        with_context(&self.states, util, false, |ctx| ctx.rotate(angle));
    }

    pub fn translate(&mut self, util: &mut BlockUtil<'_>, x: f64, y: f64) {
        with_context(&self.states, util, false, |ctx| ctx.translate(x, y));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn transform(
        &mut self,
        util: &mut BlockUtil<'_>,
        a: f64,
        b: f64,
        c: f64,
        d: f64,
        e: f64,
        f: f64,
    ) {
        with_context(&self.states, util, false, |ctx| ctx.transform(a, b, c, d, e, f));
    }

    pub fn reset_transform(&mut self, util: &mut BlockUtil<'_>) {
        with_context(&self.states, util, false, Context2D::reset_transform);
    }

    pub fn fill_style(&mut self, util: &mut BlockUtil<'_>, color: &str) {
        with_context(&self.states, util, false, |ctx| ctx.set_fill_style(color));
    }

    pub fn stroke_style(&mut self, util: &mut BlockUtil<'_>, color: &str) {
        with_context(&self.states, util, false, |ctx| ctx.set_stroke_style(color));
    }

    pub fn line_width(&mut self, util: &mut BlockUtil<'_>, width: f64) {
        with_context(&self.states, util, false, |ctx| ctx.set_line_width(width));
    }

    pub fn line_cap(&mut self, util: &mut BlockUtil<'_>, style: &str) {
        with_context(&self.states, util, false, |ctx| ctx.set_line_cap(style));
    }

    pub fn line_join(&mut self, util: &mut BlockUtil<'_>, style: &str) {
        with_context(&self.states, util, false, |ctx| ctx.set_line_join(style));
    }

    /// Set the dash pattern from a JSON array. Malformed JSON is returned to the caller.
    pub fn set_line_dash(&mut self, util: &mut BlockUtil<'_>, array: &str) -> ReCanvasResult<()> {
        with_context(&self.states, util, false, |ctx| ctx.set_line_dash(array)).unwrap_or(Ok(()))
    }

    pub fn font(&mut self, util: &mut BlockUtil<'_>, style: &str) {
        with_context(&self.states, util, false, |ctx| ctx.set_font(style));
    }

    pub fn global_alpha(&mut self, util: &mut BlockUtil<'_>, alpha: f64) {
        with_context(&self.states, util, false, |ctx| ctx.set_global_alpha(alpha));
    }

    pub fn global_composite_operation(&mut self, util: &mut BlockUtil<'_>, mode: &str) {
        with_context(&self.states, util, false, |ctx| {
            ctx.set_global_composite_operation(mode);
        });
    }

    pub fn save(&mut self, util: &mut BlockUtil<'_>) {
        with_context(&self.states, util, false, Context2D::save);
    }

    pub fn restore(&mut self, util: &mut BlockUtil<'_>) {
        with_context(&self.states, util, false, Context2D::restore);
    }

    /// Ratio of the host canvas size to the native stage size along `dimension`.
    pub fn get_descrepency(&self, renderer: &dyn Renderer, dimension: &str) -> f64 {
        let (stage, native) = (renderer.stage_size(), renderer.native_size());
        if dimension == "width" {
            f64::from(stage.width) / f64::from(native.width)
        } else {
            f64::from(stage.height) / f64::from(native.height)
        }
    }

    pub fn set_canvas_image_smoothing(&mut self, util: &mut BlockUtil<'_>, enabled: bool) {
        if let Some(state) = self.states.borrow_mut().get_mut(&util.target) {
            state.skin.set_texture_smoothing(enabled);
        }
    }

    pub fn image_smoothing_enabled(&mut self, util: &mut BlockUtil<'_>, enabled: bool) {
        with_context(&self.states, util, false, |ctx| ctx.set_image_smoothing(enabled));
    }

    /// Straight-alpha pixels of the surface over the host canvas extent.
    pub fn get_image_data(&mut self, util: &mut BlockUtil<'_>) -> Option<FrameRGBA> {
        let stage = util.renderer.stage_size();
        with_context(&self.states, util, false, |ctx| {
            ctx.get_image_data(0, 0, stage.width, stage.height)
        })
    }

    /// Dispatch a block by opcode with loosely typed arguments.
    pub fn call(
        &mut self,
        util: &mut BlockUtil<'_>,
        opcode: &str,
        args: &Map<String, Value>,
    ) -> ReCanvasResult<Option<BlockValue>> {
        let a = BlockArgs(args);
        let n = |k: &str| a.number(k);
        let s = |k: &str| a.string(k);
        match opcode {
            "openAboutAlert" => return Ok(Some(BlockValue::Text(self.open_about_alert()))),
            "enableCanvas" => self.enable_canvas(util)?,
            "disableCanvas" => self.disable_canvas(util),
            "setCanvasSize" => self.set_canvas_size(
                util,
                n("width"),
                n("scaleWidth"),
                n("height"),
                n("scaleHeight"),
            ),
            "fillRect" => self.fill_rect(util, n("x"), n("y"), n("width"), n("height")),
            "strokeRect" => self.stroke_rect(util, n("x"), n("y"), n("width"), n("height")),
            "clearRect" => self.clear_rect(util, n("x"), n("y"), n("width"), n("height")),
            "fillText" => self.fill_text(util, &s("text"), n("x"), n("y")),
            "strokeText" => self.stroke_text(util, &s("text"), n("x"), n("y")),
            "measureText" => {
                return Ok(self.measure_text(util, &s("text")).map(BlockValue::Number));
            }
            "loadImageAs" => self.load_image_as(util, &s("name"), &s("url")),
            "loadImageAsWait" => self.load_image_as_wait(util, &s("name"), &s("url")),
            "drawImage" => self.draw_image(util, &s("name"), n("x"), n("y")),
            "fill" => self.fill(util),
            "stroke" => self.stroke(util),
            "clip" => self.clip(util),
            "beginPath" => self.begin_path(util),
            "closePath" => self.close_path(util),
            "moveTo" => self.move_to(util, n("x"), n("y")),
            "lineTo" => self.line_to(util, n("x"), n("y")),
            "rect" => self.rect(util, n("x"), n("y"), n("width"), n("height")),
            "roundRect" => self.round_rect(
                util,
                n("x"),
                n("y"),
                n("width"),
                n("height"),
                n("radius"),
            ),
            "arc" => self.arc(
                util,
                n("x"),
                n("y"),
                n("r"),
                n("sAngle"),
                n("eAngle"),
                a.boolean("anticlockwise"),
            ),
            "arcTo" => self.arc_to(util, n("x1"), n("y1"), n("x2"), n("y2"), n("r")),
            "ellipse" => self.ellipse(
                util,
                n("x"),
                n("y"),
                n("radiusX"),
                n("radiusY"),
                n("rotation"),
                n("sAngle"),
                n("eAngle"),
                a.boolean("anticlockwise"),
            ),
            "bezierCurveTo" => self.bezier_curve_to(
                util,
                n("cp1x"),
                n("cp1y"),
                n("cp2x"),
                n("cp2y"),
                n("x"),
                n("y"),
            ),
            "scale" => self.scale(util, n("width"), n("height")),
            "rotate" => self.rotate(util, n("angle")),
            "translate" => self.translate(util, n("x"), n("y")),
            "transform" => self.transform(util, n("a"), n("b"), n("c"), n("d"), n("e"), n("f")),
            "resetTransform" => self.reset_transform(util),
            "fillStyle" => self.fill_style(util, &s("color")),
            "strokeStyle" => self.stroke_style(util, &s("color")),
            "lineWidth" => self.line_width(util, n("width")),
            "lineCap" => self.line_cap(util, &s("style")),
            "lineJoin" => self.line_join(util, &s("style")),
            "setLineDash" => self.set_line_dash(util, &s("array"))?,
            "font" => self.font(util, &s("style")),
            "globalAlpha" => self.global_alpha(util, n("alpha")),
            "globalCompositeOperation" => self.global_composite_operation(util, &s("attribute")),
            "save" => self.save(util),
            "restore" => self.restore(util),
            "getDescrepency" => {
                let ratio = self.get_descrepency(util.renderer, &s("dimension"));
                return Ok(Some(BlockValue::Number(ratio)));
            }
            "setCanvasImageSmoothing" => {
                self.set_canvas_image_smoothing(util, a.boolean("options"));
            }
            "imageSmoothingEnabled" => self.image_smoothing_enabled(util, a.boolean("options")),
            "getImageData" => return Ok(self.get_image_data(util).map(BlockValue::ImageData)),
            other => {
                return Err(ReCanvasError::argument(format!("unknown opcode: {other}")));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for ReCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReCanvas")
            .field("opts", &self.opts)
            .field("states", &self.states.borrow().len())
            .field("text", &self.text)
            .field("reinstall_at", &self.reinstall_at)
            .finish_non_exhaustive()
    }
}
