use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use recanvas::{
    BlockUtil, ImageFetcher, PixelSurface, REDRAW_HOOK_KEY, ReCanvas, ReCanvasOpts,
    ReCanvasResult, Stage, StageOpts, recanvas_info,
};
use serde_json::{Map, Value, json};

fn args(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

fn png(rgba: [u8; 4], w: u32, h: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_raw(w, h, rgba.repeat((w * h) as usize)).unwrap();
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

struct CountingFetcher {
    calls: AtomicUsize,
    body: Vec<u8>,
    delay: Duration,
}

impl CountingFetcher {
    fn new(body: Vec<u8>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            body,
            delay: Duration::ZERO,
        }
    }
}

impl ImageFetcher for CountingFetcher {
    fn fetch(&self, _url: &str) -> ReCanvasResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(self.body.clone())
    }
}

#[test]
fn every_block_is_a_noop_without_state() {
    let mut stage = Stage::new(StageOpts::default());
    let sprite = stage.add_sprite();
    let mut ext = ReCanvas::default();
    let info = recanvas_info();

    for opcode in info.opcodes() {
        if opcode == "enableCanvas" {
            continue;
        }
        let mut util = BlockUtil::new(sprite, &mut stage);
        let out = ext.call(&mut util, opcode, &Map::new()).unwrap();
        match opcode {
            "getDescrepency" | "openAboutAlert" => assert!(out.is_some()),
            _ => assert!(out.is_none(), "{opcode} reported a value"),
        }
    }
    assert_eq!(ext.state_count(), 0);
    assert_eq!(stage.live_textures(), 0);
    assert!(!stage.redraw_requested());
}

#[test]
fn fill_rect_marks_dirty_and_next_frame_uploads() {
    let mut stage = Stage::new(StageOpts::default());
    let sprite = stage.add_sprite();
    let mut ext = ReCanvas::default();
    ext.install(stage.hooks_mut());

    ext.call(&mut BlockUtil::new(sprite, &mut stage), "enableCanvas", &Map::new())
        .unwrap();
    let tex = stage.sprite_skin(sprite).unwrap();
    let uploads = stage.upload_count(tex);

    ext.call(
        &mut BlockUtil::new(sprite, &mut stage),
        "fillRect",
        &args(json!({"x": 0, "y": 0, "width": 10, "height": 10})),
    )
    .unwrap();
    assert_eq!(ext.is_dirty(sprite), Some(true));
    assert!(stage.redraw_requested());

    stage.draw();
    assert_eq!(ext.is_dirty(sprite), Some(false));
    assert_eq!(stage.upload_count(tex), uploads + 1);
    let texture = stage.texture(tex).unwrap();
    assert_eq!(&texture.data[0..4], &[0, 0, 0, 255]);

    // Clean surfaces are not uploaded again.
    stage.draw();
    assert_eq!(stage.upload_count(tex), uploads + 1);

    // The skin covers the stage 1:1, so the rect shows up in the top-left corner.
    let frame = stage.read_pixels();
    assert_eq!(frame.pixel(5, 5), Some([0, 0, 0, 255]));
    assert_eq!(frame.pixel(20, 20), Some([255, 255, 255, 255]));
}

#[test]
fn hex_arguments_are_cast_to_numbers() {
    let mut stage = Stage::new(StageOpts::default());
    let sprite = stage.add_sprite();
    let mut ext = ReCanvas::default();
    let mut util = BlockUtil::new(sprite, &mut stage);
    ext.enable_canvas(&mut util).unwrap();
    ext.call(
        &mut util,
        "fillRect",
        &args(json!({"x": "0", "y": "0", "width": "0x10", "height": "0b100"})),
    )
    .unwrap();
    let data = ext.get_image_data(&mut util).unwrap();
    assert_eq!(data.pixel(15, 3), Some([0, 0, 0, 255]));
    assert_eq!(data.pixel(16, 3), Some([0, 0, 0, 0]));
    assert_eq!(data.pixel(15, 4), Some([0, 0, 0, 0]));
}

#[test]
fn loading_the_same_name_twice_fetches_once() {
    let fetcher = Arc::new(CountingFetcher::new(png([255, 0, 0, 255], 4, 4)));
    let mut stage = Stage::new(StageOpts::default());
    let sprite = stage.add_sprite();
    let mut ext = ReCanvas::with_fetcher(ReCanvasOpts::default(), fetcher.clone());
    let mut util = BlockUtil::new(sprite, &mut stage);
    ext.enable_canvas(&mut util).unwrap();

    ext.load_image_as(&mut util, "dot", "https://example.test/a.png");
    ext.load_image_as(&mut util, "dot", "https://example.test/a.png");
    ext.wait_for_images(sprite);
    ext.load_image_as_wait(&mut util, "dot", "https://example.test/b.png");
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

    ext.draw_image(&mut util, "dot", 2.0, 2.0);
    let data = ext.get_image_data(&mut util).unwrap();
    assert_eq!(data.pixel(3, 3), Some([255, 0, 0, 255]));
    assert_eq!(data.pixel(7, 7), Some([0, 0, 0, 0]));
}

#[test]
fn waiting_load_after_background_load_draws_the_image() {
    let fetcher = Arc::new(CountingFetcher {
        delay: Duration::from_millis(300),
        ..CountingFetcher::new(png([255, 0, 0, 255], 4, 4))
    });
    let mut stage = Stage::new(StageOpts::default());
    let sprite = stage.add_sprite();
    let mut ext = ReCanvas::with_fetcher(ReCanvasOpts::default(), fetcher.clone());
    let mut util = BlockUtil::new(sprite, &mut stage);
    ext.enable_canvas(&mut util).unwrap();

    ext.load_image_as(&mut util, "dot", "https://example.test/a.png");
    ext.load_image_as_wait(&mut util, "dot", "https://example.test/a.png");
    ext.draw_image(&mut util, "dot", 0.0, 0.0);
    let data = ext.get_image_data(&mut util).unwrap();
    assert_eq!(data.pixel(1, 1), Some([255, 0, 0, 255]));
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn image_names_with_nul_bytes_do_not_panic() {
    let fetcher = Arc::new(CountingFetcher::new(png([0, 0, 255, 255], 2, 2)));
    let mut stage = Stage::new(StageOpts::default());
    let sprite = stage.add_sprite();
    let mut ext = ReCanvas::with_fetcher(ReCanvasOpts::default(), fetcher);
    let mut util = BlockUtil::new(sprite, &mut stage);
    ext.enable_canvas(&mut util).unwrap();

    ext.call(
        &mut util,
        "loadImageAs",
        &args(json!({"name": "a\0b", "url": "https://example.test/b.png"})),
    )
    .unwrap();
    ext.wait_for_images(sprite);
    ext.draw_image(&mut util, "a\0b", 0.0, 0.0);
    let data = ext.get_image_data(&mut util).unwrap();
    assert_eq!(data.pixel(0, 0), Some([0, 0, 255, 255]));
}

#[test]
fn local_files_need_an_explicit_policy() {
    let dir = std::path::PathBuf::from("target").join("canvas_blocks");
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("green.png");
    std::fs::write(&file, png([0, 255, 0, 255], 2, 2)).unwrap();
    let url = file.to_string_lossy().into_owned();

    let mut stage = Stage::new(StageOpts::default());
    let sprite = stage.add_sprite();

    let mut ext = ReCanvas::default();
    let mut util = BlockUtil::new(sprite, &mut stage);
    ext.enable_canvas(&mut util).unwrap();
    ext.load_image_as_wait(&mut util, "g", &url);
    ext.draw_image(&mut util, "g", 0.0, 0.0);
    let data = ext.get_image_data(&mut util).unwrap();
    assert_eq!(data.pixel(0, 0), Some([0, 0, 0, 0]));

    let mut ext = ReCanvas::new(
        ReCanvasOpts::default().with_fetch_policy(recanvas::FetchPolicy::LocalOnly),
    );
    let other = stage.add_sprite();
    let mut util = BlockUtil::new(other, &mut stage);
    ext.enable_canvas(&mut util).unwrap();
    ext.load_image_as_wait(&mut util, "g", &url);
    ext.draw_image(&mut util, "g", 0.0, 0.0);
    let data = ext.get_image_data(&mut util).unwrap();
    assert_eq!(data.pixel(0, 0), Some([0, 255, 0, 255]));
}

#[test]
fn denied_loads_are_swallowed() {
    let mut stage = Stage::new(StageOpts::default());
    let sprite = stage.add_sprite();
    let mut ext = ReCanvas::new(
        ReCanvasOpts::default().with_fetch_policy(recanvas::FetchPolicy::DenyAll),
    );
    let mut util = BlockUtil::new(sprite, &mut stage);
    ext.enable_canvas(&mut util).unwrap();
    ext.load_image_as_wait(&mut util, "x", "/tmp/whatever.png");
    ext.draw_image(&mut util, "x", 0.0, 0.0);
    let data = ext.get_image_data(&mut util).unwrap();
    assert!(data.data.iter().all(|&b| b == 0));
}

#[test]
fn hook_is_reinstalled_after_another_extension_replaces_the_pipeline() {
    let mut stage = Stage::new(StageOpts::default());
    let sprite = stage.add_sprite();
    let mut ext = ReCanvas::new(ReCanvasOpts::default().with_reinstall_delay_ms(500));
    ext.install(stage.hooks_mut());
    ext.enable_canvas(&mut BlockUtil::new(sprite, &mut stage)).unwrap();

    let t0 = Instant::now();
    stage.replace_draw_pipeline();
    stage.add_extension("pen");
    ext.sync_with_stage(&mut stage, t0);

    ext.fill_rect(&mut BlockUtil::new(sprite, &mut stage), 0.0, 0.0, 4.0, 4.0);
    stage.draw();
    // No observer, so the surface stays dirty.
    assert_eq!(ext.is_dirty(sprite), Some(true));

    ext.sync_with_stage(&mut stage, t0 + Duration::from_millis(600));
    assert!(stage.hooks().is_installed(REDRAW_HOOK_KEY));
    assert_eq!(stage.hooks().len(), 1);
    stage.draw();
    assert_eq!(ext.is_dirty(sprite), Some(false));
}

#[test]
fn hi_dpi_canvas_size_scales_surface() {
    let mut stage = Stage::new(StageOpts::default().with_size(960, 720));
    let sprite = stage.add_sprite();
    let mut ext = ReCanvas::default();
    ext.install(stage.hooks_mut());
    let mut util = BlockUtil::new(sprite, &mut stage);
    ext.enable_canvas(&mut util).unwrap();
    let ratio = ext.get_descrepency(&*util.renderer, "width");
    ext.set_canvas_size(&mut util, 480.0, ratio, 360.0, ratio);
    ext.fill_rect(&mut util, 0.0, 0.0, 240.0, 180.0);
    stage.draw();

    let tex = stage.texture(stage.sprite_skin(sprite).unwrap()).unwrap();
    assert_eq!((tex.width, tex.height), (960, 720));
    assert_eq!(tex.size, [480.0, 360.0]);
    let frame = stage.read_pixels();
    assert_eq!(frame.pixel(470, 350), Some([0, 0, 0, 255]));
    assert_eq!(frame.pixel(490, 370), Some([255, 255, 255, 255]));
}

#[test]
fn removed_sprite_state_is_released() {
    let mut stage = Stage::new(StageOpts::default());
    let keep = stage.add_sprite();
    let gone = stage.add_sprite();
    let mut ext = ReCanvas::default();
    ext.enable_canvas(&mut BlockUtil::new(keep, &mut stage)).unwrap();
    ext.enable_canvas(&mut BlockUtil::new(gone, &mut stage)).unwrap();

    stage.remove_sprite(gone);
    ext.sync_with_stage(&mut stage, Instant::now());
    assert!(ext.has_state(keep));
    assert!(!ext.has_state(gone));
    assert_eq!(stage.live_textures(), 1);

    // Blocks for the removed sprite are no-ops again.
    ext.fill_rect(&mut BlockUtil::new(gone, &mut stage), 0.0, 0.0, 1.0, 1.0);
    assert_eq!(ext.is_dirty(gone), None);
}
