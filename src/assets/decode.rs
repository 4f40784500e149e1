use std::sync::Arc;

use anyhow::Context;

use crate::assets::CachedImage;
use crate::foundation::error::{ReCanvasError, ReCanvasResult};
use crate::foundation::math::premultiply_rgba8_in_place;

const MAX_SVG_DIM: u32 = 16_384;

/// Decode PNG/JPEG/GIF/WebP/BMP bytes, or rasterize SVG markup at its intrinsic size.
pub fn decode_image(bytes: &[u8]) -> ReCanvasResult<CachedImage> {
    if looks_like_svg(bytes) {
        return decode_svg(bytes);
    }
    let dyn_img = image::load_from_memory(bytes).context("decode image from memory")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut rgba8_premul = rgba.into_raw();
    premultiply_rgba8_in_place(&mut rgba8_premul);

    Ok(CachedImage {
        width,
        height,
        rgba8_premul: Arc::new(rgba8_premul),
    })
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}

fn decode_svg(bytes: &[u8]) -> ReCanvasResult<CachedImage> {
    let opts = usvg::Options::default();
    let tree = usvg::Tree::from_data(bytes, &opts).context("parse svg tree")?;

    let size = tree.size();
    let to_px = |v: f32| -> ReCanvasResult<u32> {
        if !v.is_finite() || v <= 0.0 {
            return Err(ReCanvasError::asset("svg has invalid width/height"));
        }
        Ok((v.ceil() as u32).clamp(1, MAX_SVG_DIM))
    };
    let width = to_px(size.width())?;
    let height = to_px(size.height())?;

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or_else(|| ReCanvasError::asset("failed to allocate svg pixmap"))?;
    let xform = resvg::tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, xform, &mut pixmap.as_mut());

    Ok(CachedImage {
        width,
        height,
        rgba8_premul: Arc::new(pixmap.data().to_vec()),
    })
}
