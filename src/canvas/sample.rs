/// Sample a premultiplied RGBA8 image at continuous coordinates (pixel centers at `+0.5`).
///
/// Returns `None` outside the image. `smooth` selects bilinear filtering with edge clamping,
/// otherwise nearest neighbor.
pub(crate) fn sample_premul(
    data: &[u8],
    width: u32,
    height: u32,
    x: f64,
    y: f64,
    smooth: bool,
) -> Option<[u8; 4]> {
    if width == 0 || height == 0 || x < 0.0 || y < 0.0 {
        return None;
    }
    let (w, h) = (f64::from(width), f64::from(height));
    if x >= w || y >= h {
        return None;
    }

    let at = |ix: u32, iy: u32| -> [u8; 4] {
        let i = ((iy as usize) * (width as usize) + (ix as usize)) * 4;
        [data[i], data[i + 1], data[i + 2], data[i + 3]]
    };

    if !smooth {
        return Some(at(x as u32, y as u32));
    }

    let fx = (x - 0.5).clamp(0.0, w - 1.0);
    let fy = (y - 0.5).clamp(0.0, h - 1.0);
    let x0 = fx.floor() as u32;
    let y0 = fy.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let tx = fx - f64::from(x0);
    let ty = fy - f64::from(y0);

    let (p00, p10, p01, p11) = (at(x0, y0), at(x1, y0), at(x0, y1), at(x1, y1));
    let mut out = [0u8; 4];
    for i in 0..4 {
        let top = f64::from(p00[i]) * (1.0 - tx) + f64::from(p10[i]) * tx;
        let bottom = f64::from(p01[i]) * (1.0 - tx) + f64::from(p11[i]) * tx;
        out[i] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    Some(out)
}
