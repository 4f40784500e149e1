use crate::canvas::style::CompositeMode;
use crate::foundation::error::{ReCanvasError, ReCanvasResult};
use crate::foundation::math::mul_div255_u8;

pub type PremulRgba8 = [u8; 4];

/// Integer source-over for premultiplied pixels.
pub fn over(dst: PremulRgba8, src: PremulRgba8, opacity: f32) -> PremulRgba8 {
    let opacity = opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 || src[3] == 0 {
        return dst;
    }

    let op = ((opacity * 255.0).round() as i32).clamp(0, 255) as u16;
    let sa = mul_div255_u8(u16::from(src[3]), op);
    if sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);

    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255_u8(u16::from(dst[3]), inv));

    for i in 0..3 {
        let sc = mul_div255_u8(u16::from(src[i]), op);
        let dc = mul_div255_u8(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Composite one premultiplied pixel with a canvas composite mode.
///
/// `alpha` is the global alpha applied to the source.
pub fn composite(dst: PremulRgba8, src: PremulRgba8, mode: CompositeMode, alpha: f32) -> PremulRgba8 {
    if mode == CompositeMode::SourceOver {
        return over(dst, src, alpha);
    }

    let alpha = alpha.clamp(0.0, 1.0);
    let s = to_unit(src, alpha);
    let d = to_unit(dst, 1.0);
    let (sa, da) = (s[3], d[3]);

    let out = match porter_duff_factors(mode, sa, da) {
        Some((fa, fb)) => {
            let mut o = [0.0f32; 4];
            for i in 0..4 {
                o[i] = s[i] * fa + d[i] * fb;
            }
            o
        }
        None => blend_source_over(s, d, mode),
    };
    from_unit(out)
}

fn porter_duff_factors(mode: CompositeMode, sa: f32, da: f32) -> Option<(f32, f32)> {
    use CompositeMode as M;
    Some(match mode {
        M::SourceOver => (1.0, 1.0 - sa),
        M::SourceIn => (da, 0.0),
        M::SourceOut => (1.0 - da, 0.0),
        M::SourceAtop => (da, 1.0 - sa),
        M::DestinationOver => (1.0 - da, 1.0),
        M::DestinationIn => (0.0, sa),
        M::DestinationOut => (0.0, 1.0 - sa),
        M::DestinationAtop => (1.0 - da, sa),
        M::Lighter => (1.0, 1.0),
        M::Copy => (1.0, 0.0),
        M::Xor => (1.0 - da, 1.0 - sa),
        _ => return None,
    })
}

/// Source-over compositing with a blend function applied where both layers overlap.
fn blend_source_over(s: [f32; 4], d: [f32; 4], mode: CompositeMode) -> [f32; 4] {
    let (sa, da) = (s[3], d[3]);
    let cs = unpremul(s);
    let cb = unpremul(d);
    let b = blend(cb, cs, mode);

    let mut out = [0.0f32; 4];
    for i in 0..3 {
        // Premultiplied form of: as*((1-ab)*Cs + ab*B) + (1-as)*ab*Cb
        out[i] = sa * (1.0 - da) * cs[i] + sa * da * b[i] + (1.0 - sa) * d[i];
    }
    out[3] = sa + da * (1.0 - sa);
    out
}

fn blend(cb: [f32; 3], cs: [f32; 3], mode: CompositeMode) -> [f32; 3] {
    use CompositeMode as M;
    let sep = |f: fn(f32, f32) -> f32| [f(cb[0], cs[0]), f(cb[1], cs[1]), f(cb[2], cs[2])];
    match mode {
        M::Multiply => sep(|b, s| b * s),
        M::Screen => sep(screen),
        M::Overlay => sep(|b, s| hard_light(s, b)),
        M::Darken => sep(f32::min),
        M::Lighten => sep(f32::max),
        M::ColorDodge => sep(|b, s| {
            if b <= 0.0 {
                0.0
            } else if s >= 1.0 {
                1.0
            } else {
                (b / (1.0 - s)).min(1.0)
            }
        }),
        M::ColorBurn => sep(|b, s| {
            if b >= 1.0 {
                1.0
            } else if s <= 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - b) / s).min(1.0)
            }
        }),
        M::HardLight => sep(hard_light),
        M::SoftLight => sep(soft_light),
        M::Difference => sep(|b, s| (b - s).abs()),
        M::Exclusion => sep(|b, s| b + s - 2.0 * b * s),
        M::Hue => set_lum(set_sat(cs, sat(cb)), lum(cb)),
        M::Saturation => set_lum(set_sat(cb, sat(cs)), lum(cb)),
        M::Color => set_lum(cs, lum(cb)),
        M::Luminosity => set_lum(cb, lum(cs)),
        _ => cs,
    }
}

fn screen(b: f32, s: f32) -> f32 {
    b + s - b * s
}

fn hard_light(b: f32, s: f32) -> f32 {
    if s <= 0.5 {
        b * 2.0 * s
    } else {
        screen(b, 2.0 * s - 1.0)
    }
}

fn soft_light(b: f32, s: f32) -> f32 {
    if s <= 0.5 {
        b - (1.0 - 2.0 * s) * b * (1.0 - b)
    } else {
        let d = if b <= 0.25 {
            ((16.0 * b - 12.0) * b + 4.0) * b
        } else {
            b.sqrt()
        };
        b + (2.0 * s - 1.0) * (d - b)
    }
}

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 {
        for v in &mut out {
            *v = l + (*v - l) * l / (l - n);
        }
    }
    if x > 1.0 {
        for v in &mut out {
            *v = l + (*v - l) * (1.0 - l) / (x - l);
        }
    }
    out
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color([c[0] + d, c[1] + d, c[2] + d])
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    let max = c[0].max(c[1]).max(c[2]);
    let min = c[0].min(c[1]).min(c[2]);
    if max <= min {
        return [0.0; 3];
    }
    let mut out = [0.0f32; 3];
    for i in 0..3 {
        out[i] = if c[i] == max {
            s
        } else if c[i] == min {
            0.0
        } else {
            (c[i] - min) * s / (max - min)
        };
    }
    out
}

fn to_unit(px: PremulRgba8, alpha: f32) -> [f32; 4] {
    [
        f32::from(px[0]) / 255.0 * alpha,
        f32::from(px[1]) / 255.0 * alpha,
        f32::from(px[2]) / 255.0 * alpha,
        f32::from(px[3]) / 255.0 * alpha,
    ]
}

fn unpremul(px: [f32; 4]) -> [f32; 3] {
    if px[3] <= 0.0 {
        return [0.0; 3];
    }
    [
        (px[0] / px[3]).min(1.0),
        (px[1] / px[3]).min(1.0),
        (px[2] / px[3]).min(1.0),
    ]
}

fn from_unit(px: [f32; 4]) -> PremulRgba8 {
    let a = px[3].clamp(0.0, 1.0);
    let q = |v: f32| (v.clamp(0.0, a) * 255.0).round() as u8;
    [q(px[0]), q(px[1]), q(px[2]), (a * 255.0).round() as u8]
}

fn lerp_px(from: PremulRgba8, to: PremulRgba8, t: u8) -> PremulRgba8 {
    if t == 255 {
        return to;
    }
    if t == 0 {
        return from;
    }
    let t = u16::from(t);
    let it = 255 - t;
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = mul_div255_u8(u16::from(from[i]), it)
            .saturating_add(mul_div255_u8(u16::from(to[i]), t));
    }
    out
}

fn check_lengths(dst: &[u8], src: &[u8], clip: Option<&[u8]>) -> ReCanvasResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(ReCanvasError::validation(
            "composite expects equal-length rgba8 buffers",
        ));
    }
    if let Some(clip) = clip
        && clip.len() * 4 != dst.len()
    {
        return Err(ReCanvasError::validation(
            "clip mask must have one coverage byte per pixel",
        ));
    }
    Ok(())
}

/// Composite a full-surface source layer onto `dst`.
///
/// Pixels outside `clip` (coverage 0) keep their destination value; partial coverage blends
/// between the untouched and the composited result.
pub fn composite_in_place(
    dst: &mut [u8],
    src: &[u8],
    mode: CompositeMode,
    alpha: f32,
    clip: Option<&[u8]>,
) -> ReCanvasResult<()> {
    check_lengths(dst, src, clip)?;
    // Only these modes alter the destination where the source is fully transparent.
    let skip_empty = !matches!(
        mode,
        CompositeMode::SourceIn
            | CompositeMode::SourceOut
            | CompositeMode::DestinationIn
            | CompositeMode::DestinationAtop
            | CompositeMode::Copy
    );

    for (i, (d, s)) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)).enumerate() {
        if skip_empty && s[3] == 0 {
            continue;
        }
        let cov = clip.map_or(255, |c| c[i]);
        if cov == 0 {
            continue;
        }
        let before = [d[0], d[1], d[2], d[3]];
        let after = composite(before, [s[0], s[1], s[2], s[3]], mode, alpha);
        d.copy_from_slice(&lerp_px(before, after, cov));
    }
    Ok(())
}

/// Erase `dst` by the per-pixel coverage in `coverage` (alpha channel of a premultiplied layer).
pub fn clear_in_place(dst: &mut [u8], coverage: &[u8], clip: Option<&[u8]>) -> ReCanvasResult<()> {
    check_lengths(dst, coverage, clip)?;
    for (i, (d, c)) in dst
        .chunks_exact_mut(4)
        .zip(coverage.chunks_exact(4))
        .enumerate()
    {
        let cov = mul_div255_u8(u16::from(c[3]), u16::from(clip.map_or(255, |m| m[i])));
        if cov == 0 {
            continue;
        }
        let keep = 255 - u16::from(cov);
        for v in d.iter_mut() {
            *v = mul_div255_u8(u16::from(*v), keep);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn over_opacity_0_is_noop() {
        let dst = [1, 2, 3, 4];
        let src = [200, 200, 200, 200];
        assert_eq!(over(dst, src, 0.0), dst);
    }

    #[test]
    fn over_src_opaque_replaces_dst() {
        let dst = [0, 0, 0, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(over(dst, src, 1.0), src);
    }

    #[test]
    fn copy_and_source_in_replace_or_clear() {
        let dst = [0, 0, 255, 255];
        let src = [255, 0, 0, 255];
        assert_eq!(composite(dst, src, CompositeMode::Copy, 1.0), src);
        assert_eq!(
            composite(dst, [0, 0, 0, 0], CompositeMode::SourceIn, 1.0),
            [0, 0, 0, 0]
        );
        assert_eq!(
            composite([0, 0, 0, 0], src, CompositeMode::SourceIn, 1.0),
            [0, 0, 0, 0]
        );
    }

    #[test]
    fn destination_out_punches_holes() {
        let dst = [0, 255, 0, 255];
        let src = [9, 9, 9, 255];
        assert_eq!(
            composite(dst, src, CompositeMode::DestinationOut, 1.0),
            [0, 0, 0, 0]
        );
    }

    #[test]
    fn multiply_on_opaque_white_is_source() {
        let white = [255, 255, 255, 255];
        let src = [51, 102, 153, 255];
        assert_eq!(composite(white, src, CompositeMode::Multiply, 1.0), src);
    }

    #[test]
    fn difference_of_equal_colors_is_black() {
        let c = [120, 60, 30, 255];
        assert_eq!(
            composite(c, c, CompositeMode::Difference, 1.0),
            [0, 0, 0, 255]
        );
    }

    #[test]
    fn luminosity_keeps_gray_source_on_gray() {
        let gray = [128, 128, 128, 255];
        assert_eq!(composite(gray, gray, CompositeMode::Luminosity, 1.0), gray);
    }

    #[test]
    fn copy_clears_outside_shape_but_respects_clip() {
        let mut dst = vec![10, 10, 10, 255, 20, 20, 20, 255];
        let src = vec![0, 0, 0, 0, 0, 0, 0, 0];
        let clip = [255u8, 0];
        composite_in_place(&mut dst, &src, CompositeMode::Copy, 1.0, Some(&clip)).unwrap();
        assert_eq!(dst, vec![0, 0, 0, 0, 20, 20, 20, 255]);
    }

    #[test]
    fn clear_in_place_uses_coverage_alpha() {
        let mut dst = vec![255, 255, 255, 255, 255, 255, 255, 255];
        let cov = vec![0, 0, 0, 255, 0, 0, 0, 0];
        clear_in_place(&mut dst, &cov, None).unwrap();
        assert_eq!(dst, vec![0, 0, 0, 0, 255, 255, 255, 255]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut dst = vec![0u8; 8];
        assert!(composite_in_place(&mut dst, &[0u8; 4], CompositeMode::Copy, 1.0, None).is_err());
        assert!(
            composite_in_place(&mut dst, &[0u8; 8], CompositeMode::Copy, 1.0, Some(&[0u8; 1]))
                .is_err()
        );
    }
}
