use serde::Deserialize;

use crate::host::renderer::FrameRGBA;

/// Horizontal sine displacement.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct WaveParams {
    /// Peak offset in pixels, `0..=100`.
    pub strength: f64,
    /// Radians per row.
    pub frequency: f64,
    /// Radians per frame.
    pub speed: f64,
}

impl Default for WaveParams {
    fn default() -> Self {
        Self {
            strength: 10.0,
            frequency: 0.05,
            speed: 0.1,
        }
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

impl WaveParams {
    pub fn new(strength: f64, frequency: f64, speed: f64) -> Self {
        Self {
            strength,
            frequency,
            speed,
        }
    }

    /// Strength within `0..=100`; non-finite values become 0.
    pub fn clamped(self) -> Self {
        Self {
            strength: finite_or_zero(self.strength).clamp(0.0, 100.0),
            frequency: finite_or_zero(self.frequency),
            speed: finite_or_zero(self.speed),
        }
    }

    pub fn row_offset(&self, y: u32, frame: u64) -> i64 {
        (self.strength * (f64::from(y) * self.frequency + frame as f64 * self.speed).sin()).round()
            as i64
    }
}

/// Random block displacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GlitchParams {
    pub block_width: u32,
    pub block_height: u32,
    pub max_shift: u32,
}

impl Default for GlitchParams {
    fn default() -> Self {
        Self {
            block_width: 32,
            block_height: 8,
            max_shift: 20,
        }
    }
}

pub const MAX_GLITCH_BLOCKS: u32 = 64;

/// Shift every row by its wave offset. RGB is sampled from the clamped source column of the
/// original row; alpha stays in place.
pub fn apply_wave(frame: &mut FrameRGBA, params: &WaveParams, frame_no: u64) {
    let params = params.clamped();
    let w = frame.width as usize;
    if w == 0 {
        return;
    }
    let mut row = vec![0u8; w * 4];
    for y in 0..frame.height {
        let offset = params.row_offset(y, frame_no);
        if offset == 0 {
            continue;
        }
        let start = (y as usize) * w * 4;
        let dst = &mut frame.data[start..start + w * 4];
        row.copy_from_slice(dst);
        for x in 0..w {
            let sx = (x as i64 - offset).clamp(0, w as i64 - 1) as usize;
            dst[x * 4..x * 4 + 3].copy_from_slice(&row[sx * 4..sx * 4 + 3]);
        }
    }
}

/// Shift red by `+strength` and blue by `-strength` columns (red read from `x - s`, blue from
/// `x + s`). Reads that fall outside the row leave that channel unchanged.
pub fn channel_split(frame: &mut FrameRGBA, strength: i64) {
    let w = i64::from(frame.width);
    let s = strength.clamp(-w, w);
    if s == 0 || w == 0 {
        return;
    }
    let src = frame.data.clone();
    for y in 0..i64::from(frame.height) {
        for x in 0..w {
            let i = ((y * w + x) * 4) as usize;
            let rx = x - s;
            if (0..w).contains(&rx) {
                frame.data[i] = src[((y * w + rx) * 4) as usize];
            }
            let bx = x + s;
            if (0..w).contains(&bx) {
                frame.data[i + 2] = src[((y * w + bx) * 4 + 2) as usize];
            }
        }
    }
}

/// Copy `count` random blocks to random nearby offsets, clipped to the frame.
pub fn glitch(frame: &mut FrameRGBA, count: u32, params: &GlitchParams, rng: &mut fastrand::Rng) {
    let count = count.min(MAX_GLITCH_BLOCKS);
    let (w, h) = (frame.width, frame.height);
    if count == 0 || w == 0 || h == 0 {
        return;
    }
    let max_bw = params.block_width.clamp(1, w);
    let max_bh = params.block_height.clamp(1, h);
    let shift = i64::from(params.max_shift);
    let stride = w as usize * 4;

    let mut block = Vec::new();
    for _ in 0..count {
        let bw = rng.u32(1..=max_bw);
        let bh = rng.u32(1..=max_bh);
        let sx = rng.u32(0..=w - bw);
        let sy = rng.u32(0..=h - bh);
        let dx = i64::from(sx) + rng.i64(-shift..=shift);
        let dy = i64::from(sy) + rng.i64(-shift..=shift);

        block.clear();
        for row in sy..sy + bh {
            let start = row as usize * stride + sx as usize * 4;
            block.extend_from_slice(&frame.data[start..start + bw as usize * 4]);
        }

        for by in 0..i64::from(bh) {
            let ty = dy + by;
            if !(0..i64::from(h)).contains(&ty) {
                continue;
            }
            for bx in 0..i64::from(bw) {
                let tx = dx + bx;
                if !(0..i64::from(w)).contains(&tx) {
                    continue;
                }
                let s = ((by * i64::from(bw) + bx) * 4) as usize;
                let d = ty as usize * stride + tx as usize * 4;
                frame.data[d..d + 4].copy_from_slice(&block[s..s + 4]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> FrameRGBA {
        let mut f = FrameRGBA::transparent(w, h);
        for (i, px) in f.data.chunks_exact_mut(4).enumerate() {
            let x = (i as u32 % w) as u8;
            px.copy_from_slice(&[x.wrapping_mul(10), 100, 200u8.wrapping_sub(x.wrapping_mul(10)), 255 - x]);
        }
        f
    }

    #[test]
    fn zero_strength_wave_is_identity() {
        let mut f = gradient(8, 4);
        let before = f.clone();
        apply_wave(&mut f, &WaveParams::new(0.0, 1.0, 1.0), 3);
        assert_eq!(f, before);
    }

    #[test]
    fn wave_shifts_rgb_but_not_alpha() {
        let mut f = gradient(8, 1);
        let before = f.clone();
        // Row 0 at frame 0 with frequency 0: offset = round(2 * sin(0)) = 0, so move the phase.
        let params = WaveParams::new(2.0, 0.0, std::f64::consts::FRAC_PI_2);
        assert_eq!(params.row_offset(0, 1), 2);
        apply_wave(&mut f, &params, 1);
        assert_eq!(f.pixel(5, 0).unwrap()[0], before.pixel(3, 0).unwrap()[0]);
        assert_eq!(f.pixel(5, 0).unwrap()[3], before.pixel(5, 0).unwrap()[3]);
        // Columns left of the offset clamp to column 0.
        assert_eq!(f.pixel(0, 0).unwrap()[0], before.pixel(0, 0).unwrap()[0]);
        assert_eq!(f.pixel(1, 0).unwrap()[0], before.pixel(0, 0).unwrap()[0]);
    }

    #[test]
    fn wave_strength_is_clamped() {
        let p = WaveParams::new(500.0, 0.0, 0.0).clamped();
        assert_eq!(p.strength, 100.0);
        let p = WaveParams::new(f64::NAN, 0.0, 0.0).clamped();
        assert_eq!(p.strength, 0.0);
    }

    #[test]
    fn split_moves_red_and_blue_in_opposite_directions() {
        let mut f = gradient(8, 1);
        let before = f.clone();
        channel_split(&mut f, 2);
        assert_eq!(f.pixel(4, 0).unwrap()[0], before.pixel(2, 0).unwrap()[0]);
        assert_eq!(f.pixel(4, 0).unwrap()[2], before.pixel(6, 0).unwrap()[2]);
        assert_eq!(f.pixel(4, 0).unwrap()[1], before.pixel(4, 0).unwrap()[1]);
        // Out-of-range reads are skipped.
        assert_eq!(f.pixel(0, 0).unwrap()[0], before.pixel(0, 0).unwrap()[0]);
        assert_eq!(f.pixel(7, 0).unwrap()[2], before.pixel(7, 0).unwrap()[2]);
    }

    #[test]
    fn split_then_inverse_differs_only_at_edges() {
        let mut f = gradient(8, 2);
        let before = f.clone();
        channel_split(&mut f, 2);
        channel_split(&mut f, -2);
        assert_ne!(f, before);
        for x in 2..6 {
            assert_eq!(f.pixel(x, 1), before.pixel(x, 1));
        }
    }

    #[test]
    fn huge_split_is_clamped_to_a_noop_shift() {
        let mut f = gradient(4, 1);
        let before = f.clone();
        channel_split(&mut f, i64::MAX);
        assert_eq!(f, before);
    }

    #[test]
    fn glitch_zero_is_identity_and_same_seed_is_deterministic() {
        let mut f = gradient(40, 20);
        let before = f.clone();
        glitch(&mut f, 0, &GlitchParams::default(), &mut fastrand::Rng::with_seed(1));
        assert_eq!(f, before);

        let mut a = gradient(40, 20);
        let mut b = gradient(40, 20);
        glitch(&mut a, 10, &GlitchParams::default(), &mut fastrand::Rng::with_seed(7));
        glitch(&mut b, 10, &GlitchParams::default(), &mut fastrand::Rng::with_seed(7));
        assert_eq!(a, b);
        assert_eq!(a.data.len(), before.data.len());
    }

    #[test]
    fn glitch_handles_frames_smaller_than_a_block() {
        let mut f = gradient(3, 2);
        glitch(&mut f, 64, &GlitchParams::default(), &mut fastrand::Rng::with_seed(3));
        assert_eq!(f.data.len(), 3 * 2 * 4);
    }
}
