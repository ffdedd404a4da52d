//! Gray/HSV descriptor histograms and the OpenCV-style correlation used by
//! the correlator (§4.8 step 2/4).

use super::track::{GRAY_BINS, HUE_BINS, SAT_BINS};

/// A single-channel (luminance) image view.
pub struct GrayView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

/// An HSV image view, 3 interleaved channels per pixel.
pub struct HsvView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

fn clamp_rect(rect: (i32, i32, i32, i32), width: u32, height: u32) -> (u32, u32, u32, u32) {
    let (x, y, w, h) = rect;
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = ((x + w).max(0) as u32).min(width);
    let y1 = ((y + h).max(0) as u32).min(height);
    (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
}

/// 256-bin histogram of the gray channel within `rect`. Not normalized —
/// only the HSV histogram is normalized, per §4.8 step 2.
pub fn gray_histogram(frame: &GrayView, rect: (i32, i32, i32, i32)) -> Vec<f32> {
    let mut hist = vec![0f32; GRAY_BINS];
    let (x0, y0, w, h) = clamp_rect(rect, frame.width, frame.height);

    for y in y0..y0 + h {
        let row = (y as usize) * (frame.width as usize);
        for x in x0..x0 + w {
            let v = frame.data[row + x as usize] as usize;
            hist[v] += 1.0;
        }
    }
    hist
}

/// 180x256 joint histogram of hue and saturation within `rect`, flattened
/// row-major (hue-major), then min-max normalized to `[0, 1]`.
pub fn hsv_histogram(frame: &HsvView, rect: (i32, i32, i32, i32)) -> Vec<f32> {
    let mut hist = vec![0f32; HUE_BINS * SAT_BINS];
    let (x0, y0, w, h) = clamp_rect(rect, frame.width, frame.height);

    for y in y0..y0 + h {
        let row = (y as usize) * (frame.width as usize) * 3;
        for x in x0..x0 + w {
            let idx = row + (x as usize) * 3;
            let hue = (frame.data[idx] as usize).min(HUE_BINS - 1);
            let sat = frame.data[idx + 1] as usize;
            hist[hue * SAT_BINS + sat] += 1.0;
        }
    }

    normalize_min_max(&mut hist);
    hist
}

fn normalize_min_max(hist: &mut [f32]) {
    let min = hist.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = hist.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range <= f32::EPSILON {
        return;
    }
    for v in hist.iter_mut() {
        *v = (*v - min) / range;
    }
}

/// OpenCV `HISTCMP_CORREL`-style centered cross-correlation: in `[-1, 1]`
/// for any pair of equal-length histograms, 0 when either is constant.
pub fn correlate(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len() as f32;
    let mean_a = a.iter().sum::<f32>() / n;
    let mean_b = b.iter().sum::<f32>() / n;

    let mut num = 0f32;
    let mut den_a = 0f32;
    let mut den_b = 0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        let da = x - mean_a;
        let db = y - mean_b;
        num += da * db;
        den_a += da * da;
        den_b += db * db;
    }

    let denom = (den_a * den_b).sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        num / denom
    }
}
