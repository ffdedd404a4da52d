//! Annotator (C7): resize/convert/detect/track/draw, invoked by worker
//! threads as a pure function of one frame envelope (§4.7).

use super::detector::{DetectionPrimitive, DetectorWrapper};
use super::frame::{merge_overlaps, sort_and_truncate, Detection, Frame};
use crate::config::VideoShowProps;
use crate::tracker::correlator::Tracker;
use crate::tracker::histogram::{GrayView, HsvView};

/// The capability the coordinator needs from the per-frame work stage
/// (§9: replaces a `process_func` dynamic-dispatch field with a trait).
pub trait FrameAnnotator: Send {
    fn annotate(&mut self, frame: Frame) -> Frame;
}

const BEST_TRACK_COLOR: (u8, u8, u8) = (0, 255, 0);
const OTHER_TRACK_COLOR: (u8, u8, u8) = (0, 165, 255);

/// The best track's current target, published out-of-band for a pan/tilt
/// tracker to consume (§2: "C10 consumes tracker outputs to command C9
/// out-of-band") — decoupled from the annotated-frame pipeline itself so a
/// slow servo sync never backs up frame delivery.
#[derive(Debug, Clone, Copy)]
pub struct TrackTarget {
    pub center: (i32, i32),
    pub frame_size: (u32, u32),
}

/// Nearest-neighbor resize of an interleaved 3-channel buffer. Adequate for
/// classifier-sized inputs and draw overlays (§4.7).
pub fn resize_nearest(pixels: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> Vec<u8> {
    if src_w == dst_w && src_h == dst_h {
        return pixels.to_vec();
    }
    let mut out = vec![0u8; (dst_w as usize) * (dst_h as usize) * 3];
    for y in 0..dst_h {
        let src_y = ((y as u64) * (src_h as u64) / (dst_h.max(1) as u64)).min((src_h.max(1) - 1) as u64) as u32;
        for x in 0..dst_w {
            let src_x = ((x as u64) * (src_w as u64) / (dst_w.max(1) as u64)).min((src_w.max(1) - 1) as u64) as u32;
            let src_idx = ((src_y as usize) * (src_w as usize) + src_x as usize) * 3;
            let dst_idx = ((y as usize) * (dst_w as usize) + x as usize) * 3;
            out[dst_idx..dst_idx + 3].copy_from_slice(&pixels[src_idx..src_idx + 3]);
        }
    }
    out
}

/// BT.601 luminance: `0.299R + 0.587G + 0.114B`, per pixel, rounded to `u8`.
/// `pixels` is interleaved BGR, matching [`Frame::pixel`].
pub fn bgr_to_gray(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(3)
        .map(|px| {
            let (b, g, r) = (px[0] as f32, px[1] as f32, px[2] as f32);
            (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Standard 6-region hexcone RGB->HSV, producing OpenCV-compatible ranges:
/// H in 0..180, S and V in 0..256.
pub fn bgr_to_hsv(pixels: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; pixels.len()];
    for (src, dst) in pixels.chunks_exact(3).zip(out.chunks_exact_mut(3)) {
        let (b, g, r) = (src[0] as f32 / 255.0, src[1] as f32 / 255.0, src[2] as f32 / 255.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta <= f32::EPSILON {
            0.0
        } else if max == r {
            60.0 * (((g - b) / delta).rem_euclid(6.0))
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };

        let sat = if max <= f32::EPSILON { 0.0 } else { delta / max };
        let val = max;

        dst[0] = (hue / 2.0).round().clamp(0.0, 179.0) as u8;
        dst[1] = (sat * 255.0).round().clamp(0.0, 255.0) as u8;
        dst[2] = (val * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out
}

fn draw_rect_border(frame: &mut Frame, rect: Detection, color: (u8, u8, u8)) {
    let w = frame.meta.width as i32;
    let h = frame.meta.height as i32;
    let (x0, y0, x1, y1) = (rect.x.max(0), rect.y.max(0), (rect.x + rect.w).min(w), (rect.y + rect.h).min(h));
    if x0 >= x1 || y0 >= y1 {
        return;
    }
    for x in x0..x1 {
        frame.set_pixel(x as u32, y0 as u32, color);
        frame.set_pixel(x as u32, (y1 - 1) as u32, color);
    }
    for y in y0..y1 {
        frame.set_pixel(x0 as u32, y as u32, color);
        frame.set_pixel((x1 - 1) as u32, y as u32, color);
    }
}

/// Draws a short filled tick above the rect, as many pixels wide as the
/// track index plus one. There is no text rendering in scope (§4.7); this
/// is the glyph-free stand-in for the track-index label.
fn draw_track_label(frame: &mut Frame, rect: Detection, track_id: usize, color: (u8, u8, u8)) {
    let y = (rect.y - 2).max(0) as u32;
    if y >= frame.meta.height {
        return;
    }
    let max_x = frame.meta.width;
    let len = ((track_id as u32) + 1) * 3;
    for i in 0..len {
        let x = rect.x.max(0) as u32 + i;
        if x >= max_x {
            break;
        }
        frame.set_pixel(x, y, color);
    }
}

/// Draws a tick whose width encodes the source timecode, in lieu of text
/// rendering (§4.7 "optionally overlay the source timecode").
fn overlay_timecode(frame: &mut Frame, props: &VideoShowProps) {
    let width = frame.meta.width;
    if width == 0 {
        return;
    }
    let tick = (frame.meta.timestamp_ms % (width as u64)) as u32;
    for x in 0..tick.min(width) {
        for t in 0..props.time_thickness.max(1) as u32 {
            if t >= frame.meta.height {
                break;
            }
            frame.set_pixel(x, t, props.time_color);
        }
    }
}

/// Wires the detector (C6) and tracker (C8) into the per-frame annotation
/// pass described in §4.7.
pub struct DetectionAnnotator<D: DetectionPrimitive> {
    detector: DetectorWrapper<D>,
    tracker: Tracker,
    process_dims: Option<(u32, u32)>,
    finish_dims: Option<(u32, u32)>,
    top_k: usize,
    show_best_only: bool,
    show_labels: bool,
    video_show_props: VideoShowProps,
    frames_without_hits: u64,
    target_tx: Option<crossbeam::channel::Sender<TrackTarget>>,
}

impl<D: DetectionPrimitive> DetectionAnnotator<D> {
    pub fn new(
        detector: DetectorWrapper<D>,
        tracker: Tracker,
        process_dims: Option<(u32, u32)>,
        finish_dims: Option<(u32, u32)>,
        top_k: usize,
        video_show_props: VideoShowProps,
    ) -> Self {
        DetectionAnnotator {
            detector,
            tracker,
            process_dims,
            finish_dims,
            top_k: top_k.max(1),
            show_best_only: false,
            show_labels: true,
            video_show_props,
            frames_without_hits: 0,
            target_tx: None,
        }
    }

    pub fn set_show_best_only(&mut self, value: bool) {
        self.show_best_only = value;
    }

    /// Publishes the best track's center on every frame that has one, for
    /// a pan/tilt tracker to consume out-of-band.
    pub fn set_target_sender(&mut self, tx: crossbeam::channel::Sender<TrackTarget>) {
        self.target_tx = Some(tx);
    }

    pub fn frames_without_hits(&self) -> u64 {
        self.frames_without_hits
    }
}

impl<D: DetectionPrimitive> FrameAnnotator for DetectionAnnotator<D> {
    fn annotate(&mut self, frame: Frame) -> Frame {
        let native = (frame.meta.width, frame.meta.height);
        let process_dims = self.process_dims.unwrap_or(native);
        let finish_dims = self.finish_dims.unwrap_or(native);

        let process_pixels = resize_nearest(&frame.pixels, native.0, native.1, process_dims.0, process_dims.1);
        let gray = bgr_to_gray(&process_pixels);
        let hsv = bgr_to_hsv(&process_pixels);

        let detections = self.detector.detect(&gray, process_dims.0, process_dims.1);
        let sorted = sort_and_truncate(detections, self.top_k);
        let merged = merge_overlaps(&sorted);

        if merged.is_empty() {
            self.frames_without_hits += 1;
            return frame;
        }

        let gray_view = GrayView { data: &gray, width: process_dims.0, height: process_dims.1 };
        let hsv_view = HsvView { data: &hsv, width: process_dims.0, height: process_dims.1 };
        let outcome = self.tracker.process(&gray_view, &hsv_view, &merged);

        if let Some(tx) = &self.target_tx {
            if let Some(best) = outcome
                .detections
                .iter()
                .zip(outcome.assigned_track_ids.iter())
                .find(|(_, &track_id)| track_id == outcome.best_track_id as i32)
            {
                let _ = tx.send(TrackTarget { center: best.0.center(), frame_size: process_dims });
            }
        }

        let scale_x = finish_dims.0 as f32 / process_dims.0.max(1) as f32;
        let scale_y = finish_dims.1 as f32 / process_dims.1.max(1) as f32;

        let mut finish_frame = frame.clone();
        finish_frame.pixels = resize_nearest(&frame.pixels, native.0, native.1, finish_dims.0, finish_dims.1);
        finish_frame.meta.width = finish_dims.0;
        finish_frame.meta.height = finish_dims.1;

        for (i, det) in outcome.detections.iter().enumerate() {
            let is_best = outcome.assigned_track_ids[i] == outcome.best_track_id as i32;
            if self.show_best_only && !is_best {
                continue;
            }
            let scaled = Detection::new(
                (det.x as f32 * scale_x).round() as i32,
                (det.y as f32 * scale_y).round() as i32,
                (det.w as f32 * scale_x).round() as i32,
                (det.h as f32 * scale_y).round() as i32,
                det.score,
            );
            let color = if is_best { BEST_TRACK_COLOR } else { OTHER_TRACK_COLOR };
            draw_rect_border(&mut finish_frame, scaled, color);
            if self.show_labels {
                let track_id = outcome.assigned_track_ids[i].max(0) as usize;
                draw_track_label(&mut finish_frame, scaled, track_id, color);
            }
        }

        if self.video_show_props.show_time {
            overlay_timecode(&mut finish_frame, &self.video_show_props);
        }

        finish_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierProps;

    fn checkerboard(w: u32, h: u32) -> Vec<u8> {
        let mut px = vec![0u8; (w as usize) * (h as usize) * 3];
        for (i, chunk) in px.chunks_exact_mut(3).enumerate() {
            let v = if i % 2 == 0 { 255 } else { 0 };
            chunk[0] = v;
            chunk[1] = v;
            chunk[2] = v;
        }
        px
    }

    #[test]
    fn resize_nearest_is_identity_when_dims_match() {
        let px = checkerboard(4, 4);
        let out = resize_nearest(&px, 4, 4, 4, 4);
        assert_eq!(out, px);
    }

    #[test]
    fn resize_nearest_changes_buffer_length() {
        let px = checkerboard(4, 4);
        let out = resize_nearest(&px, 4, 4, 2, 2);
        assert_eq!(out.len(), 2 * 2 * 3);
    }

    #[test]
    fn bgr_to_gray_of_white_is_255() {
        let px = vec![255u8, 255, 255];
        let gray = bgr_to_gray(&px);
        assert_eq!(gray, vec![255]);
    }

    #[test]
    fn bgr_to_gray_of_black_is_0() {
        let px = vec![0u8, 0, 0];
        assert_eq!(bgr_to_gray(&px), vec![0]);
    }

    #[test]
    fn bgr_to_hsv_pure_red_has_hue_zero() {
        // BGR for pure red: b=0, g=0, r=255.
        let px = vec![0u8, 0, 255];
        let hsv = bgr_to_hsv(&px);
        assert_eq!(hsv[0], 0);
        assert_eq!(hsv[1], 255);
        assert_eq!(hsv[2], 255);
    }

    struct FixedDetector(Vec<Detection>);
    impl DetectionPrimitive for FixedDetector {
        fn detect_raw(&mut self, _gray: &[u8], _w: u32, _h: u32, _props: &ClassifierProps) -> Vec<Detection> {
            self.0.clone()
        }
    }

    #[test]
    fn frames_without_detections_are_returned_unchanged_and_counted() {
        let detector = DetectorWrapper::new(FixedDetector(vec![]), ClassifierProps::default());
        let tracker = Tracker::new(3, 5);
        let mut annotator = DetectionAnnotator::new(detector, tracker, None, None, 5, VideoShowProps::default());

        let frame = Frame::black(8, 8, 0);
        let original = frame.pixels.clone();
        let out = annotator.annotate(frame);
        assert_eq!(out.pixels, original);
        assert_eq!(annotator.frames_without_hits(), 1);
    }
}
