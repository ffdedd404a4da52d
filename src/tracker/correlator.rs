//! ROI tracker / correlator (C8): maintains K tracks of N recent
//! descriptors, matches incoming detections via greedy Hungarian-style
//! assignment, and scores the best track.

use std::collections::HashSet;

use crate::pipeline::frame::{sort_and_truncate, Detection};

use super::histogram::{correlate, gray_histogram, hsv_histogram, GrayView, HsvView};
use super::track::{Track, TrackData};

pub const DEFAULT_TRACK_COUNT: usize = 3;
pub const DEFAULT_HISTORY_LEN: usize = 15;
pub const DEFAULT_MIN_CORRELATION: f32 = 0.5;

/// The result of one `process` call (§4.8).
pub struct ProcessOutcome {
    pub detections: Vec<Detection>,
    /// Parallel to `detections`: the track index each was assigned to, or
    /// -1 if unmatched.
    pub assigned_track_ids: Vec<i32>,
    pub best_track_id: usize,
}

pub struct Tracker {
    tracks: Vec<Track>,
    k: usize,
    min_corr_threshold: f32,
    best_track_index: usize,
}

impl Tracker {
    pub fn new(k: usize, n: usize) -> Self {
        Tracker::with_threshold(k, n, DEFAULT_MIN_CORRELATION)
    }

    pub fn with_threshold(k: usize, n: usize, min_corr_threshold: f32) -> Self {
        let k = k.max(1);
        Tracker {
            tracks: (0..k).map(|_| Track::new(n)).collect(),
            k,
            min_corr_threshold,
            best_track_index: 0,
        }
    }

    pub fn track_count(&self) -> usize {
        self.k
    }

    pub fn best_track_id(&self) -> usize {
        self.best_track_index
    }

    pub fn track(&self, index: usize) -> &Track {
        &self.tracks[index]
    }

    pub fn process(
        &mut self,
        gray: &GrayView,
        hsv: &HsvView,
        detections: &[Detection],
    ) -> ProcessOutcome {
        // Step 1 — sort descending, truncate to K.
        let incoming = sort_and_truncate(detections.to_vec(), self.k);

        // Step 2 — compute per-detection descriptors.
        let descriptors: Vec<TrackData> = incoming
            .iter()
            .map(|d| {
                let rect = (d.x, d.y, d.w, d.h);
                let gray_hist = gray_histogram(gray, rect);
                let hsv_hist = hsv_histogram(hsv, rect);
                TrackData::new(gray_hist, hsv_hist, d.score, Some(rect), Some(d.center()))
            })
            .collect();

        // Step 3 — reference descriptor per track (most recent non-empty).
        let references: Vec<Option<TrackData>> = self
            .tracks
            .iter()
            .map(|t| t.latest().map(|(_, d)| d.clone()))
            .collect();

        // Step 4 — correlation matrix (incoming x K).
        let n = incoming.len();
        let mut matrix = vec![vec![0f32; self.k]; n];
        for (i, desc) in descriptors.iter().enumerate() {
            for (j, reference) in references.iter().enumerate() {
                if let Some(reference) = reference {
                    matrix[i][j] = correlate(&desc.gray_hist, &reference.gray_hist)
                        + correlate(&desc.hsv_hist, &reference.hsv_hist);
                }
            }
        }

        // Step 5 — greedy assignment: repeated global argmax with row/col elimination.
        let mut assigned = vec![-1i32; n];
        for _ in 0..n {
            let mut best: Option<(f32, usize, usize)> = None;
            for (i, row) in matrix.iter().enumerate() {
                for (j, &value) in row.iter().enumerate() {
                    if best.is_none_or(|(b, _, _)| value > b) {
                        best = Some((value, i, j));
                    }
                }
            }
            let Some((value, r, c)) = best else { break };

            if value > self.min_corr_threshold {
                assigned[r] = c as i32;
            }
            for v in matrix[r].iter_mut() {
                *v = -1.0;
            }
            for row in matrix.iter_mut() {
                row[c] = -1.0;
            }
        }

        // Step 6 — write back.
        let mut written: HashSet<usize> = HashSet::new();
        for (i, &track_id) in assigned.iter().enumerate() {
            if track_id >= 0 {
                let track_id = track_id as usize;
                self.tracks[track_id].push(descriptors[i].clone());
                written.insert(track_id);
            }
        }

        let mut empty_slots: Vec<usize> = (0..self.k)
            .filter(|j| !written.contains(j) && self.tracks[*j].is_empty())
            .collect();
        empty_slots.reverse(); // consume in ascending order via pop()

        for (i, &track_id) in assigned.iter().enumerate() {
            if track_id < 0 {
                if let Some(slot) = empty_slots.pop() {
                    self.tracks[slot].push(descriptors[i].clone());
                    written.insert(slot);
                }
            }
        }

        for j in 0..self.k {
            if !written.contains(&j) {
                self.tracks[j].push(TrackData::empty());
            }
        }

        // Step 7 — best-track selection.
        self.best_track_index = (0..self.k)
            .max_by(|&a, &b| {
                self.tracks[a]
                    .level_sum()
                    .partial_cmp(&self.tracks[b].level_sum())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(0);

        ProcessOutcome {
            detections: incoming,
            assigned_track_ids: assigned,
            best_track_id: self.best_track_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_gray(value: u8, w: u32, h: u32) -> Vec<u8> {
        vec![value; (w * h) as usize]
    }

    fn solid_hsv(hue: u8, w: u32, h: u32) -> Vec<u8> {
        let mut data = vec![0u8; (w * h * 3) as usize];
        for px in data.chunks_exact_mut(3) {
            px[0] = hue;
            px[1] = 200;
            px[2] = 200;
        }
        data
    }

    #[test]
    fn empty_stream_keeps_best_track_at_zero_and_all_tracks_empty() {
        // S2: 3 frames, no detections.
        let mut tracker = Tracker::new(3, 15);
        for _ in 0..3 {
            let gray_data = solid_gray(0, 4, 4);
            let hsv_data = solid_hsv(0, 4, 4);
            let gray = GrayView { data: &gray_data, width: 4, height: 4 };
            let hsv = HsvView { data: &hsv_data, width: 4, height: 4 };
            let outcome = tracker.process(&gray, &hsv, &[]);
            assert!(outcome.detections.is_empty());
        }
        assert_eq!(tracker.best_track_id(), 0);
        for i in 0..3 {
            assert!(tracker.track(i).is_empty());
        }
    }

    /// Builds a `width x 6` gray/HSV frame with three 6x6 color blocks side
    /// by side at x-offsets `0`, `20`, `40`, so each block can be targeted by
    /// its own detection rect within a single `process` call.
    fn three_block_frame(width: u32) -> (Vec<u8>, Vec<u8>) {
        let height = 6u32;
        let mut gray = vec![0u8; (width * height) as usize];
        let mut hsv = vec![0u8; (width * height * 3) as usize];
        let blocks = [(0u32, 40u8, 0u8), (20, 180, 60), (40, 100, 120)];
        for y in 0..height {
            for (x0, gray_value, hue) in blocks {
                for x in x0..x0 + 6 {
                    let i = (y * width + x) as usize;
                    gray[i] = gray_value;
                    hsv[i * 3] = hue;
                    hsv[i * 3 + 1] = 200;
                    hsv[i * 3 + 2] = 200;
                }
            }
        }
        (gray, hsv)
    }

    #[test]
    fn greedy_assignment_matches_s4() {
        let mut tracker = Tracker::with_threshold(3, 5, 0.5);
        let width = 46u32;
        let (gray_data, hsv_data) = three_block_frame(width);
        let gray = GrayView { data: &gray_data, width, height: 6 };
        let hsv = HsvView { data: &hsv_data, width, height: 6 };

        let red = Detection::new(0, 0, 6, 6, 0.9);
        let green = Detection::new(20, 0, 6, 6, 0.8);
        let blue = Detection::new(40, 0, 6, 6, 0.7);

        // Seed track 0 with red, track 1 with green; track 2 stays empty —
        // with no reference descriptors yet every correlation is 0, so the
        // greedy pass leaves both unassigned and they fall into empty slots
        // in incoming order.
        tracker.process(&gray, &hsv, &[red.clone(), green.clone()]);
        assert!(tracker.track(2).is_empty());
        assert!(!tracker.track(0).is_empty());
        assert!(!tracker.track(1).is_empty());

        // One call with all three detections simultaneously: red and green
        // re-match their seeded tracks by color, blue matches neither and
        // lands in the one remaining empty slot, track 2.
        let outcome = tracker.process(&gray, &hsv, &[red, green, blue]);
        assert_eq!(outcome.assigned_track_ids, vec![0, 1, -1]);
        assert!(!tracker.track(2).is_empty());
    }

    #[test]
    fn process_always_leaves_every_track_at_fixed_length() {
        // P2
        let mut tracker = Tracker::new(3, 5);
        let gray_data = solid_gray(100, 4, 4);
        let hsv_data = solid_hsv(30, 4, 4);
        let gray = GrayView { data: &gray_data, width: 4, height: 4 };
        let hsv = HsvView { data: &hsv_data, width: 4, height: 4 };

        for _ in 0..10 {
            tracker.process(&gray, &hsv, &[Detection::new(0, 0, 4, 4, 0.7)]);
            for i in 0..3 {
                assert_eq!(tracker.track(i).len(), 5);
            }
        }
    }

    #[test]
    fn assignment_is_injective_and_in_range() {
        // P3
        let mut tracker = Tracker::new(2, 5);
        let gray_data = solid_gray(50, 4, 4);
        let hsv_data = solid_hsv(20, 4, 4);
        let gray = GrayView { data: &gray_data, width: 4, height: 4 };
        let hsv = HsvView { data: &hsv_data, width: 4, height: 4 };

        let outcome = tracker.process(
            &gray,
            &hsv,
            &[
                Detection::new(0, 0, 4, 4, 0.9),
                Detection::new(0, 0, 4, 4, 0.8),
                Detection::new(0, 0, 4, 4, 0.7),
            ],
        );

        let matched: Vec<i32> = outcome
            .assigned_track_ids
            .iter()
            .copied()
            .filter(|&id| id >= 0)
            .collect();
        let mut unique = matched.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(matched.len(), unique.len());
        assert!(matched.iter().all(|&id| (id as usize) < 2));
    }
}
