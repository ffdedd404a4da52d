//! Source reader (C3): decodes frames on a dedicated thread, attaches
//! metadata, and pushes them to the start queue; stoppable.
//!
//! The actual video decoder / camera driver is an out-of-scope collaborator
//! (§1): [`FrameSource`] is exactly its contract. `FileFrameSource` and
//! `CameraFrameSource` are the two concrete flavors named in §4.3, each
//! wrapping a [`FrameGrabber`] collaborator and adding the behavior that is
//! in-scope core logic (skip-frame seeking for files; digital zoom and
//! property negotiation for cameras).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam::channel::{self, Receiver, Sender};
use spin_sleep::SpinSleeper;

use super::frame::{Frame, FrameMetadata};
use super::queue::{BoundedQueue, PutOutcome};

/// A single undecoded frame as handed back by the out-of-scope decoder.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Outcome of one decode attempt.
pub enum SourceRead {
    Frame(RawFrame),
    Eof,
    DecodeError(String),
}

/// The contract the core needs from a video decoder / camera driver (§1).
pub trait FrameSource: Send {
    fn read(&mut self) -> SourceRead;
    fn nominal_fps(&self) -> f32;

    /// Seek the underlying decoder forward by `skip_frames` (0 means "use
    /// the source's configured default"). No-op for sources that cannot
    /// seek (e.g. a live camera).
    fn fast_forward(&mut self, _skip_frames: u32) {}

    /// Seek the underlying decoder backward by `skip_frames`.
    fn rewind(&mut self, _skip_frames: u32) {}
}

/// A simple finite frame list standing in for a file decoder. Real codec
/// work is out of scope (§1 non-goals); this plays back frames recorded (or
/// synthesized) ahead of time while honoring the same seek contract a real
/// file decoder would (`cv2.CAP_PROP_POS_FRAMES` arithmetic in the
/// collaborator this replaces).
pub struct FileFrameSource {
    frames: Vec<RawFrame>,
    pos: usize,
    skip_frame_size: u32,
    fps: f32,
}

impl FileFrameSource {
    pub fn new(frames: Vec<RawFrame>, skip_frame_size: u32, fps: f32) -> Self {
        FileFrameSource {
            frames,
            pos: 0,
            skip_frame_size,
            fps,
        }
    }
}

impl FrameSource for FileFrameSource {
    fn read(&mut self) -> SourceRead {
        match self.frames.get(self.pos) {
            Some(frame) => {
                self.pos += 1;
                SourceRead::Frame(frame.clone())
            }
            None => SourceRead::Eof,
        }
    }

    fn nominal_fps(&self) -> f32 {
        self.fps
    }

    fn fast_forward(&mut self, skip_frames: u32) {
        let skip = if skip_frames == 0 {
            self.skip_frame_size
        } else {
            skip_frames
        };
        self.pos = self.pos.saturating_add(skip as usize);
    }

    fn rewind(&mut self, skip_frames: u32) {
        let skip = if skip_frames == 0 {
            self.skip_frame_size
        } else {
            skip_frames
        } as usize;
        self.pos = self.pos.saturating_sub(skip);
    }
}

/// The contract a raw camera/frame-grabber driver exposes: one blocking grab
/// per call, no seek support.
pub trait FrameGrabber: Send {
    fn grab(&mut self) -> Option<RawFrame>;
    fn native_fps(&self) -> f32;
}

/// Camera-backed source: wraps a [`FrameGrabber`] and adds digital zoom and
/// startup property negotiation, both in-scope per §4.3.
pub struct CameraFrameSource<G: FrameGrabber> {
    grabber: G,
    zoom_percent: u32,
    min_zoom: u32,
    max_zoom: u32,
}

impl<G: FrameGrabber> CameraFrameSource<G> {
    pub const DEFAULT_MIN_ZOOM: u32 = 100;
    pub const DEFAULT_MAX_ZOOM: u32 = 180;

    pub fn new(grabber: G) -> Self {
        CameraFrameSource {
            grabber,
            zoom_percent: Self::DEFAULT_MIN_ZOOM,
            min_zoom: Self::DEFAULT_MIN_ZOOM,
            max_zoom: Self::DEFAULT_MAX_ZOOM,
        }
    }

    /// Sets the digital zoom factor as a percentage (100 = no zoom),
    /// clamped to `[min_zoom, max_zoom]`.
    pub fn set_zoom(&mut self, percent: u32) {
        self.zoom_percent = percent.clamp(self.min_zoom, self.max_zoom);
    }

    /// Crops the frame to `100/zoom_percent` of its area, centered, then
    /// resizes back to the original dimensions via nearest-neighbor sampling.
    fn apply_digital_zoom(&self, frame: RawFrame) -> RawFrame {
        if self.zoom_percent <= Self::DEFAULT_MIN_ZOOM {
            return frame;
        }

        let (w, h) = (frame.width, frame.height);
        let crop_w = ((w as u64) * 100 / self.zoom_percent as u64).max(1) as u32;
        let crop_h = ((h as u64) * 100 / self.zoom_percent as u64).max(1) as u32;
        let off_x = (w - crop_w) / 2;
        let off_y = (h - crop_h) / 2;

        let mut cropped = vec![0u8; (crop_w as usize) * (crop_h as usize) * 3];
        for y in 0..crop_h {
            let src_row = (((y + off_y) as usize) * (w as usize) + off_x as usize) * 3;
            let dst_row = (y as usize) * (crop_w as usize) * 3;
            let len = (crop_w as usize) * 3;
            cropped[dst_row..dst_row + len]
                .copy_from_slice(&frame.pixels[src_row..src_row + len]);
        }

        let resized = super::annotator::resize_nearest(&cropped, crop_w, crop_h, w, h);
        RawFrame {
            pixels: resized,
            width: w,
            height: h,
        }
    }
}

impl<G: FrameGrabber> FrameSource for CameraFrameSource<G> {
    fn read(&mut self) -> SourceRead {
        match self.grabber.grab() {
            Some(frame) => SourceRead::Frame(self.apply_digital_zoom(frame)),
            None => SourceRead::DecodeError("camera grab failed".to_string()),
        }
    }

    fn nominal_fps(&self) -> f32 {
        self.grabber.native_fps()
    }
}

enum SourceCommand {
    FastForward(u32),
    Rewind(u32),
}

/// Owns the source reader thread. `fast_forward`/`rewind` are relayed
/// through a command channel the reader thread drains between reads, so the
/// underlying [`FrameSource`] is only ever touched from its own thread.
pub struct SourceReader {
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    command_tx: Sender<SourceCommand>,
    thread: Option<JoinHandle<()>>,
}

const BACKPRESSURE_RETRY: Duration = Duration::from_millis(3);

impl SourceReader {
    pub fn start<S: FrameSource + 'static>(mut source: S, queue: BoundedQueue<Frame>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx): (Sender<SourceCommand>, Receiver<SourceCommand>) =
            channel::unbounded();

        let stop_handle = Arc::clone(&stop);
        let done_handle = Arc::clone(&done);

        let thread = std::thread::Builder::new()
            .name("source-reader".to_string())
            .spawn(move || {
                let sleeper = SpinSleeper::new(100_000);
                let fps = source.nominal_fps();
                let mut index = 0u64;

                while !stop_handle.load(Ordering::Acquire) {
                    while let Ok(cmd) = command_rx.try_recv() {
                        match cmd {
                            SourceCommand::FastForward(n) => source.fast_forward(n),
                            SourceCommand::Rewind(n) => source.rewind(n),
                        }
                    }

                    match source.read() {
                        SourceRead::Frame(raw) => {
                            let meta = FrameMetadata {
                                index,
                                timestamp_ms: epoch_ms(),
                                width: raw.width,
                                height: raw.height,
                                fps,
                            };
                            let mut frame = Frame::new(raw.pixels, meta);

                            loop {
                                if stop_handle.load(Ordering::Acquire) {
                                    break;
                                }
                                match queue.try_put(frame) {
                                    (PutOutcome::Accepted, _) => break,
                                    (PutOutcome::Full, Some(returned)) => {
                                        frame = returned;
                                        sleeper.sleep(BACKPRESSURE_RETRY);
                                    }
                                    (PutOutcome::Full, None) => break,
                                }
                            }
                            index += 1;
                        }
                        SourceRead::Eof => {
                            done_handle.store(true, Ordering::Release);
                            break;
                        }
                        SourceRead::DecodeError(message) => {
                            log::warn!("source decode failed, treating as exhaustion: {message}");
                            done_handle.store(true, Ordering::Release);
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn source reader thread");

        SourceReader {
            stop,
            done,
            command_tx,
            thread: Some(thread),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn request_fast_forward(&self, skip_frames: u32) {
        let _ = self.command_tx.send(SourceCommand::FastForward(skip_frames));
    }

    pub fn request_rewind(&self, skip_frames: u32) {
        let _ = self.command_tx.send(SourceCommand::Rewind(skip_frames));
    }

    /// Idempotent: a second call observes `thread` already taken and is a no-op.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SourceReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
