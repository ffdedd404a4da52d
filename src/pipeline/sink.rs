//! Display sink (C4): pulls annotated frames on a dedicated thread,
//! throttles to the source frame rate, and handles keypress commands.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use spin_sleep::SpinSleeper;

use super::frame::Frame;
use super::queue::{BlockingGet, BoundedQueue};
use crate::config::VideoShowProps;

/// The contract a display surface and keyboard poller expose (§1, §4.4):
/// render one frame, and report the most recent keypress (if any).
pub trait DisplaySurface: Send {
    fn push(&mut self, frame: &Frame);
    fn poll_key(&mut self) -> Option<char>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkCommand {
    Quit,
    Rewind,
    FastForward,
}

/// Owns the sink thread. `commands()` surfaces rewind/fast-forward/quit
/// requests observed from keypresses for the coordinator to relay.
pub struct DisplaySink {
    done: Arc<AtomicBool>,
    stop_on_empty: Arc<AtomicBool>,
    frame_count: Arc<AtomicU64>,
    achieved_fps_milli: Arc<AtomicU64>,
    command_rx: crossbeam::channel::Receiver<SinkCommand>,
    thread: Option<JoinHandle<()>>,
}

impl DisplaySink {
    pub fn start<S: DisplaySurface + 'static>(
        mut surface: S,
        queue: BoundedQueue<Frame>,
        props: VideoShowProps,
        target_fps: f32,
    ) -> Self {
        let done = Arc::new(AtomicBool::new(false));
        let stop_on_empty = Arc::new(AtomicBool::new(false));
        let frame_count = Arc::new(AtomicU64::new(0));
        let achieved_fps_milli = Arc::new(AtomicU64::new(0));
        let (command_tx, command_rx) = crossbeam::channel::unbounded();

        let done_handle = Arc::clone(&done);
        let stop_on_empty_handle = Arc::clone(&stop_on_empty);
        let frame_count_handle = Arc::clone(&frame_count);
        let fps_handle = Arc::clone(&achieved_fps_milli);

        let thread = std::thread::Builder::new()
            .name("display-sink".to_string())
            .spawn(move || {
                let sleeper = SpinSleeper::new(100_000);
                let target_period = Duration::from_secs_f32(1.0 / target_fps.max(1.0));
                let mut process_delay = target_period;
                let mut paused = false;
                let mut last_tick = Instant::now();
                let mut last_frame: Option<Frame> = None;

                loop {
                    if let Some(key) = surface.poll_key() {
                        match key {
                            'q' => {
                                done_handle.store(true, Ordering::Release);
                                let _ = command_tx.send(SinkCommand::Quit);
                                break;
                            }
                            'p' => paused = !paused,
                            'f' => {
                                if let Some(frame) = &last_frame {
                                    if let Err(e) = capture_frame(frame, &props.clip_capture_dir) {
                                        log::warn!("frame capture failed: {e}");
                                    }
                                }
                            }
                            ',' => {
                                let _ = command_tx.send(SinkCommand::Rewind);
                            }
                            '.' => {
                                let _ = command_tx.send(SinkCommand::FastForward);
                            }
                            _ => {}
                        }
                    }

                    if paused {
                        sleeper.sleep(Duration::from_millis(10));
                        continue;
                    }

                    match queue.get() {
                        BlockingGet::Item(frame) => {
                            if props.show_output {
                                surface.push(&frame);
                            }
                            frame_count_handle.fetch_add(1, Ordering::Relaxed);
                            last_frame = Some(frame.clone());

                            let elapsed = last_tick.elapsed();
                            if elapsed > target_period {
                                process_delay = process_delay.saturating_sub(Duration::from_millis(1));
                            } else {
                                process_delay += Duration::from_millis(1);
                            }
                            last_tick = Instant::now();
                            sleeper.sleep(process_delay);

                            if elapsed.as_secs_f32() > 0.0 {
                                fps_handle.store((1.0 / elapsed.as_secs_f32() * 1000.0) as u64, Ordering::Relaxed);
                            }
                        }
                        BlockingGet::Closed => {
                            if stop_on_empty_handle.load(Ordering::Acquire) {
                                done_handle.store(true, Ordering::Release);
                                break;
                            }
                            sleeper.sleep(Duration::from_millis(5));
                        }
                    }
                }
            })
            .expect("failed to spawn display sink thread");

        DisplaySink {
            done,
            stop_on_empty,
            frame_count,
            achieved_fps_milli,
            command_rx,
            thread: Some(thread),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub fn request_stop_on_empty(&self) {
        self.stop_on_empty.store(true, Ordering::Release);
    }

    pub fn try_recv_command(&self) -> Option<SinkCommand> {
        self.command_rx.try_recv().ok()
    }

    pub fn stats(&self) -> (u64, f32) {
        (
            self.frame_count.load(Ordering::Relaxed),
            self.achieved_fps_milli.load(Ordering::Relaxed) as f32 / 1000.0,
        )
    }

    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DisplaySink {
    fn drop(&mut self) {
        self.join();
    }
}

/// Writes `frame` as a PPM (P6) file named `{epoch_ms}.ppm` under `dir`.
/// JPEG encoding would require an image-codec dependency outside the
/// project's stack; PPM needs none and keeps the capture format self-hosted.
pub fn capture_frame(frame: &Frame, dir: &std::path::Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let epoch_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let path = dir.join(format!("{epoch_ms}.ppm"));
    let mut file = std::fs::File::create(&path)?;
    write!(file, "P6\n{} {}\n255\n", frame.meta.width, frame.meta.height)?;
    for px in frame.pixels.chunks_exact(3) {
        file.write_all(&[px[2], px[1], px[0]])?; // BGR -> RGB
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSurface {
        pushed: Arc<Mutex<Vec<u64>>>,
        keys: std::sync::mpsc::Receiver<char>,
    }

    impl DisplaySurface for FakeSurface {
        fn push(&mut self, frame: &Frame) {
            self.pushed.lock().unwrap().push(frame.meta.index);
        }

        fn poll_key(&mut self) -> Option<char> {
            self.keys.try_recv().ok()
        }
    }

    #[test]
    fn quit_keypress_marks_done_and_reports_command() {
        let (key_tx, key_rx) = std::sync::mpsc::channel();
        let pushed = Arc::new(Mutex::new(Vec::new()));
        let surface = FakeSurface { pushed: Arc::clone(&pushed), keys: key_rx };
        let queue = BoundedQueue::new(4);
        let props = VideoShowProps::default();

        let mut sink = DisplaySink::start(surface, queue, props, 30.0);
        key_tx.send('q').unwrap();

        let mut tries = 0;
        while !sink.is_done() && tries < 2000 {
            std::thread::sleep(Duration::from_millis(1));
            tries += 1;
        }
        assert!(sink.is_done());
        assert_eq!(sink.try_recv_command(), Some(SinkCommand::Quit));
    }

    #[test]
    fn frames_are_pushed_and_counted() {
        let (_key_tx, key_rx) = std::sync::mpsc::channel();
        let pushed = Arc::new(Mutex::new(Vec::new()));
        let surface = FakeSurface { pushed: Arc::clone(&pushed), keys: key_rx };
        let queue = BoundedQueue::new(4);
        queue.put(Frame::black(4, 4, 0)).unwrap();
        queue.put(Frame::black(4, 4, 1)).unwrap();

        let mut sink = DisplaySink::start(surface, queue, VideoShowProps::default(), 1000.0);

        let mut tries = 0;
        while pushed.lock().unwrap().len() < 2 && tries < 2000 {
            std::thread::sleep(Duration::from_millis(1));
            tries += 1;
        }
        assert_eq!(*pushed.lock().unwrap(), vec![0, 1]);
        sink.request_stop_on_empty();
    }
}
