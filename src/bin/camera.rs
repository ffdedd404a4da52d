//! `camera`: shares `kb`'s wiring with a camera source substituted for the
//! file source (§6: "implemented as a thin variant"). The real camera
//! driver is an out-of-scope collaborator (§1); [`NullFrameGrabber`] is its
//! headless stand-in, exactly as `app`/`kb` stand in a no-op detector.

use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;

use roam_vision::cli::Cli;
use roam_vision::config::{CliOverrides, ClassifierProps, Config, PanTiltProps};
use roam_vision::pipeline::annotator::{DetectionAnnotator, FrameAnnotator, TrackTarget};
use roam_vision::pipeline::coordinator::Coordinator;
use roam_vision::pipeline::detector::{DetectionPrimitive, DetectorWrapper};
use roam_vision::pipeline::frame::{Detection, Frame};
use roam_vision::pipeline::queue::BoundedQueue;
use roam_vision::pipeline::sink::{DisplaySink, DisplaySurface};
use roam_vision::pipeline::source::{CameraFrameSource, FrameGrabber, RawFrame, SourceReader};
use roam_vision::pipeline::worker_pool::OrderedWorkerPool;
use roam_vision::servo::controller::{ServoController, ServoProperties};
use roam_vision::servo::pantilt::{PanTiltTracker, ALL};
use roam_vision::tracker::correlator::Tracker;

struct NullDetectionPrimitive;
impl DetectionPrimitive for NullDetectionPrimitive {
    fn detect_raw(&mut self, _gray: &[u8], _w: u32, _h: u32, _props: &ClassifierProps) -> Vec<Detection> {
        Vec::new()
    }
}

struct HeadlessSurface;
impl DisplaySurface for HeadlessSurface {
    fn push(&mut self, _frame: &Frame) {}
    fn poll_key(&mut self) -> Option<char> {
        None
    }
}

/// Headless stand-in for a real camera driver: never produces a frame, so
/// the source reader reports exhaustion on its first grab.
struct NullFrameGrabber {
    width: u32,
    height: u32,
    fps: f32,
}
impl FrameGrabber for NullFrameGrabber {
    fn grab(&mut self) -> Option<RawFrame> {
        let _ = (self.width, self.height);
        None
    }
    fn native_fps(&self) -> f32 {
        self.fps
    }
}

fn open_pan_tilt(props: &PanTiltProps) -> Result<PanTiltTracker, roam_vision::PipelineError> {
    let channels = ALL.map(|ch| {
        let ch = ch as usize;
        ServoProperties::new(
            index2(props.min_us, ch),
            index2(props.max_us, ch),
            index2(props.home_us, ch),
            index2_u16(props.cruise_speed, ch),
            props.acceleration,
            index2_f32(props.range_degrees, ch),
        )
    });
    let controller = ServoController::open(&props.port, props.baud, channels.to_vec())?;
    let mut tracker = PanTiltTracker::new(
        controller,
        props.horiz_slack,
        props.vert_slack,
        props.cruise_speed,
        props.calibration_speed,
    );
    tracker.initialize(props.min_us, props.max_us)?;
    tracker.calibrate(props.calibration_file.as_deref())?;
    Ok(tracker)
}

fn index2(pair: (u32, u32), i: usize) -> u32 {
    if i == 0 { pair.0 } else { pair.1 }
}
fn index2_u16(pair: (u16, u16), i: usize) -> u16 {
    if i == 0 { pair.0 } else { pair.1 }
}
fn index2_f32(pair: (f32, f32), i: usize) -> f32 {
    if i == 0 { pair.0 } else { pair.1 }
}

fn main() {
    let cli = Cli::parse();
    let overrides: CliOverrides = cli.overrides();

    let config = match Config::load(&cli.properties, &overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(1);
        }
    };

    roam_vision::init_logging(config.log_level);

    let fps = 30.0;
    let (native_w, native_h) = config.processing_props.frame_dims.unwrap_or((640, 480));
    let grabber = NullFrameGrabber { width: native_w, height: native_h, fps };
    let source = CameraFrameSource::new(grabber);

    let start_queue: BoundedQueue<Frame> = BoundedQueue::new(config.queue_size);
    let finish_queue: BoundedQueue<Frame> = BoundedQueue::new(config.queue_size);

    let source_reader = SourceReader::start(source, start_queue.clone());

    let detector = DetectorWrapper::new(NullDetectionPrimitive, config.classifier_props.clone());
    let tracker = Tracker::new(3, 15);
    let mut annotator = DetectionAnnotator::new(
        detector,
        tracker,
        config.processing_props.process_dims,
        config.processing_props.finish_dims,
        5,
        config.video_show_props.clone(),
    );

    let (target_tx, target_rx) = crossbeam::channel::unbounded::<TrackTarget>();
    let mut steering_thread = None;
    match &config.pan_tilt_props {
        Some(props) => match open_pan_tilt(props) {
            Ok(mut pan_tilt) => {
                annotator.set_target_sender(target_tx);
                steering_thread = Some(std::thread::spawn(move || {
                    while let Ok(target) = target_rx.recv() {
                        if let Err(e) = pan_tilt.correct(target.center, target.frame_size, fps) {
                            log::warn!("pan/tilt correction failed: {e}");
                        }
                    }
                }));
            }
            Err(e) => {
                log::warn!("could not open pan/tilt hardware, running detector-only: {e}");
            }
        },
        None => {
            log::info!("no panTiltProps configured, running detector-only");
        }
    }

    let shared_annotator = Arc::new(Mutex::new(annotator));

    let worker_count = config.processing_props.threads.max(1);
    let max_in_flight = worker_count;
    let pool: OrderedWorkerPool<Frame, Frame> = OrderedWorkerPool::new(worker_count, max_in_flight, move |frame| {
        shared_annotator.lock().annotate(frame)
    });

    let sink = DisplaySink::start(HeadlessSurface, finish_queue.clone(), config.video_show_props.clone(), fps);

    let mut coordinator = Coordinator::new(start_queue, finish_queue, pool, max_in_flight, source_reader, sink);
    let result = coordinator.run();

    drop(coordinator);
    if let Some(handle) = steering_thread.take() {
        let _ = handle.join();
    }

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("pipeline error: {e}");
            std::process::exit(1);
        }
    }
}
