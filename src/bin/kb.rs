//! `kb`: the file-source pipeline binary with pan/tilt steering (§6).
//!
//! Identical wiring to `app`, plus a dedicated thread that drains
//! [`TrackTarget`]s published by the annotator and drives a
//! [`PanTiltTracker`] independently of the frame pipeline, so a slow servo
//! sync never backs up frame delivery (§2).

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
use roam_vision::pipeline::raw_video::load_raw_frames;
use roam_vision::pipeline::sink::{DisplaySink, DisplaySurface};
use roam_vision::pipeline::source::{FileFrameSource, SourceReader};
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

/// Opens the servo board and runs its startup self-test sweep.
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

    let frames = match load_raw_frames(&config.source_file) {
        Ok(f) => f,
        Err(e) => {
            log::error!("could not open source {:?}: {e}", config.source_file);
            std::process::exit(1);
        }
    };

    let fps = 30.0;
    let source = FileFrameSource::new(frames, config.skip_frame_size, fps);
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

    // Steering is optional: with no `panTiltProps` section, `kb` runs
    // exactly like `app` except for the extra, never-fired channel.
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

    // Dropping the annotator (inside the pool) drops `target_tx`, which
    // closes the channel and lets the steering thread's `recv` return Err.
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
