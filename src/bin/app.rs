//! `app`: the file-source pipeline binary (§6) — no pan/tilt steering.

use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;

use roam_vision::cli::Cli;
use roam_vision::config::{CliOverrides, ClassifierProps, Config};
use roam_vision::pipeline::annotator::{DetectionAnnotator, FrameAnnotator};
use roam_vision::pipeline::coordinator::Coordinator;
use roam_vision::pipeline::detector::{DetectionPrimitive, DetectorWrapper};
use roam_vision::pipeline::frame::{Detection, Frame};
use roam_vision::pipeline::queue::BoundedQueue;
use roam_vision::pipeline::raw_video::load_raw_frames;
use roam_vision::pipeline::sink::{DisplaySink, DisplaySurface};
use roam_vision::pipeline::source::{FileFrameSource, SourceReader};
use roam_vision::pipeline::worker_pool::OrderedWorkerPool;
use roam_vision::tracker::correlator::Tracker;

/// No-op detector: the real detection primitive is an out-of-scope
/// collaborator (§1). Runs the full pipeline headless, with zero hits.
struct NullDetectionPrimitive;
impl DetectionPrimitive for NullDetectionPrimitive {
    fn detect_raw(&mut self, _gray: &[u8], _w: u32, _h: u32, _props: &ClassifierProps) -> Vec<Detection> {
        Vec::new()
    }
}

/// No GUI is in scope (§1 non-goals); the sink runs headless and never
/// reports a keypress.
struct HeadlessSurface;
impl DisplaySurface for HeadlessSurface {
    fn push(&mut self, _frame: &Frame) {}
    fn poll_key(&mut self) -> Option<char> {
        None
    }
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

    let source = FileFrameSource::new(frames, config.skip_frame_size, 30.0);
    let start_queue: BoundedQueue<Frame> = BoundedQueue::new(config.queue_size);
    let finish_queue: BoundedQueue<Frame> = BoundedQueue::new(config.queue_size);

    let source_reader = SourceReader::start(source, start_queue.clone());

    let detector = DetectorWrapper::new(NullDetectionPrimitive, config.classifier_props.clone());
    let tracker = Tracker::new(3, 15);
    let annotator = DetectionAnnotator::new(
        detector,
        tracker,
        config.processing_props.process_dims,
        config.processing_props.finish_dims,
        5,
        config.video_show_props.clone(),
    );
    let shared_annotator = Arc::new(Mutex::new(annotator));

    let worker_count = config.processing_props.threads.max(1);
    let max_in_flight = worker_count;
    let pool: OrderedWorkerPool<Frame, Frame> = OrderedWorkerPool::new(worker_count, max_in_flight, move |frame| {
        shared_annotator.lock().annotate(frame)
    });

    let sink = DisplaySink::start(HeadlessSurface, finish_queue.clone(), config.video_show_props.clone(), 30.0);

    let mut coordinator = Coordinator::new(start_queue, finish_queue, pool, max_in_flight, source_reader, sink);
    match coordinator.run() {
        Ok(()) => {
            let (frame_count, fps, failures) = coordinator.stats();
            log::info!("done: {frame_count} frames, {fps:.1} fps, {failures} worker failures");
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("pipeline error: {e}");
            std::process::exit(1);
        }
    }
}
