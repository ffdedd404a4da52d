//! The concurrent pipeline: bounded queues, ordered worker pool, source
//! reader, detector/annotator, and display sink, mediated by the
//! coordinator (§4).

pub mod annotator;
pub mod coordinator;
pub mod detector;
pub mod frame;
pub mod queue;
pub mod raw_video;
pub mod sink;
pub mod source;
pub mod worker_pool;
