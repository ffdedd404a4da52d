//! Command-line flags shared by the `app`, `kb`, and `camera` binaries (§6).

use std::path::PathBuf;

use clap::Parser;

use crate::config::CliOverrides;

#[derive(Debug, Parser)]
pub struct Cli {
    /// Property file to load.
    #[arg(long, default_value = "./app.properties")]
    pub properties: PathBuf,

    /// Input video file, overriding the property file's `sourceFile`.
    #[arg(long = "sourceFile")]
    pub source_file: Option<PathBuf>,

    /// Detector model path, overriding the property file's `classifierFile`.
    #[arg(long = "classifierFile")]
    pub classifier_file: Option<PathBuf>,

    /// Frames to seek on rewind/fast-forward, overriding `skipFrameSize`.
    #[arg(long = "skipFrames")]
    pub skip_frames: Option<u32>,

    /// Overlay the source timecode on displayed frames.
    #[arg(long = "showTime")]
    pub show_time: bool,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            source_file: self.source_file.clone(),
            classifier_file: self.classifier_file.clone(),
            skip_frames: self.skip_frames,
            show_time: self.show_time,
        }
    }
}
