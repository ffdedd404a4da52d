//! Property-file configuration: parsing, typed validation, and CLI overlay.
//!
//! The file format is a small hand-rolled key=value reader (§6/§12) rather
//! than a general-purpose config crate, since the shape (scalars, bracketed
//! lists, brace maps, literal-typed values) is fixed and specific to this
//! one file format.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::PipelineError;

mod parse;
pub use parse::PropertyValue;

/// Mirrors the property file's `logLevel` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierProps {
    pub min_object_size: (u32, u32),
    pub max_object_size: (u32, u32),
    pub scale_factor: f32,
    pub min_neighbors: i32,
    pub min_level: f32,
}

impl Default for ClassifierProps {
    fn default() -> Self {
        ClassifierProps {
            min_object_size: (18, 18),
            max_object_size: (128, 128),
            scale_factor: 1.09,
            min_neighbors: 3,
            min_level: 1.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoShowProps {
    pub window_name: String,
    pub clip_capture_dir: PathBuf,
    pub show_time: bool,
    pub show_output: bool,
    pub time_color: (u8, u8, u8),
    pub time_thickness: i32,
}

impl Default for VideoShowProps {
    fn default() -> Self {
        VideoShowProps {
            window_name: "roam-vision".to_string(),
            clip_capture_dir: PathBuf::from("."),
            show_time: false,
            show_output: true,
            time_color: (255, 255, 255),
            time_thickness: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessingProps {
    pub threads: usize,
    pub frame_dims: Option<(u32, u32)>,
    pub process_dims: Option<(u32, u32)>,
    pub finish_dims: Option<(u32, u32)>,
}

impl Default for ProcessingProps {
    fn default() -> Self {
        ProcessingProps {
            threads: 5,
            frame_dims: None,
            process_dims: None,
            finish_dims: None,
        }
    }
}

/// Servo serial port and pan/tilt geometry, parsed from the optional
/// `panTiltProps` map. Absent entirely when the property file has no
/// `panTiltProps` key, which the `kb`/`camera` binaries treat as "no
/// steering hardware attached" and run detector-only.
#[derive(Debug, Clone)]
pub struct PanTiltProps {
    pub port: String,
    pub baud: u32,
    pub min_us: (u32, u32),
    pub max_us: (u32, u32),
    pub home_us: (u32, u32),
    pub range_degrees: (f32, f32),
    pub cruise_speed: (u16, u16),
    pub calibration_speed: u16,
    pub acceleration: u16,
    pub horiz_slack: f32,
    pub vert_slack: f32,
    pub calibration_file: Option<PathBuf>,
}

impl Default for PanTiltProps {
    fn default() -> Self {
        PanTiltProps {
            port: "/dev/ttyACM0".to_string(),
            baud: 115_200,
            min_us: (992, 992),
            max_us: (2000, 2000),
            home_us: (1500, 1500),
            range_degrees: (180.0, 180.0),
            cruise_speed: (200, 200),
            calibration_speed: 50,
            acceleration: 0,
            horiz_slack: 0.1,
            vert_slack: 0.1,
            calibration_file: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub queue_size: usize,
    pub skip_frame_size: u32,
    pub classifier_props: ClassifierProps,
    pub video_show_props: VideoShowProps,
    pub classifier_file: PathBuf,
    pub source_file: PathBuf,
    pub log_level: LogLevel,
    pub processing_props: ProcessingProps,
    pub pan_tilt_props: Option<PanTiltProps>,
}

/// CLI flags that, when present, take precedence over the property file (§12).
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub source_file: Option<PathBuf>,
    pub classifier_file: Option<PathBuf>,
    pub skip_frames: Option<u32>,
    pub show_time: bool,
}

impl Config {
    /// Loads and validates a property file, then applies CLI overrides.
    pub fn load(path: &Path, overrides: &CliOverrides) -> Result<Config, PipelineError> {
        let text = fs::read_to_string(path)
            .map_err(|e| PipelineError::ConfigMissing(format!("{}: {e}", path.display())))?;
        let raw = parse::parse_property_file(&text)?;
        Self::from_raw(raw, overrides)
    }

    fn from_raw(
        raw: HashMap<String, PropertyValue>,
        overrides: &CliOverrides,
    ) -> Result<Config, PipelineError> {
        let queue_size = require_int(&raw, "queueSize")? as usize;
        let skip_frame_size = require_int(&raw, "skipFrameSize")? as u32;
        let classifier_file = PathBuf::from(require_str(&raw, "classifierFile")?);
        let source_file = PathBuf::from(require_str(&raw, "sourceFile")?);

        let log_level = match raw.get("logLevel") {
            Some(PropertyValue::Str(s)) => s.parse::<LogLevel>().unwrap_or_else(|_| {
                log::warn!("unrecognized logLevel {s:?}, defaulting to INFO");
                LogLevel::Info
            }),
            None => LogLevel::Info,
            Some(_) => {
                return Err(PipelineError::ConfigType {
                    key: "logLevel".to_string(),
                    expected: "string",
                });
            }
        };

        let classifier_props = match raw.get("classifierProps") {
            Some(PropertyValue::Map(m)) => parse_classifier_props(m)?,
            None => ClassifierProps::default(),
            Some(_) => {
                return Err(PipelineError::ConfigType {
                    key: "classifierProps".to_string(),
                    expected: "map",
                });
            }
        };

        let video_show_props = match raw.get("videoShowProps") {
            Some(PropertyValue::Map(m)) => parse_video_show_props(m)?,
            None => VideoShowProps::default(),
            Some(_) => {
                return Err(PipelineError::ConfigType {
                    key: "videoShowProps".to_string(),
                    expected: "map",
                });
            }
        };

        let processing_props = match raw.get("processingProps") {
            Some(PropertyValue::Map(m)) => parse_processing_props(m)?,
            None => ProcessingProps::default(),
            Some(_) => {
                return Err(PipelineError::ConfigType {
                    key: "processingProps".to_string(),
                    expected: "map",
                });
            }
        };

        let pan_tilt_props = match raw.get("panTiltProps") {
            Some(PropertyValue::Map(m)) => Some(parse_pan_tilt_props(m)),
            None => None,
            Some(_) => {
                return Err(PipelineError::ConfigType {
                    key: "panTiltProps".to_string(),
                    expected: "map",
                });
            }
        };

        let mut config = Config {
            queue_size,
            skip_frame_size,
            classifier_props,
            video_show_props,
            classifier_file,
            source_file,
            log_level,
            processing_props,
            pan_tilt_props,
        };

        if let Some(p) = &overrides.source_file {
            config.source_file = p.clone();
        }
        if let Some(p) = &overrides.classifier_file {
            config.classifier_file = p.clone();
        }
        if let Some(n) = overrides.skip_frames {
            config.skip_frame_size = n;
        }
        if overrides.show_time {
            config.video_show_props.show_time = true;
        }

        Ok(config)
    }
}

fn require_int(raw: &HashMap<String, PropertyValue>, key: &str) -> Result<i64, PipelineError> {
    match raw.get(key) {
        Some(PropertyValue::Int(n)) => Ok(*n),
        Some(_) => Err(PipelineError::ConfigType {
            key: key.to_string(),
            expected: "int",
        }),
        None => Err(PipelineError::ConfigMissing(key.to_string())),
    }
}

fn require_str(raw: &HashMap<String, PropertyValue>, key: &str) -> Result<String, PipelineError> {
    match raw.get(key) {
        Some(PropertyValue::Str(s)) => Ok(s.clone()),
        Some(_) => Err(PipelineError::ConfigType {
            key: key.to_string(),
            expected: "string",
        }),
        None => Err(PipelineError::ConfigMissing(key.to_string())),
    }
}

fn map_get_int(m: &HashMap<String, PropertyValue>, key: &str, default: i64) -> i64 {
    match m.get(key) {
        Some(PropertyValue::Int(n)) => *n,
        Some(PropertyValue::Float(f)) => *f as i64,
        Some(_) => {
            log::warn!("property {key:?} has an unexpected type, using default");
            default
        }
        None => default,
    }
}

fn map_get_float(m: &HashMap<String, PropertyValue>, key: &str, default: f32) -> f32 {
    match m.get(key) {
        Some(PropertyValue::Float(f)) => *f as f32,
        Some(PropertyValue::Int(n)) => *n as f32,
        Some(_) => {
            log::warn!("property {key:?} has an unexpected type, using default");
            default
        }
        None => default,
    }
}

fn map_get_bool(m: &HashMap<String, PropertyValue>, key: &str, default: bool) -> bool {
    match m.get(key) {
        Some(PropertyValue::Bool(b)) => *b,
        Some(_) => {
            log::warn!("property {key:?} has an unexpected type, using default");
            default
        }
        None => default,
    }
}

fn map_get_str(m: &HashMap<String, PropertyValue>, key: &str, default: &str) -> String {
    match m.get(key) {
        Some(PropertyValue::Str(s)) => s.clone(),
        Some(_) => {
            log::warn!("property {key:?} has an unexpected type, using default");
            default.to_string()
        }
        None => default.to_string(),
    }
}

fn pair_as_u32_tuple(v: &PropertyValue, default: (u32, u32)) -> (u32, u32) {
    match v {
        PropertyValue::List(items) if items.len() == 2 => {
            let a = as_i64(&items[0]).unwrap_or(default.0 as i64) as u32;
            let b = as_i64(&items[1]).unwrap_or(default.1 as i64) as u32;
            (a, b)
        }
        _ => default,
    }
}

fn pair_as_f32_tuple(v: &PropertyValue, default: (f32, f32)) -> (f32, f32) {
    match v {
        PropertyValue::List(items) if items.len() == 2 => {
            let a = as_f64(&items[0]).unwrap_or(default.0 as f64) as f32;
            let b = as_f64(&items[1]).unwrap_or(default.1 as f64) as f32;
            (a, b)
        }
        _ => default,
    }
}

fn pair_as_u16_tuple(v: &PropertyValue, default: (u16, u16)) -> (u16, u16) {
    let (a, b) = pair_as_u32_tuple(v, (default.0 as u32, default.1 as u32));
    (a as u16, b as u16)
}

fn as_f64(v: &PropertyValue) -> Option<f64> {
    match v {
        PropertyValue::Int(n) => Some(*n as f64),
        PropertyValue::Float(f) => Some(*f),
        _ => None,
    }
}

fn as_i64(v: &PropertyValue) -> Option<i64> {
    match v {
        PropertyValue::Int(n) => Some(*n),
        PropertyValue::Float(f) => Some(*f as i64),
        _ => None,
    }
}

fn parse_classifier_props(
    m: &HashMap<String, PropertyValue>,
) -> Result<ClassifierProps, PipelineError> {
    let defaults = ClassifierProps::default();
    let min_object_size = m
        .get("minObjectSize")
        .map(|v| pair_as_u32_tuple(v, defaults.min_object_size))
        .unwrap_or(defaults.min_object_size);
    let max_object_size = m
        .get("maxObjectSize")
        .map(|v| pair_as_u32_tuple(v, defaults.max_object_size))
        .unwrap_or(defaults.max_object_size);

    Ok(ClassifierProps {
        min_object_size,
        max_object_size,
        scale_factor: map_get_float(m, "scaleFactor", defaults.scale_factor),
        min_neighbors: map_get_int(m, "minNeighbors", defaults.min_neighbors as i64) as i32,
        min_level: map_get_float(m, "minLevel", defaults.min_level),
    })
}

fn parse_video_show_props(
    m: &HashMap<String, PropertyValue>,
) -> Result<VideoShowProps, PipelineError> {
    let defaults = VideoShowProps::default();
    let time_color = m
        .get("timeColor")
        .map(|v| match v {
            PropertyValue::List(items) if items.len() == 3 => (
                as_i64(&items[0]).unwrap_or(255) as u8,
                as_i64(&items[1]).unwrap_or(255) as u8,
                as_i64(&items[2]).unwrap_or(255) as u8,
            ),
            _ => defaults.time_color,
        })
        .unwrap_or(defaults.time_color);

    Ok(VideoShowProps {
        window_name: map_get_str(m, "windowName", &defaults.window_name),
        clip_capture_dir: PathBuf::from(map_get_str(
            m,
            "clipCaptureDir",
            defaults.clip_capture_dir.to_string_lossy().as_ref(),
        )),
        show_time: map_get_bool(m, "showTime", defaults.show_time),
        show_output: map_get_bool(m, "showOutput", defaults.show_output),
        time_color,
        time_thickness: map_get_int(m, "timeThickness", defaults.time_thickness as i64) as i32,
    })
}

fn parse_processing_props(
    m: &HashMap<String, PropertyValue>,
) -> Result<ProcessingProps, PipelineError> {
    let defaults = ProcessingProps::default();
    let dims = |key: &str| -> Option<(u32, u32)> {
        m.get(key).map(|v| pair_as_u32_tuple(v, (0, 0)))
    };

    Ok(ProcessingProps {
        threads: map_get_int(m, "threads", defaults.threads as i64) as usize,
        frame_dims: dims("frameDims"),
        process_dims: dims("processDims"),
        finish_dims: dims("finishDims"),
    })
}

fn parse_pan_tilt_props(m: &HashMap<String, PropertyValue>) -> PanTiltProps {
    let defaults = PanTiltProps::default();

    PanTiltProps {
        port: map_get_str(m, "port", &defaults.port),
        baud: map_get_int(m, "baud", defaults.baud as i64) as u32,
        min_us: m.get("minUs").map(|v| pair_as_u32_tuple(v, defaults.min_us)).unwrap_or(defaults.min_us),
        max_us: m.get("maxUs").map(|v| pair_as_u32_tuple(v, defaults.max_us)).unwrap_or(defaults.max_us),
        home_us: m.get("homeUs").map(|v| pair_as_u32_tuple(v, defaults.home_us)).unwrap_or(defaults.home_us),
        range_degrees: m
            .get("rangeDegrees")
            .map(|v| pair_as_f32_tuple(v, defaults.range_degrees))
            .unwrap_or(defaults.range_degrees),
        cruise_speed: m
            .get("cruiseSpeed")
            .map(|v| pair_as_u16_tuple(v, defaults.cruise_speed))
            .unwrap_or(defaults.cruise_speed),
        calibration_speed: map_get_int(m, "calibrationSpeed", defaults.calibration_speed as i64) as u16,
        acceleration: map_get_int(m, "acceleration", defaults.acceleration as i64) as u16,
        horiz_slack: map_get_float(m, "horizSlack", defaults.horiz_slack),
        vert_slack: map_get_float(m, "vertSlack", defaults.vert_slack),
        calibration_file: match m.get("calibrationFile") {
            Some(PropertyValue::Str(s)) => Some(PathBuf::from(s)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> HashMap<String, PropertyValue> {
        let text = concat!(
            "queueSize=64\n",
            "skipFrameSize=300\n",
            "classifierFile=/tmp/model.xml\n",
            "sourceFile=/tmp/clip.mp4\n",
            "logLevel=DEBUG\n",
            "classifierProps={minObjectSize:[18,18],minLevel:2.0}\n",
            "# a comment line\n",
            "\n",
        );
        parse::parse_property_file(text).unwrap()
    }

    #[test]
    fn loads_required_keys_and_defaults() {
        let cfg = Config::from_raw(sample_raw(), &CliOverrides::default()).unwrap();
        assert_eq!(cfg.queue_size, 64);
        assert_eq!(cfg.skip_frame_size, 300);
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.classifier_props.min_level, 2.0);
        assert_eq!(cfg.processing_props.threads, 5);
    }

    #[test]
    fn missing_required_key_is_config_missing() {
        let mut raw = sample_raw();
        raw.remove("queueSize");
        let err = Config::from_raw(raw, &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigMissing(k) if k == "queueSize"));
    }

    #[test]
    fn wrong_type_is_config_type() {
        let mut raw = sample_raw();
        raw.insert("queueSize".to_string(), PropertyValue::Str("oops".into()));
        let err = Config::from_raw(raw, &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigType { key, .. } if key == "queueSize"));
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let overrides = CliOverrides {
            source_file: Some(PathBuf::from("/override/clip.mp4")),
            skip_frames: Some(7),
            ..Default::default()
        };
        let cfg = Config::from_raw(sample_raw(), &overrides).unwrap();
        assert_eq!(cfg.source_file, PathBuf::from("/override/clip.mp4"));
        assert_eq!(cfg.skip_frame_size, 7);
    }
}
