//! Servo controller (C9): a serial client speaking the protocol in
//! `protocol.rs` to a USB servo board of up to 6 channels (§4.9).

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::ServoError;

use super::protocol::{decode_position, encode_get_position, encode_set_accel, encode_set_position, encode_set_speed};

pub const MAX_CHANNELS: usize = 6;
pub const CALIBRATION_STEPS: usize = 46;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngleUnits {
    Microseconds,
    Radians,
    Degrees,
}

/// Per-axis servo state (§3). `microseconds_per_degree`/`_per_radian` are
/// derived, not stored.
#[derive(Debug, Clone)]
pub struct ServoProperties {
    pub min_us: u32,
    pub max_us: u32,
    pub home_us: u32,
    pub pos_us: u32,
    pub speed: u16,
    pub acceleration: u16,
    pub range_degrees: f32,
    pub disabled: bool,
    pub calibration: Option<[f32; CALIBRATION_STEPS]>,
}

impl ServoProperties {
    pub fn new(min_us: u32, max_us: u32, home_us: u32, speed: u16, acceleration: u16, range_degrees: f32) -> Self {
        let home_us = home_us.clamp(min_us, max_us);
        ServoProperties {
            min_us,
            max_us,
            home_us,
            pos_us: home_us,
            speed,
            acceleration,
            range_degrees,
            disabled: false,
            calibration: None,
        }
    }

    pub fn microseconds_per_degree(&self) -> f32 {
        (self.max_us - self.min_us) as f32 / self.range_degrees
    }

    pub fn microseconds_per_radian(&self) -> f32 {
        self.microseconds_per_degree() * 180.0 / std::f32::consts::PI
    }
}

pub struct ServoController {
    port: Box<dyn serialport::SerialPort>,
    channels: Vec<ServoProperties>,
}

impl ServoController {
    pub fn open(path: &str, baud: u32, channels: Vec<ServoProperties>) -> Result<Self, ServoError> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_millis(200))
            .open()?;
        Ok(ServoController { port, channels })
    }

    fn channel_props(&self, channel: u8) -> Result<&ServoProperties, ServoError> {
        self.channels
            .get(channel as usize)
            .ok_or(ServoError::InvalidChannel(channel))
    }

    fn channel_props_mut(&mut self, channel: u8) -> Result<&mut ServoProperties, ServoError> {
        self.channels
            .get_mut(channel as usize)
            .ok_or(ServoError::InvalidChannel(channel))
    }

    fn write_frame(&mut self, channel: u8, frame: &[u8]) -> Result<(), ServoError> {
        let wrote = self.port.write(frame)?;
        if wrote != frame.len() {
            return Err(ServoError::ShortWrite { channel, wrote, expected: frame.len() });
        }
        Ok(())
    }

    /// Clamps to `[min,max]` except that `us == 0` passes through (disable
    /// pulse); updates cached `pos_us` only for nonzero commands. Returns
    /// the actually-sent value.
    pub fn set_position(&mut self, channel: u8, us: u32) -> Result<u32, ServoError> {
        let props = self.channel_props(channel)?;
        let sent = if us == 0 { 0 } else { us.clamp(props.min_us, props.max_us) };

        self.write_frame(channel, &encode_set_position(channel, sent))?;

        let props = self.channel_props_mut(channel)?;
        if sent != 0 {
            props.pos_us = sent;
        }
        Ok(sent)
    }

    pub fn get_position(&mut self, channel: u8) -> Result<u32, ServoError> {
        self.channel_props(channel)?;
        self.write_frame(channel, &encode_get_position(channel))?;

        let mut buf = [0u8; 2];
        let read = self.port.read(&mut buf)?;
        if read != 2 {
            return Err(ServoError::ShortRead { channel, read, expected: 2 });
        }
        Ok(decode_position(buf[0], buf[1]))
    }

    pub fn set_speed(&mut self, channel: u8, value: u16) -> Result<(), ServoError> {
        self.channel_props(channel)?;
        self.write_frame(channel, &encode_set_speed(channel, value))?;
        self.channel_props_mut(channel)?.speed = value;
        Ok(())
    }

    pub fn set_acceleration(&mut self, channel: u8, value: u16) -> Result<(), ServoError> {
        self.channel_props(channel)?;
        self.write_frame(channel, &encode_set_accel(channel, value))?;
        self.channel_props_mut(channel)?.acceleration = value;
        Ok(())
    }

    /// Sets, then polls `get_position` every 1ms until equal or `timeout`;
    /// logs (does not fail) on timeout.
    pub fn set_position_sync(&mut self, channel: u8, us: u32, timeout: Duration) -> Result<u32, ServoError> {
        let target = self.set_position(channel, us)?;
        let deadline = Instant::now() + timeout;
        loop {
            let current = self.get_position(channel)?;
            if current == target {
                return Ok(target);
            }
            if Instant::now() >= deadline {
                log::warn!("servo channel {channel} did not reach {target}us within {timeout:?}");
                return Ok(target);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn set_position_multi(&mut self, targets: &[(u8, u32)]) -> Result<Vec<u32>, ServoError> {
        targets.iter().map(|&(ch, us)| self.set_position(ch, us)).collect()
    }

    pub fn set_position_multi_sync(&mut self, targets: &[(u8, u32)], timeout: Duration) -> Result<Vec<u32>, ServoError> {
        let deadline = Instant::now() + timeout;
        let sent: Vec<u32> = targets
            .iter()
            .map(|&(ch, us)| self.set_position(ch, us))
            .collect::<Result<_, _>>()?;

        for (&(ch, _), &target) in targets.iter().zip(sent.iter()) {
            loop {
                let current = self.get_position(ch)?;
                if current == target || Instant::now() >= deadline {
                    if current != target {
                        log::warn!("servo channel {ch} did not reach {target}us within the multi-sync timeout");
                    }
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(sent)
    }

    pub fn set_relative(&mut self, channel: u8, value: f32, units: AngleUnits, sync: bool, timeout: Duration) -> Result<u32, ServoError> {
        let props = self.channel_props(channel)?;
        let delta_us = match units {
            AngleUnits::Microseconds => value,
            AngleUnits::Degrees => value * props.microseconds_per_degree(),
            AngleUnits::Radians => value * props.microseconds_per_radian(),
        };
        let base = props.pos_us as f32;
        let new_us = (base + delta_us).max(0.0) as u32;

        if sync {
            self.set_position_sync(channel, new_us, timeout)
        } else {
            self.set_position(channel, new_us)
        }
    }

    pub fn enable(&mut self, channel: u8) -> Result<(), ServoError> {
        let props = self.channel_props(channel)?.clone();
        self.set_speed(channel, props.speed)?;
        self.set_position(channel, props.pos_us.max(props.min_us))?;
        self.channel_props_mut(channel)?.disabled = false;
        Ok(())
    }

    pub fn disable(&mut self, channel: u8) -> Result<(), ServoError> {
        self.set_position(channel, 0)?;
        self.channel_props_mut(channel)?.disabled = true;
        Ok(())
    }

    pub fn return_to_home(&mut self, channel: u8, sync: bool) -> Result<u32, ServoError> {
        let home = self.channel_props(channel)?.home_us;
        if sync {
            self.set_position_sync(channel, home, Duration::from_secs(3))
        } else {
            self.set_position(channel, home)
        }
    }

    /// Sweeps `0, -1, 2, -3, 4, ..` (46 steps, §4.9), recording per-step
    /// wall-clock elapsed into the calibration table, unless `file` already
    /// has an entry for this channel's `"{ch}-{speed}-{accel}"` key.
    pub fn calibrate(&mut self, channel: u8, file: Option<&Path>) -> Result<[f32; CALIBRATION_STEPS], ServoError> {
        let props = self.channel_props(channel)?.clone();
        let key = format!("{channel}-{}-{}", props.speed, props.acceleration);

        if let Some(path) = file {
            if let Some(existing) = load_calibration_entry(path, &key)? {
                self.channel_props_mut(channel)?.calibration = Some(existing);
                return Ok(existing);
            }
        }

        let mut table = [0f32; CALIBRATION_STEPS];
        let mut current_degrees = 0f32;
        for (i, slot) in table.iter_mut().enumerate() {
            let target = if i % 2 == 0 { i as f32 } else { -(i as f32) };
            let delta = target - current_degrees;
            let start = Instant::now();
            self.set_relative(channel, delta, AngleUnits::Degrees, true, Duration::from_secs(2))?;
            *slot = start.elapsed().as_secs_f32();
            current_degrees = target;
        }

        self.channel_props_mut(channel)?.calibration = Some(table);
        if let Some(path) = file {
            persist_calibration_entry(path, &key, &table)?;
        }
        Ok(table)
    }

    /// `calibration[ceil(|degrees|)]` (clamped to 45) times `fps`.
    pub fn movement_time(&self, channel: u8, degrees: f32, fps: f32) -> Result<(f32, u32), ServoError> {
        let props = self.channel_props(channel)?;
        let calibration = props.calibration.ok_or(ServoError::InvalidChannel(channel))?;
        let index = (degrees.abs().ceil() as usize).min(CALIBRATION_STEPS - 1);
        let seconds = calibration[index];
        Ok((seconds, (seconds * fps).round() as u32))
    }

    /// Closes the port, guaranteeing every enabled channel is disabled
    /// (commanded to pos=0) first.
    pub fn close(mut self) -> Result<(), ServoError> {
        let channels: Vec<u8> = (0..self.channels.len() as u8).collect();
        for ch in channels {
            if !self.channel_props(ch)?.disabled {
                self.disable(ch)?;
            }
        }
        Ok(())
    }
}

fn load_calibration_entry(path: &Path, key: &str) -> Result<Option<[f32; CALIBRATION_STEPS]>, ServoError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).map_err(|e| ServoError::CalibrationFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let map: HashMap<String, Vec<f32>> = serde_json::from_str(&text).map_err(|e| ServoError::CalibrationFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    match map.get(key) {
        Some(values) if values.len() == CALIBRATION_STEPS => {
            let mut table = [0f32; CALIBRATION_STEPS];
            table.copy_from_slice(values);
            Ok(Some(table))
        }
        _ => Ok(None),
    }
}

fn persist_calibration_entry(path: &Path, key: &str, table: &[f32; CALIBRATION_STEPS]) -> Result<(), ServoError> {
    let mut map: HashMap<String, Vec<f32>> = if path.exists() {
        let text = std::fs::read_to_string(path).map_err(|e| ServoError::CalibrationFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).unwrap_or_default()
    } else {
        HashMap::new()
    };
    map.insert(key.to_string(), table.to_vec());
    let text = serde_json::to_string_pretty(&map).map_err(|e| ServoError::CalibrationFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    std::fs::write(path, text).map_err(|e| ServoError::CalibrationFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
