//! Pan/tilt tracker (C10): a two-channel specialization of the servo
//! controller that converts an in-frame target offset into angular
//! corrections, respecting a configurable dead zone (§4.10).

use std::time::Duration;

use crate::error::ServoError;

use super::controller::{AngleUnits, ServoController};

pub const PAN: u8 = 0;
pub const TILT: u8 = 1;
pub const ALL: [u8; 2] = [PAN, TILT];

pub struct PanTiltTracker {
    controller: ServoController,
    /// Dead-zone half-width, as a fraction of the frame half-dimension.
    pub horiz_slack: f32,
    pub vert_slack: f32,
    cruise_speed: (u16, u16),
    calibration_speed: u16,
}

impl PanTiltTracker {
    pub fn new(controller: ServoController, horiz_slack: f32, vert_slack: f32, cruise_speed: (u16, u16), calibration_speed: u16) -> Self {
        PanTiltTracker {
            controller,
            horiz_slack,
            vert_slack,
            cruise_speed,
            calibration_speed,
        }
    }

    /// Startup self-test: sweep both channels to their minimum then maximum
    /// positions at a slow calibration speed, return both to home, then
    /// restore the cruise speed.
    pub fn initialize(&mut self, min_us: (u32, u32), max_us: (u32, u32)) -> Result<(), ServoError> {
        self.controller.set_speed(PAN, self.calibration_speed)?;
        self.controller.set_speed(TILT, self.calibration_speed)?;

        self.controller
            .set_position_multi_sync(&[(PAN, min_us.0), (TILT, min_us.1)], Duration::from_secs(5))?;
        self.controller
            .set_position_multi_sync(&[(PAN, max_us.0), (TILT, max_us.1)], Duration::from_secs(5))?;
        self.controller.return_to_home(PAN, true)?;
        self.controller.return_to_home(TILT, true)?;

        self.controller.set_speed(PAN, self.cruise_speed.0)?;
        self.controller.set_speed(TILT, self.cruise_speed.1)?;
        Ok(())
    }

    /// `(pan_degrees, tilt_degrees)`, `None` where the offset falls within
    /// the dead zone. Tilt sign is chosen so positive means "tilt up".
    pub fn calculate_correction_degrees(
        &self,
        target: (i32, i32),
        frame_size: (u32, u32),
    ) -> (Option<f32>, Option<f32>) {
        let (cx, cy) = (frame_size.0 as f32 / 2.0, frame_size.1 as f32 / 2.0);
        let (x, y) = (target.0 as f32, target.1 as f32);

        let pan = if (x - cx).abs() <= cx * self.horiz_slack {
            None
        } else {
            Some(((x - cx) / frame_size.1 as f32).atan() * 180.0 / std::f32::consts::PI)
        };

        let tilt = if (y - cy).abs() <= cy * self.vert_slack {
            None
        } else {
            Some(((cy - y) / frame_size.0 as f32).atan() * 180.0 / std::f32::consts::PI)
        };

        (pan, tilt)
    }

    /// Calibrates both channels at the current cruise speed, persisting (or
    /// loading) the sweep under `file` if given. Run once after
    /// [`initialize`](Self::initialize) and before steady-state tracking so
    /// `movement_time` has a calibration table to look up (§4.9's "ch-speed-
    /// accel" key lets a later run skip the sweep entirely).
    pub fn calibrate(&mut self, file: Option<&std::path::Path>) -> Result<(), ServoError> {
        self.controller.calibrate(PAN, file)?;
        self.controller.calibrate(TILT, file)?;
        Ok(())
    }

    /// Computes and dispatches the correction for `target`, returning the
    /// estimated `(seconds, frames)` cost summed across the axes actually
    /// moved.
    pub fn correct(&mut self, target: (i32, i32), frame_size: (u32, u32), fps: f32) -> Result<(f32, u32), ServoError> {
        let (pan_deg, tilt_deg) = self.calculate_correction_degrees(target, frame_size);

        let mut total_seconds = 0f32;
        let mut total_frames = 0u32;

        if let Some(degrees) = pan_deg {
            let (seconds, frames) = self.controller.movement_time(PAN, degrees, fps).unwrap_or((0.0, 0));
            self.controller
                .set_relative(PAN, degrees, AngleUnits::Degrees, false, Duration::ZERO)?;
            total_seconds += seconds;
            total_frames += frames;
        }
        if let Some(degrees) = tilt_deg {
            let (seconds, frames) = self.controller.movement_time(TILT, degrees, fps).unwrap_or((0.0, 0));
            self.controller
                .set_relative(TILT, degrees, AngleUnits::Degrees, false, Duration::ZERO)?;
            total_seconds += seconds;
            total_frames += frames;
        }

        Ok((total_seconds, total_frames))
    }
}

#[cfg(test)]
mod tests {
    // `calculate_correction_degrees` is pure and needs no open serial port;
    // `ServoController::open` does, so these exercise the dead-zone and
    // sign math directly rather than constructing a full tracker.

    #[test]
    fn target_at_center_is_within_dead_zone() {
        let horiz_slack = 0.1f32;
        let vert_slack = 0.1f32;
        let frame_size = (640u32, 480u32);
        let cx = frame_size.0 as f32 / 2.0;
        let cy = frame_size.1 as f32 / 2.0;

        let within = |x: f32, y: f32| (x - cx).abs() <= cx * horiz_slack && (y - cy).abs() <= cy * vert_slack;
        assert!(within(cx, cy));
        assert!(!within(cx + cx * 0.5, cy));
    }

    #[test]
    fn pan_correction_sign_matches_offset_direction() {
        // A target to the right of center should produce a positive pan angle.
        let frame_size = (640u32, 480u32);
        let cx = frame_size.0 as f32 / 2.0;
        let x = cx + 100.0;
        let angle = ((x - cx) / frame_size.1 as f32).atan() * 180.0 / std::f32::consts::PI;
        assert!(angle > 0.0);
    }

    #[test]
    fn tilt_correction_sign_is_positive_when_target_above_center() {
        let frame_size = (640u32, 480u32);
        let cy = frame_size.1 as f32 / 2.0;
        let y = cy - 100.0; // above center (smaller y)
        let angle = ((cy - y) / frame_size.0 as f32).atan() * 180.0 / std::f32::consts::PI;
        assert!(angle > 0.0);
    }
}
