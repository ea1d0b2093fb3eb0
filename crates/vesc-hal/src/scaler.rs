//! Velocity → bus-unit scaling.
//!
//! [`scale`] maps a `(linear_x, angular_z)` pair onto the two integers the
//! VESC expects:
//!
//! - **steering**: `angular_z` is normalised over
//!   `[-max_steering_angle, +max_steering_angle]` into `[1, 0]`, multiplied by
//!   `servo_scale`, offset by `servo_bias` and clamped to the servo bounds.
//! - **throttle**: `linear_x * rpm_scale`, rounded and left unclamped.
//!
//! A [`ScalingConfig`] is validated once by [`ScalingConfig::validate`]; after
//! that every finite input produces a defined output.

use serde::{Deserialize, Serialize};
use tracing::trace;
use vesc_types::{ScaledCommand, VescError};

/// Immutable scaling parameters shared by every command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Steering angle (rad) that maps to the servo's travel limit.
    pub max_steering_angle: f64,
    pub servo_scale: i32,
    pub servo_bias: i32,
    pub servo_lower_bound: i32,
    pub servo_upper_bound: i32,
    /// ERPM per m/s.
    pub rpm_scale: f64,
    pub invert_throttle: bool,
    pub invert_steering: bool,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            max_steering_angle: 0.524,
            servo_scale: 900,
            servo_bias: 50,
            servo_lower_bound: 50,
            servo_upper_bound: 950,
            rpm_scale: 8000.0,
            invert_throttle: false,
            invert_steering: false,
        }
    }
}

impl ScalingConfig {
    /// Reject parameter sets that would make [`scale`] ill-defined.
    ///
    /// # Errors
    ///
    /// [`VescError::Configuration`] when `max_steering_angle` is zero,
    /// negative or not finite, when `rpm_scale` is not finite, or when the
    /// servo bounds are inverted.
    pub fn validate(&self) -> Result<(), VescError> {
        if !self.max_steering_angle.is_finite() || self.max_steering_angle <= 0.0 {
            return Err(VescError::Configuration(format!(
                "max_steering_angle must be a positive finite number, got {}",
                self.max_steering_angle
            )));
        }
        if !self.rpm_scale.is_finite() {
            return Err(VescError::Configuration(format!(
                "rpm_scale must be finite, got {}",
                self.rpm_scale
            )));
        }
        if self.servo_lower_bound > self.servo_upper_bound {
            return Err(VescError::Configuration(format!(
                "servo_lower_bound {} exceeds servo_upper_bound {}",
                self.servo_lower_bound, self.servo_upper_bound
            )));
        }
        Ok(())
    }

    /// Map `angular_z` into `[0, 1]`, `0.5` being straight ahead.
    ///
    /// Positive (left) angles produce values below `0.5`.
    pub fn normalize_steering(&self, angular_z: f64) -> f64 {
        let angular = if self.invert_steering { -angular_z } else { angular_z };
        (-angular + self.max_steering_angle) / (2.0 * self.max_steering_angle)
    }
}

/// Scale a velocity pair into throttle and steering bus units.
///
/// `cfg` is assumed to have passed [`ScalingConfig::validate`].
/// Float-to-integer conversions saturate at the `i32` range.
pub fn scale(linear_x: f64, angular_z: f64, cfg: &ScalingConfig) -> ScaledCommand {
    let normalized = cfg.normalize_steering(angular_z);
    let raw_steering = ((normalized * f64::from(cfg.servo_scale)).round() as i32)
        .saturating_add(cfg.servo_bias);
    let steering = raw_steering.clamp(cfg.servo_lower_bound, cfg.servo_upper_bound);

    let mut throttle = (linear_x * cfg.rpm_scale).round() as i32;
    if cfg.invert_throttle {
        throttle = throttle.saturating_neg();
    }

    trace!(
        linear_x,
        angular_z,
        normalized,
        raw_steering,
        steering,
        throttle,
        "scaled velocity command"
    );

    ScaledCommand { throttle, steering }
}
