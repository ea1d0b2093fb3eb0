use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Which inbound channel a velocity command arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandSource {
    /// Planner / autonomy stack output (`cmd_vel`).
    Autonomous,
    /// Operator command that takes priority over autonomy.
    ManualOverride,
}

/// A linear/angular velocity request, created per inbound message and
/// consumed immediately by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Forward velocity in m/s.
    pub linear_x: f64,
    /// Yaw rate / steering request in rad.
    pub angular_z: f64,
    pub source: CommandSource,
}

impl VelocityCommand {
    pub fn autonomous(linear_x: f64, angular_z: f64) -> Self {
        Self {
            linear_x,
            angular_z,
            source: CommandSource::Autonomous,
        }
    }

    pub fn manual_override(linear_x: f64, angular_z: f64) -> Self {
        Self {
            linear_x,
            angular_z,
            source: CommandSource::ManualOverride,
        }
    }
}

/// Bus-unit integers produced by the scaler.
///
/// `steering` is always within the configured servo bounds; `throttle` is not
/// clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScaledCommand {
    pub throttle: i32,
    pub steering: i32,
}

/// Selects which motor-controller register a frame addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    /// Motor RPM command.
    Throttle,
    /// Steering servo position command.
    Steering,
}

impl CommandKind {
    /// The two-character command-kind code carried in bytes 4–5 of a frame.
    pub fn code(self) -> &'static str {
        match self {
            CommandKind::Throttle => "03",
            CommandKind::Steering => "3F",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::Throttle => write!(f, "throttle"),
            CommandKind::Steering => write!(f, "steering"),
        }
    }
}

/// Response to an arm-toggle request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmToggleResponse {
    pub previous_armed: bool,
    /// `"Was armed."` or `"Was disarmed."`.
    pub message: String,
}

impl ArmToggleResponse {
    pub fn from_previous(previous_armed: bool) -> Self {
        let message = if previous_armed {
            "Was armed."
        } else {
            "Was disarmed."
        };
        Self {
            previous_armed,
            message: message.to_string(),
        }
    }
}

/// Unified event wrapper for the in-process topic bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "vesc-runtime::status"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Command(VelocityCommand),
    ArmStatus(bool),
    OverrideStatus(bool),
    TransmitFault { kind: CommandKind, message: String },
}

/// Global error type spanning configuration, bus transmission and transport
/// failures.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum VescError {
    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Transmit Error on {kind} frame: {details}")]
    Transmit { kind: CommandKind, details: String },

    #[error("Channel Error: {0}")]
    Channel(String),

    /// Frame text that does not read back as a CAN frame.
    #[error("Serialization Error: {0}")]
    Serialization(String),
}
