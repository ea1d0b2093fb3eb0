//! `vesc-hal` – frame codec, velocity scaling and bus sinks.
//!
//! # Modules
//!
//! - [`frame`] – fixed 18-byte `cansend` frames and the hex field encoder.
//! - [`scaler`] – [`ScalingConfig`][scaler::ScalingConfig] and the pure
//!   velocity → throttle/steering transform.
//! - [`sink`] – the [`FrameSink`][sink::FrameSink] transmit trait plus log and
//!   recording sinks.
//! - [`can_socket`] – `cansend`-style frame parsing and, on Linux,
//!   `SocketCanSink`, which writes to a real CAN interface.

pub mod can_socket;
pub mod frame;
pub mod scaler;
pub mod sink;

#[cfg(target_os = "linux")]
pub use can_socket::SocketCanSink;
pub use can_socket::{DEFAULT_WRITE_TIMEOUT, RawCanFrame, parse_cansend};
pub use frame::{CommandFrame, build_steering_frame, build_throttle_frame, encode_hex};
pub use scaler::{ScalingConfig, scale};
pub use sink::{FrameSink, LogSink, RecordingSink};
