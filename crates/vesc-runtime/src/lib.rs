//! `vesc-runtime` – The Node
//!
//! Runs the command link: listens for velocity commands on the bus, feeds them
//! through the dispatcher, and broadcasts gate status on a timer.
//!
//! # Modules
//!
//! - [`node`] – [`VescNode`][node::VescNode]: one listener task per inbound
//!   command topic, the periodic status broadcaster, and the arm-toggle
//!   service.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter. Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable trace export.

pub mod node;
pub mod telemetry;

pub use node::{NodeConfig, NodeHandle, VescNode};
pub use telemetry::{LogFormat, TelemetryConfig, TelemetryGuard, init_tracing};

// Re-exported so the binary can build a node without depending on every
// lower crate directly.
pub use vesc_kernel::{CommandDispatcher, GatingState};
