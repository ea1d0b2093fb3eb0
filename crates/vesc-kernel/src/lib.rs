//! `vesc-kernel` – Gating & Dispatch
//!
//! Decides whether a velocity command may reach the bus, and if so turns it
//! into frames.
//!
//! # Modules
//!
//! - [`gating_state`] – [`GatingState`][gating_state::GatingState]:
//!   the armed and manual-override flags behind a single lock, with
//!   time-based override expiry.
//! - [`dispatcher`] – [`CommandDispatcher`][dispatcher::CommandDispatcher]:
//!   the single path from a [`VelocityCommand`][vesc_types::VelocityCommand]
//!   to a [`FrameSink`][vesc_hal::FrameSink]. Applies the authority and safety
//!   gates, scales, encodes and transmits steering then throttle.

pub mod dispatcher;
pub mod gating_state;

pub use dispatcher::{
    CommandDispatcher, DispatchCounters, Disposition, SuppressReason, TransmitReport,
};
pub use gating_state::{GateSnapshot, GatingState};
