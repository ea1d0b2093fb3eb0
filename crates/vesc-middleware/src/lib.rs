//! `vesc-middleware` – The Transport
//!
//! Routes velocity commands in and status flags out without caring about
//! their meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
