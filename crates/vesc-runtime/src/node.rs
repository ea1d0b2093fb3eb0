//! [`VescNode`] – wires the dispatcher to the event bus.
//!
//! A running node owns two kinds of Tokio task:
//!
//! - one **command listener** per inbound topic
//!   ([`Topic::AutonomousCommand`], [`Topic::ManualOverride`]). Each listener
//!   runs the synchronous dispatcher on the blocking pool and awaits it before
//!   taking the next message, so frames from one channel never reorder.
//! - the **status broadcaster**, which publishes the armed and override flags
//!   on [`Topic::ArmStatus`] / [`Topic::OverrideStatus`] every
//!   `status_period`.
//!
//! The arm-toggle service is a plain call, [`VescNode::toggle_arm`], because
//! it only touches [`GatingState`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};
use vesc_kernel::{CommandDispatcher, Disposition, GateSnapshot, GatingState};
use vesc_middleware::{EventBus, Topic, TopicReceiver};
use vesc_types::{ArmToggleResponse, CommandSource, Event, EventPayload, VescError};

/// Source tag stamped on every event this node publishes.
pub const NODE_SOURCE: &str = "vesc-runtime::node";

/// Default status broadcast period.
pub const DEFAULT_STATUS_PERIOD: Duration = Duration::from_millis(500);

/// Runtime knobs for [`VescNode`].
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Interval between status broadcasts. Must be non-zero.
    pub status_period: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            status_period: DEFAULT_STATUS_PERIOD,
        }
    }
}

impl NodeConfig {
    /// # Errors
    ///
    /// [`VescError::Configuration`] when `status_period` is zero.
    pub fn validate(&self) -> Result<(), VescError> {
        if self.status_period.is_zero() {
            return Err(VescError::Configuration(
                "status_period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// The command-link node: dispatcher + bus + status timer.
pub struct VescNode {
    dispatcher: Arc<CommandDispatcher>,
    bus: EventBus,
    config: NodeConfig,
}

impl VescNode {
    /// # Errors
    ///
    /// [`VescError::Configuration`] if `config` fails validation.
    pub fn new(
        dispatcher: CommandDispatcher,
        bus: EventBus,
        config: NodeConfig,
    ) -> Result<Self, VescError> {
        config.validate()?;
        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            bus,
            config,
        })
    }

    /// Return a clone of the [`EventBus`] so callers can publish commands and
    /// subscribe to status.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn gate(&self) -> Arc<GatingState> {
        Arc::clone(self.dispatcher.gate())
    }

    pub fn dispatcher(&self) -> Arc<CommandDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Arm-toggle service: flip the armed flag and describe its previous state.
    pub fn toggle_arm(&self) -> ArmToggleResponse {
        let previous = self.dispatcher.gate().toggle_armed();
        ArmToggleResponse::from_previous(previous)
    }

    /// Publish one round of status, exactly as a timer tick would.
    pub fn publish_status(&self) -> GateSnapshot {
        publish_status(self.dispatcher.gate(), &self.bus)
    }

    /// Start the listeners and the status broadcaster on the current Tokio
    /// runtime.
    ///
    /// Inbound topics are subscribed before this returns, so commands
    /// published afterwards are never missed.
    pub fn spawn(&self) -> NodeHandle {
        let mut tasks = Vec::with_capacity(3);

        for (topic, source) in [
            (Topic::AutonomousCommand, CommandSource::Autonomous),
            (Topic::ManualOverride, CommandSource::ManualOverride),
        ] {
            let rx = self.bus.subscribe_to(topic);
            tasks.push(tokio::spawn(run_command_listener(
                rx,
                source,
                Arc::clone(&self.dispatcher),
                self.bus.clone(),
            )));
        }

        tasks.push(tokio::spawn(run_status_broadcaster(
            Arc::clone(self.dispatcher.gate()),
            self.bus.clone(),
            self.config.status_period,
        )));

        info!(
            sink = %self.dispatcher.sink_id(),
            status_period_ms = self.config.status_period.as_millis() as u64,
            "vesc node started"
        );
        NodeHandle { tasks }
    }
}

/// Handle to the tasks started by [`VescNode::spawn`]. Dropping it stops them.
pub struct NodeHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    /// Abort every node task and wait for them to finish.
    pub async fn shutdown(mut self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks.drain(..) {
            // Cancellation is the expected outcome here.
            let _ = task.await;
        }
        info!("vesc node stopped");
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn run_command_listener(
    mut rx: TopicReceiver,
    source: CommandSource,
    dispatcher: Arc<CommandDispatcher>,
    bus: EventBus,
) {
    let topic = rx.topic();
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                warn!(topic = topic.name(), lagged_by = n, "command listener lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let EventPayload::Command(cmd) = event.payload else {
            debug!(topic = topic.name(), "ignoring non-command event");
            continue;
        };
        // The channel, not the payload, decides the command's authority.
        let cmd = vesc_types::VelocityCommand { source, ..cmd };

        let worker = Arc::clone(&dispatcher);
        match tokio::task::spawn_blocking(move || worker.handle_command(cmd)).await {
            Ok(disposition) => report_disposition(&bus, disposition),
            Err(e) => error!(topic = topic.name(), error = %e, "dispatcher task failed"),
        }
    }
    debug!(topic = topic.name(), "command listener exiting, bus closed");
}

fn report_disposition(bus: &EventBus, disposition: Disposition) {
    match disposition {
        Disposition::Suppressed(reason) => trace!(?reason, "command suppressed"),
        Disposition::Transmitted(report) => {
            for err in report.failures() {
                if let VescError::Transmit { kind, .. } = err {
                    let fault = Event::new(
                        NODE_SOURCE,
                        EventPayload::TransmitFault {
                            kind: *kind,
                            message: err.to_string(),
                        },
                    );
                    // Nobody listening for faults is fine; the dispatcher already logged it.
                    let _ = bus.publish_to(Topic::Faults, fault);
                }
            }
        }
    }
}

async fn run_status_broadcaster(gate: Arc<GatingState>, bus: EventBus, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        publish_status(&gate, &bus);
    }
}

fn publish_status(gate: &GatingState, bus: &EventBus) -> GateSnapshot {
    let snapshot = gate.snapshot();
    trace!(
        armed = snapshot.armed,
        override_engaged = snapshot.override_engaged,
        "status tick"
    );
    for (topic, payload) in [
        (Topic::ArmStatus, EventPayload::ArmStatus(snapshot.armed)),
        (
            Topic::OverrideStatus,
            EventPayload::OverrideStatus(snapshot.override_engaged),
        ),
    ] {
        if let Err(e) = bus.publish_to(topic, Event::new(NODE_SOURCE, payload)) {
            trace!(topic = topic.name(), error = %e, "status not delivered");
        }
    }
    snapshot
}
