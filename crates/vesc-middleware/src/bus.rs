//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Direction | Traffic |
//! |---|---|---|
//! | [`Topic::AutonomousCommand`] | inbound | planner velocity commands (`cmd_vel`) |
//! | [`Topic::ManualOverride`] | inbound | operator velocity commands |
//! | [`Topic::ArmStatus`] | outbound | armed flag, every status tick |
//! | [`Topic::OverrideStatus`] | outbound | override flag, every status tick |
//! | [`Topic::Faults`] | outbound | dropped frames and other transmit faults |

use tokio::sync::broadcast;
use vesc_types::{Event, EventPayload, VelocityCommand, VescError};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Velocity commands from the autonomy stack.
    AutonomousCommand,
    /// Velocity commands from the operator; always take priority.
    ManualOverride,
    /// Periodic armed-status broadcast.
    ArmStatus,
    /// Periodic manual-override-status broadcast.
    OverrideStatus,
    /// Transmit failures reported by the dispatcher.
    Faults,
}

impl Topic {
    /// Conventional `low_level_control/...` topic name.
    pub fn name(self) -> &'static str {
        match self {
            Topic::AutonomousCommand => "low_level_control/cmd_vel",
            Topic::ManualOverride => "low_level_control/manual_override",
            Topic::ArmStatus => "low_level_control/arm_status",
            Topic::OverrideStatus => "low_level_control/manual_override_status",
            Topic::Faults => "low_level_control/faults",
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    autonomous_command: broadcast::Sender<Event>,
    manual_override: broadcast::Sender<Event>,
    arm_status: broadcast::Sender<Event>,
    override_status: broadcast::Sender<Event>,
    faults: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (autonomous_command, _) = broadcast::channel(capacity);
        let (manual_override, _) = broadcast::channel(capacity);
        let (arm_status, _) = broadcast::channel(capacity);
        let (override_status, _) = broadcast::channel(capacity);
        let (faults, _) = broadcast::channel(capacity);
        Self {
            autonomous_command,
            manual_override,
            arm_status,
            override_status,
            faults,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    ///
    /// # Errors
    ///
    /// [`VescError::Channel`] when nobody is subscribed to the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, VescError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| VescError::Channel(format!("No subscribers for topic {}", topic.name())))
    }

    /// Publish a velocity command on the topic matching its source.
    pub fn publish_command(
        &self,
        source: impl Into<String>,
        cmd: VelocityCommand,
    ) -> Result<usize, VescError> {
        let topic = match cmd.source {
            vesc_types::CommandSource::Autonomous => Topic::AutonomousCommand,
            vesc_types::CommandSource::ManualOverride => Topic::ManualOverride,
        };
        self.publish_to(topic, Event::new(source, EventPayload::Command(cmd)))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::AutonomousCommand => &self.autonomous_command,
            Topic::ManualOverride => &self.manual_override,
            Topic::ArmStatus => &self.arm_status,
            Topic::OverrideStatus => &self.override_status,
            Topic::Faults => &self.faults,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_event(armed: bool) -> Event {
        Event::new("vesc-middleware::test", EventPayload::ArmStatus(armed))
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::ArmStatus, status_event(true));
        assert!(matches!(result, Err(VescError::Channel(_))));
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::ArmStatus);
        let mut subscriber2 = bus.subscribe_to(Topic::ArmStatus);

        let event = status_event(false);
        assert_eq!(bus.publish_to(Topic::ArmStatus, event.clone())?, 2);

        assert_eq!(subscriber1.recv().await?.id, event.id);
        assert_eq!(subscriber2.recv().await?.id, event.id);
        assert_eq!(subscriber1.topic(), Topic::ArmStatus);
        Ok(())
    }

    #[tokio::test]
    async fn publish_command_routes_by_source() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut autonomous = bus.subscribe_to(Topic::AutonomousCommand);
        let mut manual = bus.subscribe_to(Topic::ManualOverride);

        bus.publish_command("test", VelocityCommand::manual_override(0.5, 0.1))?;

        let event = manual.recv().await?;
        match event.payload {
            EventPayload::Command(cmd) => assert_eq!(cmd, VelocityCommand::manual_override(0.5, 0.1)),
            other => panic!("unexpected payload {other:?}"),
        }

        let nothing =
            tokio::time::timeout(std::time::Duration::from_millis(50), autonomous.recv()).await;
        assert!(nothing.is_err(), "autonomous topic must not see override traffic");
        Ok(())
    }

    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut override_sub = bus.subscribe_to(Topic::OverrideStatus);
        let _arm_sub = bus.subscribe_to(Topic::ArmStatus);

        bus.publish_to(Topic::ArmStatus, status_event(true))?;

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            override_sub.recv(),
        )
        .await;
        assert!(result.is_err(), "OverrideStatus subscriber must not receive an ArmStatus event");
        Ok(())
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(Topic::Faults), 0);
        let rx = bus.subscribe_to(Topic::Faults);
        assert_eq!(bus.subscriber_count(Topic::Faults), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(Topic::Faults), 0);
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        let bus = EventBus::new(16);
        let mut slow_sub = bus.subscribe_to(Topic::AutonomousCommand);

        for _ in 0..1_000 {
            let _ = bus.publish_command("flood", VelocityCommand::autonomous(1.0, 0.0));
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
