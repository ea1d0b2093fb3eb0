//! [`CommandDispatcher`] – single interception point between inbound velocity
//! commands and the frame sink.
//!
//! Every [`VelocityCommand`] passes through [`CommandDispatcher::handle_command`],
//! which applies **two independent gates** in order:
//!
//! 1. **Authority gate**: autonomous commands are dropped while manual
//!    override is engaged. Override commands always pass and refresh the
//!    override window.
//! 2. **Safety gate**: after scaling, nothing is transmitted while disarmed.
//!
//! When both gates pass, the steering frame is transmitted and then the
//! throttle frame, as two separate sink calls made outside any lock. A failed
//! transmit is logged and counted; the other frame is still attempted and
//! nothing is retried.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vesc_hal::{RecordingSink, ScalingConfig};
//! use vesc_kernel::{CommandDispatcher, Disposition, GatingState};
//! use vesc_types::VelocityCommand;
//!
//! let sink = Arc::new(RecordingSink::new());
//! let gate = Arc::new(GatingState::default());
//! let dispatcher =
//!     CommandDispatcher::new(gate.clone(), ScalingConfig::default(), sink.clone()).unwrap();
//!
//! let outcome = dispatcher.handle_command(VelocityCommand::autonomous(2.0, 0.0));
//! assert!(matches!(outcome, Disposition::Transmitted(_)));
//! assert_eq!(sink.frames()[0].payload(), "000001F4");
//! assert_eq!(sink.frames()[1].payload(), "00003E80");
//!
//! // Disarmed → nothing reaches the sink.
//! gate.toggle_armed();
//! dispatcher.handle_command(VelocityCommand::autonomous(2.0, 0.0));
//! assert_eq!(sink.len(), 2);
//! ```

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};
use vesc_hal::frame::{build_steering_frame, build_throttle_frame};
use vesc_hal::scaler::{ScalingConfig, scale};
use vesc_hal::sink::FrameSink;
use vesc_types::{CommandSource, ScaledCommand, VelocityCommand, VescError};

use crate::gating_state::GatingState;

/// Minimum spacing between "override engaged" warnings.
const SUPPRESSION_WARN_PERIOD: Duration = Duration::from_secs(5);

/// Why a command produced no frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Autonomous command while manual override is engaged.
    OverrideEngaged,
    /// The vehicle is disarmed; `intended` is what would have been sent.
    Disarmed { intended: ScaledCommand },
}

/// Per-frame outcome of a command that passed both gates.
#[derive(Debug)]
pub struct TransmitReport {
    pub command: ScaledCommand,
    pub steering: Result<(), VescError>,
    pub throttle: Result<(), VescError>,
}

impl TransmitReport {
    /// `true` when both frames were accepted by the sink.
    pub fn is_complete(&self) -> bool {
        self.steering.is_ok() && self.throttle.is_ok()
    }

    /// Errors for the frames that were not accepted, steering first.
    pub fn failures(&self) -> impl Iterator<Item = &VescError> {
        [&self.steering, &self.throttle]
            .into_iter()
            .filter_map(|r| r.as_ref().err())
    }
}

/// What [`CommandDispatcher::handle_command`] did with one command.
///
/// Diagnostics only; there is no acknowledgment back to the command's sender.
#[derive(Debug)]
pub enum Disposition {
    Suppressed(SuppressReason),
    Transmitted(TransmitReport),
}

/// Monotonic dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchCounters {
    pub transmitted_frames: u64,
    pub transmit_failures: u64,
    pub suppressed_disarmed: u64,
    pub suppressed_override: u64,
}

#[derive(Default)]
struct AtomicCounters {
    transmitted_frames: AtomicU64,
    transmit_failures: AtomicU64,
    suppressed_disarmed: AtomicU64,
    suppressed_override: AtomicU64,
}

/// Gates, scales, encodes and transmits velocity commands.
pub struct CommandDispatcher {
    gate: Arc<GatingState>,
    scaling: ScalingConfig,
    sink: Arc<dyn FrameSink>,
    counters: AtomicCounters,
    override_warn: DefaultDirectRateLimiter,
}

impl CommandDispatcher {
    /// Build a dispatcher around shared gating state and a transmit sink.
    ///
    /// # Errors
    ///
    /// [`VescError::Configuration`] if `scaling` fails validation.
    pub fn new(
        gate: Arc<GatingState>,
        scaling: ScalingConfig,
        sink: Arc<dyn FrameSink>,
    ) -> Result<Self, VescError> {
        scaling.validate()?;
        let quota = Quota::with_period(SUPPRESSION_WARN_PERIOD)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Ok(Self {
            gate,
            scaling,
            sink,
            counters: AtomicCounters::default(),
            override_warn: RateLimiter::direct(quota),
        })
    }

    pub fn gate(&self) -> &Arc<GatingState> {
        &self.gate
    }

    pub fn scaling(&self) -> &ScalingConfig {
        &self.scaling
    }

    pub fn sink_id(&self) -> &str {
        self.sink.id()
    }

    /// Process one command as of the current time.
    pub fn handle_command(&self, cmd: VelocityCommand) -> Disposition {
        self.handle_command_at(cmd, Instant::now())
    }

    /// Process one command, evaluating override expiry against `now`.
    pub fn handle_command_at(&self, cmd: VelocityCommand, now: Instant) -> Disposition {
        match cmd.source {
            CommandSource::ManualOverride => self.gate.record_override_at(now),
            CommandSource::Autonomous => {
                if self.gate.snapshot_at(now).override_engaged {
                    self.counters
                        .suppressed_override
                        .fetch_add(1, Ordering::Relaxed);
                    if self.override_warn.check().is_ok() {
                        warn!("autonomous command ignored, manual override engaged");
                    }
                    return Disposition::Suppressed(SuppressReason::OverrideEngaged);
                }
            }
        }

        let scaled = scale(cmd.linear_x, cmd.angular_z, &self.scaling);
        debug!(
            source = ?cmd.source,
            linear_x = cmd.linear_x,
            angular_z = cmd.angular_z,
            throttle = scaled.throttle,
            steering = scaled.steering,
            "command scaled"
        );

        if !self.gate.is_armed() {
            self.counters
                .suppressed_disarmed
                .fetch_add(1, Ordering::Relaxed);
            return Disposition::Suppressed(SuppressReason::Disarmed { intended: scaled });
        }

        let steering = self.send(&build_steering_frame(scaled.steering));
        let throttle = self.send(&build_throttle_frame(scaled.throttle));

        Disposition::Transmitted(TransmitReport {
            command: scaled,
            steering,
            throttle,
        })
    }

    /// Snapshot of the counters.
    pub fn counters(&self) -> DispatchCounters {
        DispatchCounters {
            transmitted_frames: self.counters.transmitted_frames.load(Ordering::Relaxed),
            transmit_failures: self.counters.transmit_failures.load(Ordering::Relaxed),
            suppressed_disarmed: self.counters.suppressed_disarmed.load(Ordering::Relaxed),
            suppressed_override: self.counters.suppressed_override.load(Ordering::Relaxed),
        }
    }

    fn send(&self, frame: &vesc_hal::CommandFrame) -> Result<(), VescError> {
        match self.sink.transmit(frame) {
            Ok(()) => {
                self.counters
                    .transmitted_frames
                    .fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.counters
                    .transmit_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(sink = %self.sink.id(), kind = %frame.kind(), frame = %frame, error = %e, "frame dropped");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use vesc_hal::CommandFrame;
    use vesc_hal::sink::RecordingSink;
    use vesc_types::CommandKind;

    /// Rejects every frame of one kind.
    struct RejectingSink {
        reject: CommandKind,
        accepted: Mutex<Vec<CommandFrame>>,
    }

    impl RejectingSink {
        fn new(reject: CommandKind) -> Self {
            Self {
                reject,
                accepted: Mutex::new(Vec::new()),
            }
        }
    }

    impl FrameSink for RejectingSink {
        fn id(&self) -> &str {
            "rejecting"
        }

        fn transmit(&self, frame: &CommandFrame) -> Result<(), VescError> {
            if frame.kind() == self.reject {
                return Err(VescError::Transmit {
                    kind: frame.kind(),
                    details: "bus off".to_string(),
                });
            }
            self.accepted.lock().unwrap().push(*frame);
            Ok(())
        }
    }

    fn dispatcher(armed: bool) -> (CommandDispatcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let gate = Arc::new(GatingState::new(armed, Some(Duration::from_secs(1))));
        let d = CommandDispatcher::new(gate, ScalingConfig::default(), sink.clone()).unwrap();
        (d, sink)
    }

    #[test]
    fn invalid_scaling_is_rejected_at_construction() {
        let cfg = ScalingConfig {
            max_steering_angle: 0.0,
            ..ScalingConfig::default()
        };
        let result = CommandDispatcher::new(
            Arc::new(GatingState::default()),
            cfg,
            Arc::new(RecordingSink::new()),
        );
        assert!(matches!(result, Err(VescError::Configuration(_))));
    }

    #[test]
    fn reference_scenario_sends_steering_then_throttle() {
        let (d, sink) = dispatcher(true);
        let outcome = d.handle_command(VelocityCommand::autonomous(2.0, 0.0));

        match outcome {
            Disposition::Transmitted(report) => {
                assert!(report.is_complete());
                assert_eq!(
                    report.command,
                    ScaledCommand {
                        throttle: 16000,
                        steering: 500
                    }
                );
            }
            other => panic!("unexpected disposition {other:?}"),
        }

        let frames = sink.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].kind(), CommandKind::Steering);
        assert_eq!(frames[0].payload(), "000001F4");
        assert_eq!(frames[1].kind(), CommandKind::Throttle);
        assert_eq!(frames[1].payload(), "00003E80");
        assert_eq!(d.counters().transmitted_frames, 2);
    }

    #[test]
    fn disarmed_never_reaches_sink() {
        let (d, sink) = dispatcher(false);
        let inputs = [(0.0, 0.0), (2.0, 0.1), (-5.0, -3.0), (1e9, 1e9)];
        // Autonomous first: override traffic would otherwise gate them earlier.
        for (x, z) in inputs {
            d.handle_command(VelocityCommand::autonomous(x, z));
        }
        for (x, z) in inputs {
            d.handle_command(VelocityCommand::manual_override(x, z));
        }
        assert!(sink.is_empty());
        assert_eq!(d.counters().suppressed_disarmed, 8);
    }

    #[test]
    fn disarmed_still_reports_intended_values() {
        let (d, _sink) = dispatcher(false);
        let outcome = d.handle_command(VelocityCommand::autonomous(2.0, 0.0));
        assert!(matches!(
            outcome,
            Disposition::Suppressed(SuppressReason::Disarmed {
                intended: ScaledCommand {
                    throttle: 16000,
                    steering: 500
                }
            })
        ));
    }

    #[test]
    fn toggling_arm_stops_transmission() {
        let (d, sink) = dispatcher(true);
        let previous = d.gate().toggle_armed();
        assert!(previous);
        assert!(!d.gate().is_armed());

        d.handle_command(VelocityCommand::autonomous(1.0, 0.0));
        d.handle_command(VelocityCommand::manual_override(1.0, 0.0));
        assert!(sink.is_empty());
    }

    #[test]
    fn override_command_engages_and_blocks_autonomy() {
        let (d, sink) = dispatcher(true);
        let t0 = Instant::now();

        let outcome = d.handle_command_at(VelocityCommand::manual_override(0.5, 0.0), t0);
        assert!(matches!(outcome, Disposition::Transmitted(_)));
        assert!(d.gate().is_override_engaged());

        let outcome = d.handle_command_at(
            VelocityCommand::autonomous(3.0, 0.0),
            t0 + Duration::from_millis(200),
        );
        assert!(matches!(
            outcome,
            Disposition::Suppressed(SuppressReason::OverrideEngaged)
        ));
        assert_eq!(sink.len(), 2);
        assert_eq!(d.counters().suppressed_override, 1);
    }

    #[test]
    fn autonomy_resumes_after_override_expires() {
        let (d, sink) = dispatcher(true);
        let t0 = Instant::now();
        d.handle_command_at(VelocityCommand::manual_override(0.5, 0.0), t0);

        let outcome = d.handle_command_at(
            VelocityCommand::autonomous(1.0, 0.0),
            t0 + Duration::from_millis(1500),
        );
        assert!(matches!(outcome, Disposition::Transmitted(_)));
        assert!(!d.gate().is_override_engaged());
        assert_eq!(sink.len(), 4);
    }

    #[test]
    fn override_always_transmits_when_armed() {
        let (d, sink) = dispatcher(true);
        d.gate().set_override_engaged(true);
        for i in 0..5 {
            let outcome = d.handle_command(VelocityCommand::manual_override(f64::from(i), 0.0));
            assert!(matches!(outcome, Disposition::Transmitted(_)));
        }
        assert_eq!(sink.len(), 10);
    }

    #[test]
    fn failed_throttle_does_not_roll_back_steering() {
        let sink = Arc::new(RejectingSink::new(CommandKind::Throttle));
        let d = CommandDispatcher::new(
            Arc::new(GatingState::default()),
            ScalingConfig::default(),
            sink.clone(),
        )
        .unwrap();

        let outcome = d.handle_command(VelocityCommand::autonomous(1.0, 0.0));
        let Disposition::Transmitted(report) = outcome else {
            panic!("expected a transmit attempt");
        };
        assert!(!report.is_complete());
        assert!(report.steering.is_ok());
        assert_eq!(report.failures().count(), 1);

        let accepted = sink.accepted.lock().unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].kind(), CommandKind::Steering);

        let counters = d.counters();
        assert_eq!(counters.transmitted_frames, 1);
        assert_eq!(counters.transmit_failures, 1);
    }

    #[test]
    fn failed_steering_still_attempts_throttle() {
        let sink = Arc::new(RejectingSink::new(CommandKind::Steering));
        let d = CommandDispatcher::new(
            Arc::new(GatingState::default()),
            ScalingConfig::default(),
            sink.clone(),
        )
        .unwrap();

        d.handle_command(VelocityCommand::autonomous(1.0, 0.0));
        let accepted = sink.accepted.lock().unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].kind(), CommandKind::Throttle);
    }

    #[test]
    fn same_command_encodes_identically() {
        let (d, sink) = dispatcher(true);
        d.handle_command(VelocityCommand::autonomous(0.7, -0.2));
        d.handle_command(VelocityCommand::autonomous(0.7, -0.2));
        let frames = sink.frames();
        assert_eq!(frames[0], frames[2]);
        assert_eq!(frames[1], frames[3]);
    }

    #[test]
    fn concurrent_callers_each_see_steering_before_throttle() {
        let (d, sink) = dispatcher(true);
        let d = Arc::new(d);
        let commands: Vec<VelocityCommand> = (0..4u8)
            .map(|i| VelocityCommand::manual_override(f64::from(i + 1), 0.1 * f64::from(i)))
            .collect();

        let handles: Vec<_> = commands
            .iter()
            .map(|&cmd| {
                let d = Arc::clone(&d);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        d.handle_command(cmd);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let frames = sink.frames();
        assert_eq!(frames.len(), 400);
        assert_eq!(d.counters().transmitted_frames, 400);

        for cmd in &commands {
            let scaled = scale(cmd.linear_x, cmd.angular_z, d.scaling());
            let steering = build_steering_frame(scaled.steering);
            let throttle = build_throttle_frame(scaled.throttle);
            let own: Vec<&CommandFrame> = frames
                .iter()
                .filter(|f| **f == steering || **f == throttle)
                .collect();
            assert_eq!(own.len(), 100, "frames for {cmd:?}");
            for pair in own.chunks(2) {
                assert_eq!(pair[0], &steering);
                assert_eq!(pair[1], &throttle);
            }
        }
    }
}
