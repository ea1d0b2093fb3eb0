//! Configuration – reads `~/.vesc/config.toml`.
//!
//! The file is optional and read-only: every field has a default matching the
//! reference vehicle, and nothing here ever writes it back.
//!
//! ```toml
//! initial_armed = true
//! manual_mode_timeout_ms = 1000
//! status_period_ms = 500
//! sink = "socketcan"
//! can_interface = "can0"
//! can_write_timeout_ms = 100
//!
//! [scaling]
//! max_steering_angle = 0.524
//! servo_scale = 900
//! servo_bias = 50
//! servo_lower_bound = 50
//! servo_upper_bound = 950
//! rpm_scale = 8000.0
//! invert_throttle = false
//! invert_steering = false
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use vesc_hal::ScalingConfig;
use vesc_types::VescError;

/// Where finished frames go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Write frames to `can_interface` over SocketCAN (Linux only).
    #[default]
    SocketCan,
    /// Log frames only (dry run).
    Log,
}

impl SinkKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "socketcan" => Some(SinkKind::SocketCan),
            "log" => Some(SinkKind::Log),
            _ => None,
        }
    }
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::SocketCan => write!(f, "socketcan"),
            SinkKind::Log => write!(f, "log"),
        }
    }
}

/// Node configuration loaded once at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scaling: ScalingConfig,

    /// Arm state at startup.
    #[serde(default = "default_initial_armed")]
    pub initial_armed: bool,

    /// Override expiry after the last override command; `0` disables expiry.
    #[serde(default = "default_manual_mode_timeout_ms")]
    pub manual_mode_timeout_ms: u64,

    #[serde(default = "default_status_period_ms")]
    pub status_period_ms: u64,

    #[serde(default)]
    pub sink: SinkKind,

    #[serde(default = "default_can_interface")]
    pub can_interface: String,

    /// Bound on a single CAN frame write.
    #[serde(default = "default_can_write_timeout_ms")]
    pub can_write_timeout_ms: u64,
}

fn default_initial_armed() -> bool {
    true
}
fn default_manual_mode_timeout_ms() -> u64 {
    1000
}
fn default_status_period_ms() -> u64 {
    500
}
fn default_can_interface() -> String {
    "can0".to_string()
}
fn default_can_write_timeout_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scaling: ScalingConfig::default(),
            initial_armed: default_initial_armed(),
            manual_mode_timeout_ms: default_manual_mode_timeout_ms(),
            status_period_ms: default_status_period_ms(),
            sink: SinkKind::default(),
            can_interface: default_can_interface(),
            can_write_timeout_ms: default_can_write_timeout_ms(),
        }
    }
}

impl Config {
    /// Reject configurations the node cannot run with.
    ///
    /// # Errors
    ///
    /// [`VescError::Configuration`] for invalid scaling, a zero status period,
    /// or, with the `socketcan` sink, an empty interface name or a zero write
    /// timeout.
    pub fn validate(&self) -> Result<(), VescError> {
        self.scaling.validate()?;
        if self.status_period_ms == 0 {
            return Err(VescError::Configuration(
                "status_period_ms must be greater than zero".to_string(),
            ));
        }
        if self.sink == SinkKind::SocketCan {
            if self.can_interface.trim().is_empty() {
                return Err(VescError::Configuration(
                    "can_interface must be set when sink = \"socketcan\"".to_string(),
                ));
            }
            if self.can_write_timeout_ms == 0 {
                return Err(VescError::Configuration(
                    "can_write_timeout_ms must be greater than zero".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn override_timeout(&self) -> Option<Duration> {
        (self.manual_mode_timeout_ms > 0).then(|| Duration::from_millis(self.manual_mode_timeout_ms))
    }

    pub fn status_period(&self) -> Duration {
        Duration::from_millis(self.status_period_ms)
    }

    pub fn can_write_timeout(&self) -> Duration {
        Duration::from_millis(self.can_write_timeout_ms)
    }
}

/// Return the path to `~/.vesc/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".vesc").join("config.toml")
}

/// Load, apply environment overrides and validate.
///
/// A missing file yields the defaults.
pub fn load(path: &Path) -> Result<Config, VescError> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Parse the config at `path`.  Returns `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, VescError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        VescError::Configuration(format!("Failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| VescError::Configuration(format!("Failed to parse config: {e}")))?;
    Ok(Some(cfg))
}

/// Apply `VESC_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VESC_CAN_INTERFACE` | `can_interface` |
/// | `VESC_SINK` | `sink` (`socketcan` / `log`) |
/// | `VESC_STATUS_PERIOD_MS` | `status_period_ms` |
/// | `VESC_INITIAL_ARMED` | `initial_armed` (`true` / `false`) |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("VESC_CAN_INTERFACE") {
        cfg.can_interface = v;
    }
    if let Ok(v) = std::env::var("VESC_SINK")
        && let Some(kind) = SinkKind::parse(&v)
    {
        cfg.sink = kind;
    }
    if let Ok(v) = std::env::var("VESC_STATUS_PERIOD_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.status_period_ms = ms;
    }
    if let Ok(v) = std::env::var("VESC_INITIAL_ARMED")
        && let Ok(armed) = v.trim().parse::<bool>()
    {
        cfg.initial_armed = armed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        fs::create_dir_all(path.parent().unwrap()).expect("config dir");
        fs::write(&path, contents).expect("write config");
        (dir, path)
    }

    #[test]
    fn defaults_match_reference_vehicle() {
        let cfg = Config::default();
        assert_eq!(cfg.scaling.max_steering_angle, 0.524);
        assert_eq!(cfg.scaling.servo_scale, 900);
        assert_eq!(cfg.scaling.servo_bias, 50);
        assert_eq!(cfg.scaling.servo_lower_bound, 50);
        assert_eq!(cfg.scaling.servo_upper_bound, 950);
        assert_eq!(cfg.scaling.rpm_scale, 8000.0);
        assert!(cfg.initial_armed);
        assert_eq!(cfg.override_timeout(), Some(Duration::from_secs(1)));
        assert_eq!(cfg.status_period(), Duration::from_millis(500));
        assert_eq!(cfg.sink, SinkKind::SocketCan);
        assert_eq!(cfg.can_interface, "can0");
        assert_eq!(cfg.can_write_timeout(), Duration::from_millis(100));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn config_path_points_to_vesc_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".vesc"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let (_dir, path) = write_config(
            r#"
            initial_armed = false
            sink = "log"

            [scaling]
            rpm_scale = 4000.0
            invert_steering = true
            "#,
        );
        let cfg = load_from(&path).expect("load ok").expect("some");
        assert!(!cfg.initial_armed);
        assert_eq!(cfg.sink, SinkKind::Log);
        assert_eq!(cfg.scaling.rpm_scale, 4000.0);
        assert!(cfg.scaling.invert_steering);
        assert_eq!(cfg.scaling.servo_scale, 900);
        assert_eq!(cfg.status_period_ms, 500);
    }

    #[test]
    fn zero_steering_angle_fails_validation() {
        let (_dir, path) = write_config("[scaling]\nmax_steering_angle = 0.0\n");
        let cfg = load_from(&path).expect("load ok").expect("some");
        assert!(matches!(cfg.validate(), Err(VescError::Configuration(_))));
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let (_dir, path) = write_config("status_period_ms = \"soon\"\n");
        assert!(matches!(load_from(&path), Err(VescError::Configuration(_))));
    }

    #[test]
    fn zero_timeout_disables_override_expiry() {
        let cfg = Config {
            manual_mode_timeout_ms: 0,
            ..Config::default()
        };
        assert_eq!(cfg.override_timeout(), None);
    }

    #[test]
    fn zero_status_period_fails_validation() {
        let cfg = Config {
            status_period_ms: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_interface_only_matters_for_socketcan() {
        let mut cfg = Config {
            can_interface: "  ".to_string(),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
        cfg.sink = SinkKind::Log;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_write_timeout_is_rejected_for_socketcan() {
        let (_dir, path) = write_config("can_write_timeout_ms = 0\n");
        let cfg = load_from(&path).expect("load ok").expect("some");
        assert!(matches!(cfg.validate(), Err(VescError::Configuration(_))));
    }

    #[test]
    fn socketcan_sink_name_in_file() {
        let (_dir, path) = write_config("sink = \"socketcan\"\ncan_interface = \"vcan0\"\n");
        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.sink, SinkKind::SocketCan);
        assert_eq!(cfg.can_interface, "vcan0");
    }

    #[test]
    fn sink_kind_parsing() {
        assert_eq!(SinkKind::parse("socketcan"), Some(SinkKind::SocketCan));
        assert_eq!(SinkKind::parse("cansend"), None);
        assert_eq!(SinkKind::parse(" LOG "), Some(SinkKind::Log));
        assert_eq!(SinkKind::parse("socketcan"), None);
        assert_eq!(SinkKind::Log.to_string(), "log");
    }

    // All env-var cases live in one test so parallel tests never race on the
    // shared process environment.
    #[test]
    fn apply_env_overrides_updates_fields() {
        // SAFETY: only this test touches VESC_* variables.
        unsafe {
            std::env::set_var("VESC_CAN_INTERFACE", "vcan1");
            std::env::set_var("VESC_SINK", "log");
            std::env::set_var("VESC_STATUS_PERIOD_MS", "250");
            std::env::set_var("VESC_INITIAL_ARMED", "false");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.can_interface, "vcan1");
        assert_eq!(cfg.sink, SinkKind::Log);
        assert_eq!(cfg.status_period_ms, 250);
        assert!(!cfg.initial_armed);

        // Garbage is ignored.
        unsafe {
            std::env::set_var("VESC_SINK", "carrier-pigeon");
            std::env::set_var("VESC_STATUS_PERIOD_MS", "not-a-number");
            std::env::set_var("VESC_INITIAL_ARMED", "maybe");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.sink, SinkKind::SocketCan);
        assert_eq!(cfg.status_period_ms, 500);
        assert!(cfg.initial_armed);

        unsafe {
            std::env::remove_var("VESC_CAN_INTERFACE");
            std::env::remove_var("VESC_SINK");
            std::env::remove_var("VESC_STATUS_PERIOD_MS");
            std::env::remove_var("VESC_INITIAL_ARMED");
        }
    }
}
