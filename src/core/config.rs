//! Engine configuration with documented defaults
//!
//! Every tunable of the executor lives here. A config is owned by one engine
//! instance; concurrent simulations never share it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::core::error::{Result, SimError};

/// How the frame loop converts wall-clock time into logical frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Scaled wall-clock time feeds the accumulator
    #[default]
    Realtime,
    /// Every loop iteration feeds exactly one frame interval, no waiting
    FastForward,
}

/// Requested clock source for the executor thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockPreference {
    /// Pick based on frame interval
    #[default]
    Auto,
    HighResolution,
    Timer,
}

/// What the event queue does when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the incoming event and log a warning
    #[default]
    DropNewest,
    /// Surface `SimError::QueueOverflow` to the caller of `try_insert`
    RejectWithError,
}

/// Frame scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameLoopConfig {
    /// Logical frames per second
    pub target_fps: u32,

    /// Clamp the accumulator when it falls too far behind
    ///
    /// Clamping drops wall-clock time, never simulation logic.
    pub frame_skip: bool,

    /// Accumulator ceiling, in frame intervals, before a skip is recorded
    pub max_skip: u32,

    /// Multiplier applied to wall-clock deltas in realtime mode
    pub time_scale: f64,

    /// Upper bound on due queue events drained in one step
    ///
    /// Remaining events at the same frame stay pending and hold the frame.
    pub max_events_per_frame: usize,

    pub mode: LoopMode,

    pub clock: ClockPreference,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        Self {
            target_fps: 60,
            frame_skip: true,
            max_skip: 5,
            time_scale: 1.0,
            max_events_per_frame: 256,
            mode: LoopMode::Realtime,
            clock: ClockPreference::Auto,
        }
    }
}

impl FrameLoopConfig {
    /// Length of one logical frame in milliseconds
    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.target_fps.max(1) as f64
    }
}

/// Event queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Hard capacity; inserts beyond it follow `overflow`
    pub capacity: usize,

    /// Number of point-in-time copies kept for rollback/debugging
    pub max_snapshots: usize,

    /// Take a queue snapshot every N advanced frames (0 disables); each
    /// rotation prunes processed events older than the oldest copy
    pub snapshot_interval: u64,

    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            max_snapshots: 16,
            snapshot_interval: 60,
            overflow: OverflowPolicy::DropNewest,
        }
    }
}

/// Life-cycle protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long the controller waits in `initializing` for RESULT_INIT
    pub init_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            init_timeout_ms: 10_000,
        }
    }
}

/// Outbound presentation stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Emit a frame snapshot every N advanced frames (0 disables)
    pub snapshot_every_n_frames: u64,

    /// Per-member event history kept for inspection
    pub fsm_history_len: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_every_n_frames: 1,
            fsm_history_len: 64,
        }
    }
}

/// Complete executor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub frame_loop: FrameLoopConfig,
    pub queue: QueueConfig,
    pub lifecycle: LifecycleConfig,
    pub output: OutputConfig,
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a TOML file; missing sections keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.frame_loop.target_fps == 0 {
            return Err(SimError::Validation("target_fps must be positive".into()));
        }
        if !(self.frame_loop.time_scale > 0.0) {
            return Err(SimError::Validation(format!(
                "time_scale ({}) must be positive",
                self.frame_loop.time_scale
            )));
        }
        if self.frame_loop.max_events_per_frame == 0 {
            return Err(SimError::Validation(
                "max_events_per_frame must be at least 1".into(),
            ));
        }
        if self.frame_loop.frame_skip && self.frame_loop.max_skip == 0 {
            return Err(SimError::Validation(
                "max_skip must be at least 1 when frame_skip is enabled".into(),
            ));
        }
        if self.queue.capacity == 0 {
            return Err(SimError::Validation("queue capacity must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_loop.target_fps, 60);
        assert_eq!(config.lifecycle.init_timeout_ms, 10_000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [frame_loop]
            target_fps = 30
            mode = "fast_forward"

            [queue]
            capacity = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.frame_loop.target_fps, 30);
        assert_eq!(config.frame_loop.mode, LoopMode::FastForward);
        assert_eq!(config.frame_loop.max_skip, 5);
        assert_eq!(config.queue.capacity, 8);
        assert_eq!(config.queue.max_snapshots, 16);
    }

    #[test]
    fn test_invalid_time_scale_rejected() {
        let mut config = EngineConfig::default();
        config.frame_loop.time_scale = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frame_interval() {
        let config = FrameLoopConfig {
            target_fps: 50,
            ..Default::default()
        };
        assert!((config.frame_interval_ms() - 20.0).abs() < f64::EPSILON);
    }
}
