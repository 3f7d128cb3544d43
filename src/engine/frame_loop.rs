//! Fixed-timestep frame scheduler
//!
//! Wall-clock time is fed into an accumulator; every full frame interval in
//! it allows one `step_frame`. Frame boundaries depend only on accumulated
//! time, so timer jitter changes when frames run, never how many.

use serde::Serialize;
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::{ClockPreference, FrameLoopConfig, LoopMode};
use crate::core::error::{Result, SimError};
use crate::engine::StepReport;

/// Frames kept for the rolling FPS average
const PERF_WINDOW: usize = 120;

/// Below this interval a sleeping timer is too coarse
const HIGH_RESOLUTION_BELOW_MS: f64 = 4.0;

/// Resolved clock source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockKind {
    /// Spin and yield until the deadline
    HighResolution,
    /// Sleep the thread
    Timer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub average_fps: f64,
    pub total_frames: u64,
    pub skipped_frames: u64,
    pub clock: ClockKind,
}

#[derive(Debug)]
pub struct FrameLoop {
    config: FrameLoopConfig,
    accumulator_ms: f64,
    last_instant: Option<Instant>,
    running: bool,
    paused: bool,
    pending_steps: u32,
    frame_times: VecDeque<Duration>,
    last_frame_at: Option<Instant>,
    total_frames: u64,
    skipped_frames: u64,
}

impl FrameLoop {
    pub fn new(config: FrameLoopConfig) -> Self {
        Self {
            config,
            accumulator_ms: 0.0,
            last_instant: None,
            running: false,
            paused: false,
            pending_steps: 0,
            frame_times: VecDeque::with_capacity(PERF_WINDOW),
            last_frame_at: None,
            total_frames: 0,
            skipped_frames: 0,
        }
    }

    pub fn config(&self) -> &FrameLoopConfig {
        &self.config
    }

    pub fn interval_ms(&self) -> f64 {
        self.config.frame_interval_ms()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn accumulator_ms(&self) -> f64 {
        self.accumulator_ms
    }

    pub fn clock(&self) -> ClockKind {
        match self.config.clock {
            ClockPreference::HighResolution => ClockKind::HighResolution,
            ClockPreference::Timer => ClockKind::Timer,
            ClockPreference::Auto if self.interval_ms() < HIGH_RESOLUTION_BELOW_MS => ClockKind::HighResolution,
            ClockPreference::Auto => ClockKind::Timer,
        }
    }

    pub fn start(&mut self, now: Instant) {
        self.running = true;
        self.paused = false;
        self.accumulator_ms = 0.0;
        self.last_instant = Some(now);
        self.last_frame_at = None;
        tracing::debug!(
            "Frame loop started at {} fps ({:?}, {:?} clock)",
            self.config.target_fps,
            self.config.mode,
            self.clock()
        );
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.paused = false;
        self.pending_steps = 0;
        self.accumulator_ms = 0.0;
        self.last_instant = None;
    }

    pub fn pause(&mut self) {
        self.paused = true;
        self.last_instant = None;
    }

    pub fn resume(&mut self, now: Instant) {
        self.paused = false;
        self.last_instant = Some(now);
        self.last_frame_at = None;
    }

    /// Request one frame while paused
    pub fn step(&mut self) {
        self.pending_steps += 1;
    }

    /// Consume a requested single step, if any
    pub fn take_step(&mut self) -> bool {
        if self.pending_steps == 0 {
            return false;
        }
        self.pending_steps -= 1;
        true
    }

    pub fn set_time_scale(&mut self, scale: f64) -> Result<()> {
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(SimError::Validation(format!("time_scale ({}) must be positive", scale)));
        }
        self.config.time_scale = scale;
        Ok(())
    }

    pub fn set_target_fps(&mut self, fps: u32) -> Result<()> {
        if fps == 0 {
            return Err(SimError::Validation("target_fps must be positive".into()));
        }
        self.config.target_fps = fps;
        self.accumulator_ms = self.accumulator_ms.min(self.interval_ms());
        Ok(())
    }

    pub fn set_mode(&mut self, mode: LoopMode) {
        self.config.mode = mode;
    }

    /// Feed elapsed time into the accumulator
    pub fn accumulate(&mut self, now: Instant) {
        if !self.running || self.paused {
            return;
        }
        let interval = self.interval_ms();
        let added = match self.config.mode {
            LoopMode::FastForward => interval,
            LoopMode::Realtime => {
                let elapsed = self
                    .last_instant
                    .map(|last| now.saturating_duration_since(last))
                    .unwrap_or_default();
                elapsed.as_secs_f64() * 1000.0 * self.config.time_scale
            }
        };
        self.last_instant = Some(now);
        self.accumulator_ms += added;

        let ceiling = interval * self.config.max_skip as f64;
        if self.config.frame_skip && self.accumulator_ms > ceiling {
            tracing::debug!(
                "Frame loop behind by {:.1} ms, clamping to one interval",
                self.accumulator_ms
            );
            self.accumulator_ms = interval;
            self.skipped_frames += 1;
        }
    }

    /// Take one frame interval out of the accumulator if a full one is there
    pub fn try_consume_interval(&mut self) -> bool {
        let interval = self.interval_ms();
        if self.accumulator_ms + 1e-9 >= interval {
            self.accumulator_ms = (self.accumulator_ms - interval).max(0.0);
            true
        } else {
            false
        }
    }

    /// Whether to keep stepping after `report` within one pump
    pub fn continue_after(&self, report: &StepReport) -> bool {
        match self.config.mode {
            LoopMode::Realtime => true,
            LoopMode::FastForward => report.has_pending(),
        }
    }

    /// Record that a frame was stepped, for the FPS window
    pub fn record_frame(&mut self, now: Instant) {
        if let Some(last) = self.last_frame_at {
            self.frame_times.push_back(now.saturating_duration_since(last));
            if self.frame_times.len() > PERF_WINDOW {
                self.frame_times.pop_front();
            }
        }
        self.last_frame_at = Some(now);
        self.total_frames += 1;
    }

    pub fn average_fps(&self) -> f64 {
        if self.frame_times.is_empty() {
            return 0.0;
        }
        let sum: Duration = self.frame_times.iter().sum();
        let avg_ms = sum.as_secs_f64() * 1000.0 / self.frame_times.len() as f64;
        if avg_ms > 0.0 {
            1000.0 / avg_ms
        } else {
            0.0
        }
    }

    pub fn performance(&self) -> PerformanceStats {
        PerformanceStats {
            average_fps: self.average_fps(),
            total_frames: self.total_frames,
            skipped_frames: self.skipped_frames,
            clock: self.clock(),
        }
    }

    /// Wall-clock time until the next interval is available
    pub fn time_until_next(&self) -> Duration {
        if !self.running || self.paused || self.config.mode == LoopMode::FastForward {
            return Duration::ZERO;
        }
        let missing_ms = (self.interval_ms() - self.accumulator_ms).max(0.0) / self.config.time_scale;
        Duration::from_secs_f64(missing_ms / 1000.0)
    }

    /// Block the calling thread for `duration` using the resolved clock
    pub fn wait(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        match self.clock() {
            ClockKind::Timer => thread::sleep(duration),
            ClockKind::HighResolution => {
                let deadline = Instant::now() + duration;
                while Instant::now() < deadline {
                    thread::yield_now();
                }
            }
        }
    }
}
