//! Poll intervals, deadlines and settle delays

use super::defaults::*;
use crate::error::{SystestError, SystestResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing configuration for readiness waits and lifecycle barriers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Tick between `pgrep` probes after a process start
    #[serde(with = "humantime_serde")]
    pub process_poll_tick: Duration,

    /// Deadline for a started process to appear
    #[serde(with = "humantime_serde")]
    pub process_poll_timeout: Duration,

    /// Tick between probes while waiting for a stopped process to go away
    #[serde(with = "humantime_serde")]
    pub process_exit_tick: Duration,

    /// Deadline for a stopped process to go away
    #[serde(with = "humantime_serde")]
    pub process_exit_timeout: Duration,

    /// Tick between listener probes
    #[serde(with = "humantime_serde")]
    pub listener_poll_tick: Duration,

    /// Deadline for the inspect listener to be bound
    #[serde(with = "humantime_serde")]
    pub listener_poll_timeout: Duration,

    /// Barrier between data-plane start and control-plane start
    #[serde(with = "humantime_serde")]
    pub data_plane_settle: Duration,

    /// Pause after launching netmaster before probing for it
    #[serde(with = "humantime_serde")]
    pub master_start_pause: Duration,

    /// Barrier between netmaster start and the first API probe
    #[serde(with = "humantime_serde")]
    pub control_plane_settle: Duration,

    /// Number of control-plane read attempts before setup fails
    pub control_plane_attempts: u32,

    /// Spacing between control-plane read attempts
    #[serde(with = "humantime_serde")]
    pub control_plane_spacing: Duration,

    /// Per-request timeout for a control-plane read
    #[serde(with = "humantime_serde")]
    pub control_plane_request_timeout: Duration,

    /// Fixed backoff between transport retries
    #[serde(with = "humantime_serde")]
    pub transport_retry_delay: Duration,

    /// Upper bound on attempts for a command hitting transport errors
    pub transport_retry_attempts: u32,

    /// Pause between stopping and starting the cluster store
    #[serde(with = "humantime_serde")]
    pub store_restart_pause: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            process_poll_tick: DEFAULT_PROCESS_POLL_TICK,
            process_poll_timeout: DEFAULT_PROCESS_POLL_TIMEOUT,
            process_exit_tick: DEFAULT_PROCESS_EXIT_TICK,
            process_exit_timeout: DEFAULT_PROCESS_EXIT_TIMEOUT,
            listener_poll_tick: DEFAULT_LISTENER_POLL_TICK,
            listener_poll_timeout: DEFAULT_LISTENER_POLL_TIMEOUT,
            data_plane_settle: DEFAULT_DATA_PLANE_SETTLE,
            master_start_pause: DEFAULT_MASTER_START_PAUSE,
            control_plane_settle: DEFAULT_CONTROL_PLANE_SETTLE,
            control_plane_attempts: DEFAULT_CONTROL_PLANE_ATTEMPTS,
            control_plane_spacing: DEFAULT_CONTROL_PLANE_SPACING,
            control_plane_request_timeout: DEFAULT_CONTROL_PLANE_REQUEST_TIMEOUT,
            transport_retry_delay: DEFAULT_TRANSPORT_RETRY_DELAY,
            transport_retry_attempts: DEFAULT_TRANSPORT_RETRY_ATTEMPTS,
            store_restart_pause: DEFAULT_STORE_RESTART_PAUSE,
        }
    }
}

impl TimingConfig {
    /// Timings with every barrier and tick collapsed, for unit tests
    pub fn immediate() -> Self {
        Self {
            process_poll_tick: Duration::from_millis(1),
            process_poll_timeout: Duration::from_millis(50),
            process_exit_tick: Duration::from_millis(1),
            process_exit_timeout: Duration::from_millis(50),
            listener_poll_tick: Duration::from_millis(1),
            listener_poll_timeout: Duration::from_millis(50),
            data_plane_settle: Duration::ZERO,
            master_start_pause: Duration::ZERO,
            control_plane_settle: Duration::ZERO,
            control_plane_spacing: Duration::from_millis(1),
            transport_retry_delay: Duration::from_millis(1),
            store_restart_pause: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SystestResult<()> {
        if self.control_plane_attempts == 0 {
            return Err(SystestError::configuration(
                "timing.control_plane_attempts",
                "at least one control-plane attempt is required",
            ));
        }
        if self.transport_retry_attempts == 0 {
            return Err(SystestError::configuration(
                "timing.transport_retry_attempts",
                "at least one attempt is required",
            ));
        }
        for (field, tick) in [
            ("timing.process_poll_tick", self.process_poll_tick),
            ("timing.process_exit_tick", self.process_exit_tick),
            ("timing.listener_poll_tick", self.listener_poll_tick),
        ] {
            if tick.is_zero() {
                return Err(SystestError::configuration(field, "poll tick must be non-zero"));
            }
        }
        Ok(())
    }
}
