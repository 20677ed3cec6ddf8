use std::time::Duration;

use exam_core::model::SessionMode;

use crate::error::ConfigError;

/// Default length of a timed exam simulation (one section).
pub const DEFAULT_EXAM_SECS: u32 = 20 * 60;
/// Default practice session length.
pub const DEFAULT_PRACTICE_SECS: u32 = 60 * 60;

/// How the checkpoint writer retries failed saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Knobs for starting and resuming simulations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    exam_duration_secs: u32,
    practice_duration_secs: u32,
    charge_offline_time: bool,
    checkpoint: CheckpointPolicy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            exam_duration_secs: DEFAULT_EXAM_SECS,
            practice_duration_secs: DEFAULT_PRACTICE_SECS,
            charge_offline_time: false,
            checkpoint: CheckpointPolicy::default(),
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns `ConfigError` if a duration is zero or the retry count is out of range.
    pub fn new(
        exam_duration_secs: u32,
        practice_duration_secs: u32,
        charge_offline_time: bool,
        checkpoint: CheckpointPolicy,
    ) -> Result<Self, ConfigError> {
        if exam_duration_secs == 0 {
            return Err(ConfigError::ZeroDuration { mode: "exam" });
        }
        if practice_duration_secs == 0 {
            return Err(ConfigError::ZeroDuration { mode: "practice" });
        }
        if !(1..=10).contains(&checkpoint.max_attempts) {
            return Err(ConfigError::InvalidCheckpointAttempts(
                checkpoint.max_attempts,
            ));
        }

        Ok(Self {
            exam_duration_secs,
            practice_duration_secs,
            charge_offline_time,
            checkpoint,
        })
    }

    #[must_use]
    pub fn duration_for(&self, mode: SessionMode) -> u32 {
        match mode {
            SessionMode::Exam => self.exam_duration_secs,
            SessionMode::Practice => self.practice_duration_secs,
        }
    }

    /// Whether time spent away from a session counts against its clock on resume.
    #[must_use]
    pub fn charge_offline_time(&self) -> bool {
        self.charge_offline_time
    }

    #[must_use]
    pub fn with_charge_offline_time(mut self, charge: bool) -> Self {
        self.charge_offline_time = charge;
        self
    }

    #[must_use]
    pub fn checkpoint(&self) -> CheckpointPolicy {
        self.checkpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pick_duration_by_mode() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.duration_for(SessionMode::Exam), DEFAULT_EXAM_SECS);
        assert_eq!(cfg.duration_for(SessionMode::Practice), DEFAULT_PRACTICE_SECS);
        assert!(!cfg.charge_offline_time());
    }

    #[test]
    fn zero_duration_is_rejected() {
        let err =
            SimulationConfig::new(0, 60, false, CheckpointPolicy::default()).unwrap_err();
        assert_eq!(err, ConfigError::ZeroDuration { mode: "exam" });
    }

    #[test]
    fn retry_count_is_bounded() {
        let policy = CheckpointPolicy {
            max_attempts: 0,
            retry_delay: Duration::ZERO,
        };
        assert_eq!(
            SimulationConfig::new(60, 60, false, policy).unwrap_err(),
            ConfigError::InvalidCheckpointAttempts(0)
        );
    }
}
