use practice_core::settings::SchedulingSettings;

use crate::error::ConfigError;

/// Optimistic write attempts before a conflict is reported.
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 3;

/// Engine-wide tunables shared by every service.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    settings: SchedulingSettings,
    max_write_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settings: SchedulingSettings::default(),
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::ZeroWriteAttempts` if `max_write_attempts` is 0.
    pub fn new(settings: SchedulingSettings, max_write_attempts: u32) -> Result<Self, ConfigError> {
        if max_write_attempts == 0 {
            return Err(ConfigError::ZeroWriteAttempts);
        }
        Ok(Self {
            settings,
            max_write_attempts,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &SchedulingSettings {
        &self.settings
    }

    /// How many times an optimistic write is attempted before a conflict is surfaced.
    #[must_use]
    pub fn max_write_attempts(&self) -> u32 {
        self.max_write_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_three_writes() {
        let config = EngineConfig::default();
        assert_eq!(config.max_write_attempts(), DEFAULT_MAX_WRITE_ATTEMPTS);
        assert_eq!(DEFAULT_MAX_WRITE_ATTEMPTS, 3);
        assert_eq!(config.settings().recent_window(), 20);
    }

    #[test]
    fn zero_write_attempts_is_rejected() {
        assert_eq!(
            EngineConfig::new(SchedulingSettings::default(), 0),
            Err(ConfigError::ZeroWriteAttempts)
        );
    }
}
