use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("recent attempt window must be > 0")]
    InvalidRecentWindow,

    #[error("review thresholds must be > 0 days")]
    InvalidThresholdDays,

    #[error("review thresholds must not shrink as mastery grows")]
    InvalidThresholdOrder,

    #[error("mastery cut-offs must satisfy 0 < review < maintenance <= 100")]
    InvalidMasteryCutoffs,
}

/// Tunables for candidate selection and the topic-level due list.
///
/// `Default` gives a 20-attempt repetition window and due thresholds of
/// 7 days at mastery ≥ 80, 3 days at mastery ≥ 60 and 1 day below that.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulingSettings {
    recent_window: u32,
    maintenance_cutoff: f64,
    review_cutoff: f64,
    maintenance_days: u32,
    review_days: u32,
    practice_days: u32,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            recent_window: 20,
            maintenance_cutoff: 80.0,
            review_cutoff: 60.0,
            maintenance_days: 7,
            review_days: 3,
            practice_days: 1,
        }
    }
}

impl SchedulingSettings {
    /// Creates custom scheduling settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the window is empty, a threshold is zero or
    /// out of order, or the cut-offs are not increasing within `(0, 100]`.
    pub fn new(
        recent_window: u32,
        maintenance_cutoff: f64,
        review_cutoff: f64,
        maintenance_days: u32,
        review_days: u32,
        practice_days: u32,
    ) -> Result<Self, SettingsError> {
        if recent_window == 0 {
            return Err(SettingsError::InvalidRecentWindow);
        }
        if maintenance_days == 0 || review_days == 0 || practice_days == 0 {
            return Err(SettingsError::InvalidThresholdDays);
        }
        if practice_days > review_days || review_days > maintenance_days {
            return Err(SettingsError::InvalidThresholdOrder);
        }
        if !review_cutoff.is_finite()
            || !maintenance_cutoff.is_finite()
            || review_cutoff <= 0.0
            || review_cutoff >= maintenance_cutoff
            || maintenance_cutoff > 100.0
        {
            return Err(SettingsError::InvalidMasteryCutoffs);
        }

        Ok(Self {
            recent_window,
            maintenance_cutoff,
            review_cutoff,
            maintenance_days,
            review_days,
            practice_days,
        })
    }

    /// Same as `default()` with a different repetition window.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidRecentWindow` for a zero window.
    pub fn with_recent_window(mut self, recent_window: u32) -> Result<Self, SettingsError> {
        if recent_window == 0 {
            return Err(SettingsError::InvalidRecentWindow);
        }
        self.recent_window = recent_window;
        Ok(self)
    }

    /// How many of the learner's latest attempts count as "recently seen".
    #[must_use]
    pub fn recent_window(&self) -> u32 {
        self.recent_window
    }

    /// Days without practice after which a topic at this mastery is due.
    #[must_use]
    pub fn due_threshold_days(&self, mastery_level: f64) -> u32 {
        if mastery_level >= self.maintenance_cutoff {
            self.maintenance_days
        } else if mastery_level >= self.review_cutoff {
            self.review_days
        } else {
            self.practice_days
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_follow_mastery_tiers() {
        let s = SchedulingSettings::default();
        assert_eq!(s.recent_window(), 20);
        assert_eq!(s.due_threshold_days(85.0), 7);
        assert_eq!(s.due_threshold_days(80.0), 7);
        assert_eq!(s.due_threshold_days(79.9), 3);
        assert_eq!(s.due_threshold_days(60.0), 3);
        assert_eq!(s.due_threshold_days(50.0), 1);
        assert_eq!(s.due_threshold_days(0.0), 1);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            SchedulingSettings::new(0, 80.0, 60.0, 7, 3, 1),
            Err(SettingsError::InvalidRecentWindow)
        );
        assert_eq!(
            SchedulingSettings::new(20, 80.0, 60.0, 7, 3, 0),
            Err(SettingsError::InvalidThresholdDays)
        );
        assert_eq!(
            SchedulingSettings::new(20, 80.0, 60.0, 2, 3, 1),
            Err(SettingsError::InvalidThresholdOrder)
        );
        assert_eq!(
            SchedulingSettings::new(20, 60.0, 80.0, 7, 3, 1),
            Err(SettingsError::InvalidMasteryCutoffs)
        );
        assert_eq!(
            SchedulingSettings::default().with_recent_window(0),
            Err(SettingsError::InvalidRecentWindow)
        );
    }

    #[test]
    fn custom_settings_are_honoured() {
        let s = SchedulingSettings::new(5, 90.0, 50.0, 14, 4, 2).unwrap();
        assert_eq!(s.recent_window(), 5);
        assert_eq!(s.due_threshold_days(85.0), 4);
        assert_eq!(s.due_threshold_days(49.0), 2);
    }
}
