use chrono::{DateTime, Utc};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Source of "now" for services, swappable for a fixed instant in tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Moves a fixed clock forward. No effect on `Clock::Default`.
    pub fn advance(&mut self, delta: chrono::Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// Whole days elapsed from `earlier` to `later`, floored on milliseconds.
///
/// A `later` that precedes `earlier` (clock skew, backdated rows) counts as 0.
///
/// ```
/// # use practice_core::time::{whole_days_between, fixed_now};
/// let start = fixed_now();
/// let later = start + chrono::Duration::hours(47);
/// assert_eq!(whole_days_between(start, later), 1);
/// assert_eq!(whole_days_between(later, start), 0);
/// ```
#[must_use]
pub fn whole_days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    let elapsed = later.signed_duration_since(earlier).num_milliseconds();
    if elapsed <= 0 {
        return 0;
    }
    elapsed / MILLIS_PER_DAY
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn whole_days_floor_partial_days() {
        let start = fixed_now();
        assert_eq!(whole_days_between(start, start), 0);
        assert_eq!(whole_days_between(start, start + Duration::hours(23)), 0);
        assert_eq!(whole_days_between(start, start + Duration::days(8)), 8);
        assert_eq!(
            whole_days_between(start, start + Duration::days(3) - Duration::milliseconds(1)),
            2
        );
    }

    #[test]
    fn fixed_clock_advances() {
        let mut clock = Clock::fixed(fixed_now());
        clock.advance(Duration::days(2));
        assert_eq!(clock.now(), fixed_now() + Duration::days(2));

        let mut real = Clock::default();
        real.advance(Duration::days(2));
        assert!(matches!(real, Clock::Default));
    }
}
