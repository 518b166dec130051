//! Notification debounce and proximity checks.
//!
//! Decoded values are always stored; this module only decides whether a
//! refresh is worth telling listeners about. Each metric class carries its own
//! deadline, so a combined temperature and humidity record is gated twice,
//! independently.

use std::time::Duration;

use time::{Date, OffsetDateTime};

use mitemp_types::ChangedMetrics;

/// Default minimum spacing between two notifications for the same metric.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);

/// Debounce interval per metric class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceIntervals {
    /// Temperature debounce.
    pub temperature: Duration,
    /// Humidity debounce.
    pub humidity: Duration,
    /// Battery and voltage debounce.
    pub battery: Duration,
}

impl DebounceIntervals {
    /// Use the same interval for every metric class.
    #[must_use]
    pub const fn uniform(interval: Duration) -> Self {
        Self {
            temperature: interval,
            humidity: interval,
            battery: interval,
        }
    }
}

impl Default for DebounceIntervals {
    fn default() -> Self {
        Self::uniform(DEFAULT_DEBOUNCE)
    }
}

/// Per-device notification deadlines.
///
/// A metric with no deadline has never been notified and is always due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyDeadlines {
    /// Temperature suppressed until this time.
    pub temperature: Option<OffsetDateTime>,
    /// Humidity suppressed until this time.
    pub humidity: Option<OffsetDateTime>,
    /// Battery suppressed until this time.
    pub battery: Option<OffsetDateTime>,
}

impl NotifyDeadlines {
    /// Filter `touched` down to the classes whose deadline has passed, and
    /// advance the deadline of each class that passes.
    pub fn gate(
        &mut self,
        touched: ChangedMetrics,
        intervals: &DebounceIntervals,
        now: OffsetDateTime,
    ) -> ChangedMetrics {
        ChangedMetrics {
            temperature: touched.temperature
                && due(&mut self.temperature, intervals.temperature, now),
            humidity: touched.humidity && due(&mut self.humidity, intervals.humidity, now),
            battery: touched.battery && due(&mut self.battery, intervals.battery, now),
        }
    }
}

fn due(deadline: &mut Option<OffsetDateTime>, interval: Duration, now: OffsetDateTime) -> bool {
    match deadline {
        Some(until) if now <= *until => false,
        _ => {
            *deadline = Some(deadline_after(now, interval));
            true
        }
    }
}

/// `start + span`, saturating at the last representable date.
///
/// Spans too long to represent mean "never" rather than a panic.
#[must_use]
pub fn deadline_after(start: OffsetDateTime, span: Duration) -> OffsetDateTime {
    time::Duration::try_from(span)
        .ok()
        .and_then(|span| start.checked_add(span))
        .unwrap_or_else(|| Date::MAX.midnight().assume_utc())
}

/// Whether a device advertised recently enough to be worth connecting to.
///
/// The window is exclusive: an advertisement exactly `window` ago is too old.
#[must_use]
pub fn in_proximity(
    last_advertisement: Option<OffsetDateTime>,
    window: Duration,
    now: OffsetDateTime,
) -> bool {
    last_advertisement.is_some_and(|seen| now < deadline_after(seen, window))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(secs)
    }

    const BOTH: ChangedMetrics = ChangedMetrics {
        temperature: true,
        humidity: true,
        battery: false,
    };

    #[test]
    fn test_first_update_is_always_due() {
        let mut deadlines = NotifyDeadlines::default();
        let flagged = deadlines.gate(BOTH, &DebounceIntervals::default(), at(0));
        assert_eq!(flagged, BOTH);
        assert_eq!(deadlines.temperature, Some(at(10)));
        assert_eq!(deadlines.humidity, Some(at(10)));
        assert_eq!(deadlines.battery, None);
    }

    #[test]
    fn test_update_inside_window_is_suppressed() {
        let mut deadlines = NotifyDeadlines::default();
        let intervals = DebounceIntervals::default();
        deadlines.gate(BOTH, &intervals, at(0));

        assert_eq!(deadlines.gate(BOTH, &intervals, at(5)), ChangedMetrics::NONE);
        // Boundary is still inside the window
        assert_eq!(deadlines.gate(BOTH, &intervals, at(10)), ChangedMetrics::NONE);
        assert_eq!(deadlines.gate(BOTH, &intervals, at(11)), BOTH);
        assert_eq!(deadlines.temperature, Some(at(21)));
    }

    #[test]
    fn test_suppressed_update_does_not_extend_deadline() {
        let mut deadlines = NotifyDeadlines::default();
        let intervals = DebounceIntervals::default();
        deadlines.gate(BOTH, &intervals, at(0));
        deadlines.gate(BOTH, &intervals, at(9));
        assert_eq!(deadlines.temperature, Some(at(10)));
    }

    #[test]
    fn test_classes_use_independent_deadlines() {
        let mut deadlines = NotifyDeadlines::default();
        let intervals = DebounceIntervals {
            temperature: Duration::from_secs(10),
            humidity: Duration::from_secs(60),
            battery: Duration::from_secs(10),
        };

        let temperature_only = ChangedMetrics {
            temperature: true,
            ..ChangedMetrics::NONE
        };
        deadlines.gate(temperature_only, &intervals, at(0));

        // Humidity was never notified, so it is due even though temperature is not
        let flagged = deadlines.gate(BOTH, &intervals, at(5));
        assert!(!flagged.temperature);
        assert!(flagged.humidity);

        let flagged = deadlines.gate(BOTH, &intervals, at(30));
        assert!(flagged.temperature);
        assert!(!flagged.humidity);
    }

    #[test]
    fn test_untouched_classes_never_flag() {
        let mut deadlines = NotifyDeadlines::default();
        let flagged = deadlines.gate(ChangedMetrics::NONE, &DebounceIntervals::default(), at(0));
        assert!(!flagged.any());
        assert_eq!(deadlines, NotifyDeadlines::default());
    }

    #[test]
    fn test_proximity_window() {
        let window = Duration::from_secs(30);
        assert!(!in_proximity(None, window, at(100)));
        assert!(in_proximity(Some(at(100)), window, at(100)));
        assert!(in_proximity(Some(at(71)), window, at(100)));
        assert!(!in_proximity(Some(at(70)), window, at(100)));
    }

    #[test]
    fn test_huge_interval_saturates() {
        let mut deadlines = NotifyDeadlines::default();
        let forever = DebounceIntervals::uniform(Duration::from_secs(u64::MAX));

        assert_eq!(deadlines.gate(BOTH, &forever, at(0)), BOTH);
        assert_eq!(
            deadlines.gate(BOTH, &forever, at(1_000_000_000)),
            ChangedMetrics::NONE
        );
        assert_eq!(deadlines.temperature, Some(Date::MAX.midnight().assume_utc()));
    }

    #[test]
    fn test_deadline_after() {
        assert_eq!(deadline_after(at(5), Duration::from_secs(10)), at(15));
        assert_eq!(
            deadline_after(at(5), Duration::MAX),
            Date::MAX.midnight().assume_utc()
        );
        assert!(in_proximity(Some(at(0)), Duration::MAX, at(1_000_000_000)));
    }
}
