use std::time::{Duration, SystemTime};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod game;
pub mod health;
pub mod sse;
pub mod validation;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Render a remaining time the way announcements show it: `3h 12m`, `5m 2s` or `42s`.
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_time_drops_the_smallest_unit_past_an_hour() {
        assert_eq!(format_remaining(Duration::from_secs(3 * 3600 + 12 * 60 + 59)), "3h 12m");
        assert_eq!(format_remaining(Duration::from_secs(5 * 60 + 2)), "5m 2s");
        assert_eq!(format_remaining(Duration::from_millis(42_900)), "42s");
        assert_eq!(format_remaining(Duration::ZERO), "0s");
    }

    #[test]
    fn timestamps_are_rfc3339() {
        assert_eq!(
            format_system_time(SystemTime::UNIX_EPOCH),
            "1970-01-01T00:00:00Z"
        );
    }
}
