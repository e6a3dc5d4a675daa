// File: src/utils/time.rs

use chrono::{DateTime, Duration, Utc};

/// Compact human duration: `2d 3h`, `4h 12m`, `5m 9s`, `42s`.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

/// Elapsed time from `start` until `end` (or `now` if still running).
pub fn elapsed_between(start: DateTime<Utc>, end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    end.unwrap_or(now).signed_duration_since(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_two_largest_units() {
        assert_eq!(format_duration(Duration::seconds(42)), "42s");
        assert_eq!(format_duration(Duration::seconds(309)), "5m 9s");
        assert_eq!(format_duration(Duration::minutes(252)), "4h 12m");
        assert_eq!(format_duration(Duration::hours(51)), "2d 3h");
    }

    #[test]
    fn negative_is_zero() {
        assert_eq!(format_duration(Duration::seconds(-5)), "0s");
    }
}
