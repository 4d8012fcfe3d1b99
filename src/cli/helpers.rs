//! Shared helper functions for CLI commands.

use std::time::Duration;

/// Shorten `text` to at most `max` characters, marking the cut with "...".
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    format!("{}...", text.chars().take(keep).collect::<String>())
}

/// `1m 05s` style elapsed time.
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Lincoln Elementary", 30), "Lincoln Elementary");
        assert_eq!(truncate("Lincoln Elementary", 10), "Lincoln...");
        assert_eq!(truncate("Ñandú Academy", 8), "Ñandú...");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
    }
}
